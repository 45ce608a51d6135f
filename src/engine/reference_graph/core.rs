// ==========================================
// 计量计价导入 - 进度号引用图解析
// ==========================================

use crate::domain::measurement::{Measurement, ProgressiveKey};
use crate::engine::rounding::cancellation_epsilon;
use crate::importer::error::{ImportError, ImportResult};
use indexmap::IndexSet;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

// ==========================================
// ReferenceGraph - 引用图
// ==========================================
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    direct_quantities: HashMap<ProgressiveKey, Decimal>,
    reference_edges: HashMap<ProgressiveKey, Vec<(ProgressiveKey, Decimal)>>,
    resolved_cache: HashMap<ProgressiveKey, Option<Decimal>>,
    nodes: BTreeSet<ProgressiveKey>,
    missing_targets: BTreeSet<ProgressiveKey>,
}

/// DFS 栈帧
struct Frame {
    key: ProgressiveKey,
    next_edge: usize,
    total: Decimal,
    pending_multiplier: Option<Decimal>,
}

impl Frame {
    fn new(key: ProgressiveKey, direct: Decimal) -> Self {
        Self {
            key,
            next_edge: 0,
            total: direct,
            pending_multiplier: None,
        }
    }

    fn accumulate(&mut self, multiplier: Decimal, value: Decimal) -> ImportResult<()> {
        self.total = multiplier
            .checked_mul(value)
            .and_then(|contribution| self.total.checked_add(contribution))
            .ok_or_else(|| {
                ImportError::InternalError(format!("进度号 {} 引用工程量溢出", self.key))
            })?;
        Ok(())
    }
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由一个预算方案的全部测量行构建
    ///
    /// # 规则
    /// - 有进度号的行登记为节点（即使无数值）
    /// - 有引用的行: 引用边挂在该行进度号上
    /// - 无引用的行: 直接工程量按进度号累加
    ///
    /// # 返回
    /// - Err(InternalError): 同进度号直接工程量累加溢出
    pub fn from_measurements(measurements: &[Measurement]) -> ImportResult<Self> {
        let mut graph = Self::new();
        for measurement in measurements {
            let Some(key) = measurement.key() else {
                continue;
            };
            graph.nodes.insert(key.clone());
            if measurement.has_references() {
                for entry in &measurement.reference_entries {
                    graph.add_edge(key.clone(), entry.target.clone(), entry.multiplier);
                }
            } else if let Some(quantity) = measurement.quantity_direct {
                graph.add_direct(key, quantity)?;
            }
        }
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.reference_edges.values().map(Vec::len).sum::<usize>(),
            "引用图构建完成"
        );
        Ok(graph)
    }

    /// 累加直接工程量
    pub fn add_direct(&mut self, key: ProgressiveKey, quantity: Decimal) -> ImportResult<()> {
        self.nodes.insert(key.clone());
        let entry = self.direct_quantities.entry(key.clone()).or_insert(Decimal::ZERO);
        *entry = entry.checked_add(quantity).ok_or_else(|| {
            ImportError::InternalError(format!("进度号 {} 直接工程量溢出", key))
        })?;
        Ok(())
    }

    /// 添加引用边 source → target × multiplier
    pub fn add_edge(&mut self, source: ProgressiveKey, target: ProgressiveKey, multiplier: Decimal) {
        self.nodes.insert(source.clone());
        self.reference_edges
            .entry(source)
            .or_default()
            .push((target, multiplier));
    }

    pub fn contains(&self, key: &ProgressiveKey) -> bool {
        self.nodes.contains(key)
    }

    /// 引用过但不存在的目标进度号
    pub fn missing_targets(&self) -> &BTreeSet<ProgressiveKey> {
        &self.missing_targets
    }

    /// 已解析的缓存值
    pub fn resolved(&self, key: &ProgressiveKey) -> Option<Option<Decimal>> {
        self.resolved_cache.get(key).copied()
    }

    fn direct(&self, key: &ProgressiveKey) -> Decimal {
        self.direct_quantities
            .get(key)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn record_missing(&mut self, source: &ProgressiveKey, target: &ProgressiveKey) {
        if self.missing_targets.insert(target.clone()) {
            warn!(source = %source, target = %target, "引用目标进度号不存在,按 0 计");
        }
    }

    // ==========================================
    // 解析
    // ==========================================

    /// 解析节点最终工程量（记忆化）
    ///
    /// # 返回
    /// - Ok(Some(q)): 解析值
    /// - Ok(None): 节点不存在,或引用链完全抵消
    /// - Err(CircularReference): 存在环,path 为 [环起点, ..., 环起点]
    pub fn resolve(&mut self, key: &ProgressiveKey) -> ImportResult<Option<Decimal>> {
        if let Some(cached) = self.resolved_cache.get(key) {
            return Ok(*cached);
        }
        if !self.nodes.contains(key) {
            return Ok(None);
        }

        let mut in_progress: IndexSet<ProgressiveKey> = IndexSet::new();
        let mut stack: Vec<Frame> = Vec::new();
        in_progress.insert(key.clone());
        stack.push(Frame::new(key.clone(), self.direct(key)));

        loop {
            let Some(frame) = stack.last_mut() else {
                return Ok(None);
            };

            let next = self
                .reference_edges
                .get(&frame.key)
                .and_then(|edges| edges.get(frame.next_edge))
                .cloned();

            match next {
                Some((target, multiplier)) => {
                    frame.next_edge += 1;

                    if let Some(cached) = self.resolved_cache.get(&target) {
                        let value = cached.unwrap_or(Decimal::ZERO);
                        frame.accumulate(multiplier, value)?;
                        continue;
                    }

                    if let Some(start) = in_progress.get_index_of(&target) {
                        let mut path: Vec<ProgressiveKey> =
                            in_progress.iter().skip(start).cloned().collect();
                        path.push(target);
                        debug!(cycle_len = path.len() - 1, "检测到循环引用");
                        return Err(ImportError::CircularReference { path });
                    }

                    if !self.nodes.contains(&target) {
                        let source = frame.key.clone();
                        self.record_missing(&source, &target);
                        continue;
                    }

                    frame.pending_multiplier = Some(multiplier);
                    let direct = self.direct(&target);
                    in_progress.insert(target.clone());
                    stack.push(Frame::new(target, direct));
                }
                None => {
                    let Some(done) = stack.pop() else {
                        return Ok(None);
                    };
                    in_progress.pop();

                    let value = if done.total.abs() <= cancellation_epsilon() {
                        None
                    } else {
                        Some(done.total)
                    };
                    self.resolved_cache.insert(done.key, value);

                    match stack.last_mut() {
                        Some(parent) => {
                            let multiplier = parent.pending_multiplier.take().unwrap_or(Decimal::ONE);
                            parent.accumulate(multiplier, value.unwrap_or(Decimal::ZERO))?;
                        }
                        None => return Ok(value),
                    }
                }
            }
        }
    }

    /// 解析全部节点（按键排序,结果与顺序无关）
    pub fn resolve_all(&mut self) -> ImportResult<()> {
        let keys: Vec<ProgressiveKey> = self.nodes.iter().cloned().collect();
        for key in &keys {
            self.resolve(key)?;
        }
        Ok(())
    }

    /// 回填每行的 quantity_resolved
    ///
    /// # 规则
    /// - 无引用行: quantity_resolved = quantity_direct
    /// - 引用行: Σ 乘数 × resolve(目标);缺失目标按 0;完全抵消 → None
    pub fn apply_to(&mut self, measurements: &mut [Measurement]) -> ImportResult<()> {
        for measurement in measurements.iter_mut() {
            if !measurement.has_references() {
                measurement.quantity_resolved = measurement.quantity_direct;
                continue;
            }

            let source = measurement.key().unwrap_or_else(|| {
                ProgressiveKey::new(measurement.estimate_id.clone(), 0)
            });
            let mut total = Decimal::ZERO;
            for entry in &measurement.reference_entries {
                if !self.nodes.contains(&entry.target) {
                    self.record_missing(&source, &entry.target);
                    continue;
                }
                let value = self.resolve(&entry.target)?.unwrap_or(Decimal::ZERO);
                total = entry
                    .multiplier
                    .checked_mul(value)
                    .and_then(|c| total.checked_add(c))
                    .ok_or_else(|| {
                        ImportError::InternalError(format!("进度号 {} 引用工程量溢出", source))
                    })?;
            }

            measurement.quantity_resolved = if total.abs() <= cancellation_epsilon() {
                None
            } else {
                Some(total)
            };
        }
        Ok(())
    }
}
