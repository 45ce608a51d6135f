// ==========================================
// 计量计价导入 - 清单条目聚合器
// ==========================================

use crate::domain::catalog::{DefinitionTables, Product};
use crate::domain::estimate::{ImportAnomaly, ImportStats, Voice, VoiceMetadata};
use crate::domain::measurement::{Measurement, ProgressiveKey};
use crate::domain::types::AnomalyKind;
use crate::engine::rounding::{line_amount, quantize_output};
use crate::engine::wbs::{WbsBuilder, WbsPath};
use crate::importer::error::{ImportError, ImportResult};
use indexmap::{IndexMap, IndexSet};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// ==========================================
// AggregationKey - 聚合键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub estimate_id: String,
    pub sequence_index: usize,
    pub progressive: Option<i64>,
    pub spatial_tokens: Vec<String>,
    pub wbs6_token: Option<String>,
    pub wbs7_token: Option<String>,
}

impl AggregationKey {
    fn new(measurement: &Measurement, path: &WbsPath) -> Self {
        Self {
            estimate_id: measurement.estimate_id.clone(),
            sequence_index: measurement.sequence_index,
            progressive: measurement.progressive,
            spatial_tokens: path.spatial_tokens(),
            wbs6_token: path.token(6),
            wbs7_token: path.token(7),
        }
    }
}

// ==========================================
// AggregatedVoice - 聚合累加器
// ==========================================
#[derive(Debug, Clone)]
pub struct AggregatedVoice {
    pub product: Product,
    pub progressive: Option<i64>,
    pub unit_price: Decimal,
    pub price_list_used: Option<String>,
    pub wbs: WbsPath,
    pub quantity: Decimal,          // 未舍入累加
    pub line_amount_total: Decimal, // 逐行舍入后累加
    pub notes: IndexSet<String>,
    pub progressives_seen: BTreeSet<ProgressiveKey>,
    pub price_list_ids_used: IndexSet<String>,
    pub reference_progressives: BTreeSet<ProgressiveKey>,
    pub rows: usize,
}

impl AggregatedVoice {
    /// 输出为 Voice（数量/金额量化到 2 位）
    fn into_voice(self, order: usize, unit: Option<String>) -> Voice {
        let metadata = VoiceMetadata {
            price_list_ids: self.price_list_ids_used.into_iter().collect(),
            price_list_used: self.price_list_used,
            progressive_keys: self.progressives_seen.iter().map(|k| k.to_string()).collect(),
            reference_keys: self
                .reference_progressives
                .iter()
                .map(|k| k.to_string())
                .collect(),
            raw_wbs_path: self.wbs.raw_path(),
            fallback_wbs6: self.wbs.fallback_generated,
            measurement_rows: self.rows,
        };

        Voice {
            order,
            progressive: self.progressive,
            code: self.product.code.clone(),
            description: self.product.enriched_description.clone(),
            wbs_path: self.wbs.levels,
            unit,
            quantity: quantize_output(self.quantity),
            unit_price: quantize_output(self.unit_price),
            amount: quantize_output(self.line_amount_total),
            notes: self.notes.into_iter().collect(),
            metadata,
        }
    }
}

// ==========================================
// AggregationOutput - 聚合输出
// ==========================================
#[derive(Debug, Clone)]
pub struct AggregationOutput {
    pub voices: Vec<Voice>,
    pub total_amount: Option<Decimal>,
    pub total_quantity: Option<Decimal>,
    pub stats: ImportStats,
    pub anomalies: Vec<ImportAnomaly>,
}

// ==========================================
// VoiceAggregator - 聚合器
// ==========================================
// 生命周期: 单一预算方案的一次遍历
pub struct VoiceAggregator<'a> {
    estimate_id: String,
    tables: &'a DefinitionTables,
    wbs_builder: &'a WbsBuilder,
    preference: Vec<String>,
    aggregates: IndexMap<AggregationKey, AggregatedVoice>,
    stats: ImportStats,
    anomalies: Vec<ImportAnomaly>,
}

impl<'a> VoiceAggregator<'a> {
    /// 创建聚合器
    ///
    /// # 参数
    /// - preference: 方案级首选价目表（规范 ID,按优先顺序）
    pub fn new(
        estimate_id: impl Into<String>,
        tables: &'a DefinitionTables,
        wbs_builder: &'a WbsBuilder,
        preference: Vec<String>,
    ) -> Self {
        Self {
            estimate_id: estimate_id.into(),
            tables,
            wbs_builder,
            preference,
            aggregates: IndexMap::new(),
            stats: ImportStats::default(),
            anomalies: Vec::new(),
        }
    }

    /// 外部登记的异常（如引用目标缺失）
    pub fn record_unresolved_reference(&mut self, target: &ProgressiveKey) {
        self.stats.unresolved_references += 1;
        self.anomaly(
            AnomalyKind::UnresolvedReference,
            None,
            Some(target.progressive),
            format!("引用目标进度号不存在: {}", target),
        );
    }

    fn anomaly(
        &mut self,
        kind: AnomalyKind,
        sequence_index: Option<usize>,
        progressive: Option<i64>,
        message: String,
    ) {
        self.anomalies.push(ImportAnomaly {
            kind,
            estimate_id: self.estimate_id.clone(),
            sequence_index,
            progressive,
            message,
        });
    }

    /// 行级价目表偏好: [行自身映射价目表] + 方案首选
    fn preference_for(&self, row_list: Option<&str>) -> Vec<String> {
        let mut preference: Vec<String> = Vec::with_capacity(self.preference.len() + 1);
        if let Some(list) = row_list {
            preference.push(list.to_string());
        }
        for list in &self.preference {
            if !preference.contains(list) {
                preference.push(list.clone());
            }
        }
        preference
    }

    // ==========================================
    // 逐行累加
    // ==========================================

    /// 累加一行（须已完成引用解析）
    pub fn push(&mut self, measurement: &Measurement) -> ImportResult<()> {
        self.stats.measurements_total += 1;
        let tables = self.tables;
        let wbs_builder = self.wbs_builder;
        let sequence_index = Some(measurement.sequence_index);

        let Some(product) = tables.product(&measurement.product_id) else {
            debug!(
                estimate_id = %measurement.estimate_id,
                product_id = %measurement.product_id,
                "产品不存在,跳过该行"
            );
            self.stats.ignored_missing_product += 1;
            self.anomaly(
                AnomalyKind::MissingProduct,
                sequence_index,
                measurement.progressive,
                format!("产品不存在: {}", measurement.product_id),
            );
            return Ok(());
        };

        let Some(quantity) = measurement.quantity_resolved else {
            self.stats.ignored_empty_rows += 1;
            self.anomaly(
                AnomalyKind::EmptyRow,
                sequence_index,
                measurement.progressive,
                format!("测量行无数值 (行 {})", measurement.row_index),
            );
            return Ok(());
        };

        let row_list = measurement
            .price_list_id_raw
            .as_deref()
            .and_then(|raw| tables.canonical_list_id(raw));
        let preference = self.preference_for(row_list);
        let picked = product.pick_price(row_list, &preference);
        let (price_list_used, price) = match picked {
            Some((list, price)) => (Some(list), price),
            None => {
                self.stats.missing_price_zeroed += 1;
                self.anomaly(
                    AnomalyKind::MissingPrice,
                    sequence_index,
                    measurement.progressive,
                    format!("产品 {} 无可用单价,按 0 计", product.code),
                );
                (None, Decimal::ZERO)
            }
        };

        let path = wbs_builder.build_path(measurement, product, tables);
        let key = AggregationKey::new(measurement, &path);

        if !self.aggregates.contains_key(&key) {
            if path.fallback_generated {
                self.stats.fallback_wbs6_generated += 1;
                let code = path.level(6).map(|l| l.code.clone()).unwrap_or_default();
                self.anomaly(
                    AnomalyKind::FallbackWbs6,
                    sequence_index,
                    measurement.progressive,
                    format!("产品 {} 缺少 WBS6,使用兜底编码 {}", product.code, code),
                );
            }
            self.aggregates.insert(
                key.clone(),
                AggregatedVoice {
                    product: product.clone(),
                    progressive: measurement.progressive,
                    unit_price: price,
                    price_list_used: price_list_used.clone(),
                    wbs: path,
                    quantity: Decimal::ZERO,
                    line_amount_total: Decimal::ZERO,
                    notes: IndexSet::new(),
                    progressives_seen: BTreeSet::new(),
                    price_list_ids_used: IndexSet::new(),
                    reference_progressives: BTreeSet::new(),
                    rows: 0,
                },
            );
        }

        let conflict = {
            let Some(aggregate) = self.aggregates.get_mut(&key) else {
                return Err(ImportError::InternalError("聚合条目丢失".to_string()));
            };

            let conflict = (aggregate.unit_price != price).then_some(aggregate.unit_price);

            let contribution = line_amount(quantity, aggregate.unit_price).ok_or_else(|| {
                ImportError::InternalError(format!("金额溢出: 产品 {}", aggregate.product.code))
            })?;
            aggregate.line_amount_total = aggregate
                .line_amount_total
                .checked_add(contribution)
                .ok_or_else(|| ImportError::InternalError("金额累加溢出".to_string()))?;
            aggregate.quantity = aggregate
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| ImportError::InternalError("数量累加溢出".to_string()))?;
            aggregate.rows += 1;

            for comment in &measurement.comments {
                let note = comment.trim();
                if !note.is_empty() {
                    aggregate.notes.insert(note.to_string());
                }
            }
            if let Some(key) = measurement.key() {
                aggregate.progressives_seen.insert(key);
            }
            for entry in &measurement.reference_entries {
                aggregate.reference_progressives.insert(entry.target.clone());
            }
            aggregate.price_list_ids_used.extend(preference);
            if let Some(list) = price_list_used {
                aggregate.price_list_ids_used.insert(list);
            }
            conflict
        };

        if let Some(first_price) = conflict {
            warn!(
                estimate_id = %measurement.estimate_id,
                product = %product.code,
                first_price = %first_price,
                discarded_price = %price,
                "同一聚合键单价不一致,保留首见单价"
            );
            self.stats.price_conflicts += 1;
            self.anomaly(
                AnomalyKind::PriceConflict,
                sequence_index,
                measurement.progressive,
                format!(
                    "产品 {} 单价冲突: 保留 {},忽略 {}",
                    product.code, first_price, price
                ),
            );
        }

        self.stats.imported += 1;
        Ok(())
    }

    /// 依次累加
    pub fn extend<'m>(
        &mut self,
        measurements: impl IntoIterator<Item = &'m Measurement>,
    ) -> ImportResult<()> {
        for measurement in measurements {
            self.push(measurement)?;
        }
        Ok(())
    }

    // ==========================================
    // 输出
    // ==========================================

    /// 结束遍历,输出清单条目与总额
    ///
    /// # 返回
    /// - Err(InternalError): 总额或总量累加溢出
    pub fn finish(self) -> ImportResult<AggregationOutput> {
        let tables = self.tables;
        let mut voices: Vec<Voice> = Vec::with_capacity(self.aggregates.len());
        for (index, (_, aggregate)) in self.aggregates.into_iter().enumerate() {
            let unit = aggregate.product.unit.clone();
            let unit = unit.map(|u| tables.unit_symbol(&u).map(str::to_string).unwrap_or(u));
            voices.push(aggregate.into_voice(index + 1, unit));
        }

        let (total_amount, total_quantity) = if voices.is_empty() {
            (None, None)
        } else {
            let amount = checked_total(&voices, |v| v.amount).ok_or_else(|| {
                ImportError::InternalError(format!("预算方案 {} 总金额溢出", self.estimate_id))
            })?;
            let quantity = checked_total(&voices, |v| v.quantity).ok_or_else(|| {
                ImportError::InternalError(format!("预算方案 {} 总工程量溢出", self.estimate_id))
            })?;
            (Some(quantize_output(amount)), Some(quantize_output(quantity)))
        };

        info!(
            estimate_id = %self.estimate_id,
            voices = voices.len(),
            imported = self.stats.imported,
            ignored_missing_product = self.stats.ignored_missing_product,
            missing_price_zeroed = self.stats.missing_price_zeroed,
            fallback_wbs6_generated = self.stats.fallback_wbs6_generated,
            "清单条目聚合完成"
        );

        Ok(AggregationOutput {
            voices,
            total_amount,
            total_quantity,
            stats: self.stats,
            anomalies: self.anomalies,
        })
    }
}

fn checked_total(voices: &[Voice], field: impl Fn(&Voice) -> Decimal) -> Option<Decimal> {
    voices
        .iter()
        .try_fold(Decimal::ZERO, |acc, voice| acc.checked_add(field(voice)))
}
