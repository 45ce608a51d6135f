// ==========================================
// 计量计价导入 - 解析会话
// ==========================================
// 职责: 单个文档一次导入所需的全部状态（配置快照、价目表归一化记忆、构建器）
// 红线: 无全局可变状态;会话不跨文档复用
// 红线: 引用图缓存与在途集合按预算方案创建,不在方案间共享
// ==========================================
// 阶段: 测量行构建 → 引用图解析 → 清单聚合 → 价目目录
// ==========================================

use crate::config::ImportConfig;
use crate::domain::catalog::DefinitionTables;
use crate::domain::estimate::{CatalogEntry, ImportAnomaly, ImportStats, Voice};
use crate::domain::measurement::{Measurement, ParsedEstimate};
use crate::engine::aggregator::{build_price_catalog, VoiceAggregator};
use crate::engine::price_list::{preferred_order, PriceListCanonicalizer};
use crate::engine::reference_graph::ReferenceGraph;
use crate::engine::references::MeasurementBuilder;
use crate::engine::wbs::WbsBuilder;
use crate::importer::error::ImportResult;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

// ==========================================
// EstimateOutcome - 单方案处理结果
// ==========================================
#[derive(Debug, Clone)]
pub struct EstimateOutcome {
    pub voices: Vec<Voice>,
    pub total_amount: Option<Decimal>,
    pub total_quantity: Option<Decimal>,
    pub price_catalog: Vec<CatalogEntry>,
    pub stats: ImportStats,
    pub anomalies: Vec<ImportAnomaly>,
}

// ==========================================
// ParseSession - 解析会话
// ==========================================
#[derive(Debug, Clone)]
pub struct ParseSession {
    config: ImportConfig,
    canonicalizer: PriceListCanonicalizer,
    measurement_builder: MeasurementBuilder,
    wbs_builder: WbsBuilder,
}

impl ParseSession {
    /// 创建会话
    ///
    /// # 返回
    /// - Err(ConfigValueError): 引用正则无法编译
    pub fn new(config: ImportConfig) -> ImportResult<Self> {
        let measurement_builder = MeasurementBuilder::from_config(&config)?;
        Ok(Self {
            canonicalizer: PriceListCanonicalizer::new(
                config.preferred_price_list_keywords.clone(),
            ),
            wbs_builder: WbsBuilder::new(config.fallback_wbs6_code.clone()),
            measurement_builder,
            config,
        })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &PriceListCanonicalizer {
        &self.canonicalizer
    }

    pub fn canonicalizer_mut(&mut self) -> &mut PriceListCanonicalizer {
        &mut self.canonicalizer
    }

    /// 方案级价目表偏好: [方案默认价目表] + 首选排序
    pub fn estimate_preference(
        &self,
        tables: &DefinitionTables,
        estimate: &ParsedEstimate,
    ) -> Vec<String> {
        let mut preference: Vec<String> = Vec::new();
        if let Some(raw) = estimate.default_price_list_raw.as_deref() {
            if let Some(canonical) = tables
                .canonical_list_id(raw)
                .or_else(|| self.canonicalizer.lookup(raw))
            {
                preference.push(canonical.to_string());
            }
        }
        for id in preferred_order(&tables.price_lists) {
            if !preference.contains(&id) {
                preference.push(id);
            }
        }
        preference
    }

    /// 处理单个预算方案
    ///
    /// # 返回
    /// - Err(CircularReference): 引用成环（致命,不降级）
    #[instrument(skip_all, fields(estimate_id = %estimate.id))]
    pub fn process_estimate(
        &self,
        tables: &DefinitionTables,
        estimate: &ParsedEstimate,
    ) -> ImportResult<EstimateOutcome> {
        // === 步骤 1: 测量行构建 ===
        debug!(rows = estimate.measurements.len(), "步骤 1: 测量行构建");
        let mut measurements: Vec<Measurement> = estimate
            .measurements
            .iter()
            .cloned()
            .map(|raw| self.measurement_builder.build(raw))
            .collect();

        // === 步骤 2: 引用图解析 ===
        debug!("步骤 2: 引用图解析");
        let mut graph = ReferenceGraph::from_measurements(&measurements)?;
        graph.resolve_all()?;
        graph.apply_to(&mut measurements)?;

        // === 步骤 3: 清单聚合 ===
        let preference = self.estimate_preference(tables, estimate);
        debug!(preference = ?preference, "步骤 3: 清单聚合");
        let mut aggregator =
            VoiceAggregator::new(estimate.id.clone(), tables, &self.wbs_builder, preference.clone());
        for target in graph.missing_targets() {
            aggregator.record_unresolved_reference(target);
        }
        aggregator.extend(&measurements)?;
        let output = aggregator.finish()?;

        // === 步骤 4: 价目目录 ===
        debug!("步骤 4: 价目目录");
        let price_catalog = build_price_catalog(tables, &preference);

        Ok(EstimateOutcome {
            voices: output.voices,
            total_amount: output.total_amount,
            total_quantity: output.total_quantity,
            price_catalog,
            stats: output.stats,
            anomalies: output.anomalies,
        })
    }
}
