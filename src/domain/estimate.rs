// ==========================================
// 计量计价导入 - 归一化输出模型
// ==========================================
// 用途: 导入接口返回值,供下游持久化/API 层消费
// 红线: 金额、数量一律 Decimal,禁止浮点
// ==========================================

use crate::domain::catalog::PriceList;
use crate::domain::types::{AnomalyKind, SourceFormat};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==========================================
// WbsLevel - WBS 路径节点
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WbsLevel {
    pub level: u8, // 1-5 空间, 6-7 商品分类
    pub code: String,
    pub description: Option<String>,
}

// ==========================================
// VoiceMetadata - 清单条目审计信息
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMetadata {
    pub price_list_ids: Vec<String>,        // 参与选价的价目表
    pub price_list_used: Option<String>,    // 最终采用的价目表
    pub progressive_keys: Vec<String>,      // 汇入的进度号键
    pub reference_keys: Vec<String>,        // 引用的进度号键
    pub raw_wbs_path: Vec<String>,          // 原始 WBS token 路径
    pub fallback_wbs6: bool,                // WBS6 是否为兜底生成
    pub measurement_rows: usize,            // 贡献的测量行数
}

// ==========================================
// Voice - 清单条目 (Voce)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub order: usize, // 1 起
    pub progressive: Option<i64>,
    pub code: String,
    pub description: String,
    pub wbs_path: Vec<WbsLevel>,
    pub unit: Option<String>,
    pub quantity: Decimal,   // 2 位小数
    pub unit_price: Decimal, // 首见单价
    pub amount: Decimal,     // 逐行四舍五入后累加
    pub notes: Vec<String>,
    pub metadata: VoiceMetadata,
}

impl Voice {
    /// WBS 指定层级节点
    pub fn wbs_level(&self, level: u8) -> Option<&WbsLevel> {
        self.wbs_path.iter().find(|l| l.level == level)
    }
}

// ==========================================
// CatalogEntry - 价目目录条目
// ==========================================
// 按 code+unit+wbs6+wbs7 归一化键去重
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub product_id: String,
    pub code: String,
    pub description: String,
    pub unit: Option<String>,
    pub wbs6_code: Option<String>,
    pub wbs7_code: Option<String>,
    pub prices: Vec<CatalogPrice>,
    pub preferred_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPrice {
    pub price_list_id: String,
    pub price: Decimal,
}

// ==========================================
// NormalizedEstimate - 归一化预算
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEstimate {
    pub estimate_id: String,
    pub title: Option<String>,
    pub source_format: SourceFormat,
    pub total_amount: Option<Decimal>,
    pub total_quantity: Option<Decimal>,
    pub voices: Vec<Voice>,
    pub price_catalog: Vec<CatalogEntry>,
    pub price_lists: Vec<PriceList>,
}

// ==========================================
// ImportStats - 导入统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub measurements_total: usize,      // 方案内测量行总数
    pub imported: usize,                // 计入清单的测量行
    pub ignored_missing_product: usize, // 产品缺失跳过
    pub missing_price_zeroed: usize,    // 无单价按 0 计
    pub fallback_wbs6_generated: usize, // 兜底 WBS6 次数
    pub ignored_empty_rows: usize,      // 无数值行
    pub price_conflicts: usize,         // 同键不同价
    pub unresolved_references: usize,   // 引用目标缺失
}

// ==========================================
// ImportAnomaly - 可恢复异常明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAnomaly {
    pub kind: AnomalyKind,
    pub estimate_id: String,
    pub sequence_index: Option<usize>,
    pub progressive: Option<i64>,
    pub message: String,
}

// ==========================================
// EstimateChoice - 可选预算方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateChoice {
    pub id: String,
    pub label: Option<String>,
    pub measurement_count: usize,
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,              // 批次 ID（UUID）
    pub file_name: Option<String>,     // 源文件名
    pub source_format: SourceFormat,   // 来源格式
    pub estimate_id: String,           // 导入的方案
    pub imported_at: DateTime<Utc>,    // 导入时间
    pub elapsed_ms: u64,               // 导入耗时（毫秒）
}

// ==========================================
// ImportReport - 导入结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch: ImportBatch,
    pub estimate: NormalizedEstimate,
    pub summary: ImportStats,
    pub anomalies: Vec<ImportAnomaly>,
    pub elapsed_time: std::time::Duration,
}
