// ==========================================
// 计量计价导入 - 测量行领域模型 (Rilevazione)
// ==========================================
// 红线: 含引用的测量行,其直接工程量不得绕过引用图解析直接计入
// 生命周期: 仅在单次导入流程内
// ==========================================

use crate::domain::catalog::DefinitionTables;
use crate::domain::estimate::EstimateChoice;
use crate::domain::types::{Operation, SourceFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ProgressiveKey - 进度号键
// ==========================================
// (预算方案 ID, 进度号),引用图的节点键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressiveKey {
    pub estimate_id: String,
    pub progressive: i64,
}

impl ProgressiveKey {
    pub fn new(estimate_id: impl Into<String>, progressive: i64) -> Self {
        Self {
            estimate_id: estimate_id.into(),
            progressive,
        }
    }
}

impl fmt::Display for ProgressiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.estimate_id, self.progressive)
    }
}

// ==========================================
// MeasurementCell - 测量单元格
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementCell {
    pub position: Option<u32>,  // 位置索引（同位置求和,不同位置相乘）
    pub raw_text: String,       // 原始公式文本
    pub value: Option<Decimal>, // 解析值（None=非数值/空白）
}

// ==========================================
// ReferenceEntry - "vedi voce" 引用
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub target: ProgressiveKey,
    pub multiplier: Decimal, // 带符号乘数
}

// ==========================================
// Measurement - 测量行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    // ===== 定位 =====
    pub estimate_id: String,
    pub sequence_index: usize, // 所属计量条目在方案内的顺序号
    pub row_index: usize,      // 条目内行号

    // ===== 关联 =====
    pub product_id: String,
    pub progressive: Option<i64>,
    pub price_list_id_raw: Option<String>,
    pub spatial_wbs_refs: Vec<String>, // 分组值 ID

    // ===== 计量内容 =====
    pub operation: Operation, // 整行符号,行内单元格共用
    pub cells: Vec<MeasurementCell>,
    pub comments: Vec<String>,
    pub reference_entries: Vec<ReferenceEntry>,

    // ===== 派生 =====
    pub quantity_direct: Option<Decimal>,   // 无引用行的直接工程量
    pub quantity_resolved: Option<Decimal>, // 引用图解析后工程量
}

impl Measurement {
    /// 进度号键（无进度号 → None）
    pub fn key(&self) -> Option<ProgressiveKey> {
        self.progressive
            .map(|p| ProgressiveKey::new(self.estimate_id.clone(), p))
    }

    pub fn has_references(&self) -> bool {
        !self.reference_entries.is_empty()
    }

    /// 是否含任何数值单元格
    pub fn has_numeric_cells(&self) -> bool {
        self.cells.iter().any(|c| c.value.is_some())
    }
}

// ==========================================
// RawMeasurement - 解析中间结构体
// ==========================================
// 用途: 方言解析器输出（文本未求值、引用未抽取）
// 生命周期: 仅在导入流程内
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub estimate_id: String,
    pub sequence_index: usize,
    pub row_index: usize,
    pub product_id: String,
    pub progressive: Option<i64>,
    pub price_list_id_raw: Option<String>,
    pub spatial_wbs_refs: Vec<String>,
    pub operation: Operation,
    pub cells: Vec<RawCell>,
    pub comments: Vec<String>,
    pub linked_progressives: Vec<i64>, // 结构化引用（如 XPWE IDVV）
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCell {
    pub position: Option<u32>,
    pub text: String,
}

impl RawCell {
    pub fn new(position: u32, text: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            text: text.into(),
        }
    }
}

// ==========================================
// ParsedEstimate / ParsedDocument - 方言解析输出
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEstimate {
    pub id: String,
    pub label: Option<String>,
    pub default_price_list_raw: Option<String>, // 方案级默认价目表
    pub measurements: Vec<RawMeasurement>,
}

impl ParsedEstimate {
    pub fn choice(&self) -> EstimateChoice {
        EstimateChoice {
            id: self.id.clone(),
            label: self.label.clone(),
            measurement_count: self.measurements.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub source_format: SourceFormat,
    pub title: Option<String>,
    pub tables: DefinitionTables,
    pub estimates: Vec<ParsedEstimate>,
}

impl ParsedDocument {
    pub fn choices(&self) -> Vec<EstimateChoice> {
        self.estimates.iter().map(ParsedEstimate::choice).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progressive_key_display() {
        let key = ProgressiveKey::new("P1", 12);
        assert_eq!(key.to_string(), "P1#12");
    }

    #[test]
    fn test_progressive_key_ordering() {
        let a = ProgressiveKey::new("P1", 2);
        let b = ProgressiveKey::new("P1", 10);
        assert!(a < b);
    }
}
