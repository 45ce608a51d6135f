// ==========================================
// 计量计价导入 - 领域类型定义
// ==========================================
// 职责: 分组类型、测量操作符、来源格式、异常类型等枚举
// 红线: 分类只在解析阶段做一次,下游不再按字符串判断
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 分组类型 (Group Kind)
// ==========================================
// Spatial(1..=5): 空间 WBS 层级
// Wbs6 / Wbs7: 工作内容(商品)分类层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "level", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupKind {
    Spatial(u8),
    Wbs6,
    Wbs7,
    Other,
}

impl GroupKind {
    /// WBS 层级号（1-7）,Other 返回 None
    pub fn level(&self) -> Option<u8> {
        match self {
            GroupKind::Spatial(level) => Some(*level),
            GroupKind::Wbs6 => Some(6),
            GroupKind::Wbs7 => Some(7),
            GroupKind::Other => None,
        }
    }

    /// 由层级号构造分组类型
    pub fn from_level(level: u8) -> Self {
        match level {
            1..=5 => GroupKind::Spatial(level),
            6 => GroupKind::Wbs6,
            7 => GroupKind::Wbs7,
            _ => GroupKind::Other,
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, GroupKind::Spatial(_))
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Spatial(level) => write!(f, "SPATIAL_{:02}", level),
            GroupKind::Wbs6 => write!(f, "WBS_06"),
            GroupKind::Wbs7 => write!(f, "WBS_07"),
            GroupKind::Other => write!(f, "OTHER"),
        }
    }
}

// ==========================================
// 测量操作符 (Operation)
// ==========================================
// '+' 正常计量, '-' 扣减
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    #[default]
    Add,
    Subtract,
}

impl Operation {
    /// 解析操作符文本（空值/无法识别 → Add）
    pub fn from_symbol(symbol: Option<&str>) -> Self {
        match symbol.map(str::trim) {
            Some("-") => Operation::Subtract,
            Some(s) if s.eq_ignore_ascii_case("sottrai") || s.eq_ignore_ascii_case("meno") => {
                Operation::Subtract
            }
            _ => Operation::Add,
        }
    }

    /// 符号系数: +1 / -1
    pub fn sign(&self) -> Decimal {
        match self {
            Operation::Add => Decimal::ONE,
            Operation::Subtract => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => write!(f, "+"),
            Operation::Subtract => write!(f, "-"),
        }
    }
}

// ==========================================
// 来源格式 (Source Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    SixArchive, // .six 压缩容器
    SixXml,     // 裸 SIX XML
    Xpwe,       // PriMus XPWE
}

impl SourceFormat {
    /// 是否为 SIX 方言（容器或裸 XML）
    pub fn is_six(&self) -> bool {
        matches!(self, SourceFormat::SixArchive | SourceFormat::SixXml)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::SixArchive => write!(f, "SIX_ARCHIVE"),
            SourceFormat::SixXml => write!(f, "SIX_XML"),
            SourceFormat::Xpwe => write!(f, "XPWE"),
        }
    }
}

// ==========================================
// 导入异常类型 (Anomaly Kind)
// ==========================================
// 可恢复异常: 只计数+记录,不抛出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    MissingProduct,      // 行对应的产品不在目录中
    MissingPrice,        // 无可用单价,按 0 计
    FallbackWbs6,        // 生成了兜底 WBS6
    PriceConflict,       // 同一聚合键出现不同单价
    UnresolvedReference, // 引用的进度号不存在
    EmptyRow,            // 行无数值单元格
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyKind::MissingProduct => "MISSING_PRODUCT",
            AnomalyKind::MissingPrice => "MISSING_PRICE",
            AnomalyKind::FallbackWbs6 => "FALLBACK_WBS6",
            AnomalyKind::PriceConflict => "PRICE_CONFLICT",
            AnomalyKind::UnresolvedReference => "UNRESOLVED_REFERENCE",
            AnomalyKind::EmptyRow => "EMPTY_ROW",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_kind_levels() {
        assert_eq!(GroupKind::Spatial(3).level(), Some(3));
        assert_eq!(GroupKind::Wbs6.level(), Some(6));
        assert_eq!(GroupKind::Wbs7.level(), Some(7));
        assert_eq!(GroupKind::Other.level(), None);
        assert_eq!(GroupKind::from_level(5), GroupKind::Spatial(5));
        assert_eq!(GroupKind::from_level(9), GroupKind::Other);
    }

    #[test]
    fn test_operation_sign() {
        assert_eq!(Operation::from_symbol(Some("-")), Operation::Subtract);
        assert_eq!(Operation::from_symbol(Some(" + ")), Operation::Add);
        assert_eq!(Operation::from_symbol(None), Operation::Add);
        assert_eq!(Operation::Subtract.sign(), Decimal::NEGATIVE_ONE);
    }
}
