// ==========================================
// 计量计价导入 - 测量行构建与 "vedi voce" 引用抽取
// ==========================================
// 职责: RawMeasurement → Measurement
//   1. 逐格公式求值
//   2. 行乘积
//   3. 注释文本 + 结构化引用 → ReferenceEntry
//   4. 有引用则抑制直接工程量
// ==========================================

use crate::config::ImportConfig;
use crate::domain::measurement::{
    Measurement, MeasurementCell, ProgressiveKey, RawMeasurement, ReferenceEntry,
};
use crate::domain::types::Operation;
use crate::engine::formula::{row_product, FormulaEvaluator};
use crate::importer::error::{ImportError, ImportResult};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::trace;

// ==========================================
// ReferenceExtractor - 引用抽取器
// ==========================================
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    pattern: Regex,
}

impl ReferenceExtractor {
    /// 创建抽取器
    ///
    /// # 约定
    /// - 第 1 捕获组: 目标进度号
    /// - 第 2 捕获组（可选）: 显式乘数
    pub fn new(pattern: &str) -> ImportResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| ImportError::ConfigValueError {
            key: "reference_pattern".to_string(),
            value: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// 从注释文本抽取引用
    ///
    /// # 参数
    /// - row_multiplier: 行乘积（无显式乘数时使用,缺失按 1）
    /// - operation: 扣减行乘数取负
    pub fn extract(
        &self,
        estimate_id: &str,
        texts: &[String],
        row_multiplier: Option<Decimal>,
        operation: Operation,
    ) -> Vec<ReferenceEntry> {
        let mut entries = Vec::new();
        for text in texts {
            for caps in self.pattern.captures_iter(text) {
                let Some(progressive) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok())
                else {
                    continue;
                };
                let explicit = caps
                    .get(2)
                    .and_then(|m| Decimal::from_str(&m.as_str().replace(',', ".")).ok());
                let base = explicit.or(row_multiplier).unwrap_or(Decimal::ONE);
                entries.push(ReferenceEntry {
                    target: ProgressiveKey::new(estimate_id, progressive),
                    multiplier: base * operation.sign(),
                });
            }
        }
        entries
    }
}

// ==========================================
// MeasurementBuilder - 测量行构建器
// ==========================================
#[derive(Debug, Clone)]
pub struct MeasurementBuilder {
    evaluator: FormulaEvaluator,
    extractor: ReferenceExtractor,
}

impl MeasurementBuilder {
    pub fn new(evaluator: FormulaEvaluator, extractor: ReferenceExtractor) -> Self {
        Self {
            evaluator,
            extractor,
        }
    }

    /// 按配置快照创建
    pub fn from_config(config: &ImportConfig) -> ImportResult<Self> {
        Ok(Self::new(
            FormulaEvaluator::new(config.max_formula_length),
            ReferenceExtractor::new(&config.reference_pattern)?,
        ))
    }

    /// 构建测量行
    ///
    /// # 规则
    /// - 无引用: quantity_direct = 行乘积 × 符号（无数值单元格 → None）
    /// - 有引用: quantity_direct = None,行乘积作为引用乘数
    pub fn build(&self, raw: RawMeasurement) -> Measurement {
        let cells: Vec<MeasurementCell> = raw
            .cells
            .into_iter()
            .map(|cell| MeasurementCell {
                value: self.evaluator.evaluate(&cell.text),
                position: cell.position,
                raw_text: cell.text,
            })
            .collect();

        let product = row_product(&cells);
        let sign = raw.operation.sign();

        // 结构化引用优先,注释中指向同一目标的文字引用不重复计入
        let mut reference_entries: Vec<ReferenceEntry> = self
            .extractor
            .extract(&raw.estimate_id, &raw.comments, product, raw.operation)
            .into_iter()
            .filter(|entry| !raw.linked_progressives.contains(&entry.target.progressive))
            .collect();
        for target in &raw.linked_progressives {
            reference_entries.push(ReferenceEntry {
                target: ProgressiveKey::new(raw.estimate_id.clone(), *target),
                multiplier: product.unwrap_or(Decimal::ONE) * sign,
            });
        }

        let quantity_direct = if reference_entries.is_empty() {
            product.map(|p| p * sign)
        } else {
            trace!(
                estimate_id = %raw.estimate_id,
                sequence_index = raw.sequence_index,
                references = reference_entries.len(),
                "引用行,抑制直接工程量"
            );
            None
        };

        Measurement {
            estimate_id: raw.estimate_id,
            sequence_index: raw.sequence_index,
            row_index: raw.row_index,
            product_id: raw.product_id,
            progressive: raw.progressive,
            price_list_id_raw: raw.price_list_id_raw,
            spatial_wbs_refs: raw.spatial_wbs_refs,
            operation: raw.operation,
            cells,
            comments: raw.comments,
            reference_entries,
            quantity_direct,
            quantity_resolved: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::import_config_trait::DEFAULT_REFERENCE_PATTERN;
    use crate::domain::measurement::RawCell;

    fn extractor() -> ReferenceExtractor {
        ReferenceExtractor::new(DEFAULT_REFERENCE_PATTERN).unwrap()
    }

    fn builder() -> MeasurementBuilder {
        MeasurementBuilder::from_config(&ImportConfig::default()).unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn raw(cells: Vec<RawCell>, comments: Vec<&str>, operation: Operation) -> RawMeasurement {
        RawMeasurement {
            estimate_id: "E1".to_string(),
            sequence_index: 0,
            row_index: 0,
            product_id: "P1".to_string(),
            progressive: Some(5),
            price_list_id_raw: None,
            spatial_wbs_refs: vec![],
            operation,
            cells,
            comments: comments.into_iter().map(String::from).collect(),
            linked_progressives: vec![],
        }
    }

    #[test]
    fn test_extract_patterns() {
        let extractor = extractor();
        let texts = vec![
            "Vedi voce n. 12".to_string(),
            "come da vedi voce 3 x 2,5".to_string(),
            "nessun riferimento".to_string(),
        ];
        let entries = extractor.extract("E1", &texts, None, Operation::Add);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target, ProgressiveKey::new("E1", 12));
        assert_eq!(entries[0].multiplier, Decimal::ONE);
        assert_eq!(entries[1].target, ProgressiveKey::new("E1", 3));
        assert_eq!(entries[1].multiplier, d("2.5"));
    }

    #[test]
    fn test_extract_uses_row_product_and_sign() {
        let extractor = extractor();
        let texts = vec!["vedi voce 4".to_string()];
        let entries = extractor.extract("E1", &texts, Some(d("3")), Operation::Subtract);
        assert_eq!(entries[0].multiplier, d("-3"));
    }

    #[test]
    fn test_build_direct_quantity() {
        let builder = builder();
        let m = builder.build(raw(
            vec![RawCell::new(1, "2"), RawCell::new(2, "3,5")],
            vec![],
            Operation::Add,
        ));
        assert_eq!(m.quantity_direct, Some(d("7")));
        assert!(!m.has_references());
    }

    #[test]
    fn test_build_deduction_row() {
        let builder = builder();
        let m = builder.build(raw(vec![RawCell::new(1, "4")], vec![], Operation::Subtract));
        assert_eq!(m.quantity_direct, Some(d("-4")));
    }

    #[test]
    fn test_reference_suppresses_direct_quantity() {
        let builder = builder();
        let m = builder.build(raw(
            vec![RawCell::new(1, "2")],
            vec!["vedi voce 1"],
            Operation::Add,
        ));
        assert_eq!(m.quantity_direct, None);
        assert_eq!(m.reference_entries.len(), 1);
        assert_eq!(m.reference_entries[0].multiplier, d("2"));
    }

    #[test]
    fn test_linked_progressives_become_references() {
        let builder = builder();
        let mut r = raw(vec![], vec![], Operation::Add);
        r.linked_progressives = vec![9];
        let m = builder.build(r);
        assert_eq!(m.reference_entries[0].target, ProgressiveKey::new("E1", 9));
        assert_eq!(m.reference_entries[0].multiplier, Decimal::ONE);
        assert_eq!(m.quantity_direct, None);
    }

    #[test]
    fn test_linked_progressive_not_duplicated_by_comment() {
        let builder = builder();
        let mut r = raw(vec![RawCell::new(1, "3")], vec!["Vedi voce n° 9"], Operation::Add);
        r.linked_progressives = vec![9];
        let m = builder.build(r);
        assert_eq!(m.reference_entries.len(), 1);
        assert_eq!(m.reference_entries[0].multiplier, d("3"));
    }

    #[test]
    fn test_empty_row_has_no_quantity() {
        let builder = builder();
        let m = builder.build(raw(vec![RawCell::new(1, "")], vec![], Operation::Add));
        assert_eq!(m.quantity_direct, None);
        assert!(!m.has_numeric_cells());
    }
}
