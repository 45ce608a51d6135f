// ==========================================
// 计量计价导入 - WBS 层级构建
// ==========================================
// 层级: 1-5 空间（来自测量行分组引用）, 6-7 商品分类（来自产品标签）
// 红线: 每条清单条目必须有第 6 层,缺失时生成兜底节点（记录,不报错）
// ==========================================

use crate::domain::catalog::{DefinitionTables, Product};
use crate::domain::estimate::WbsLevel;
use crate::domain::measurement::Measurement;
use crate::domain::types::GroupKind;
use std::collections::BTreeMap;
use tracing::debug;

pub const FALLBACK_PROGRESSIVE_PREFIX: &str = "PROG-";

// ==========================================
// 分组类型分类
// ==========================================

/// 由分组类型标签识别层级
///
/// # 示例
/// - "WBS 01" / "wbs1" / "WBS_05" → Spatial(1..5)
/// - "WBS 06" → Wbs6, "WBS 07" → Wbs7
/// - 其他 → Other
pub fn classify_group_label(label: &str) -> GroupKind {
    let lowered = label.to_lowercase();
    let Some(start) = lowered.find("wbs") else {
        return GroupKind::Other;
    };
    let digits: String = lowered[start + 3..]
        .chars()
        .skip_while(|c| c.is_whitespace() || *c == '_' || *c == '-' || *c == '.')
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u8>() {
        Ok(level) => GroupKind::from_level(level),
        Err(_) => GroupKind::Other,
    }
}

// ==========================================
// WbsPath - 构建结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbsPath {
    pub levels: Vec<WbsLevel>, // 按层级升序
    pub fallback_generated: bool,
}

impl WbsPath {
    pub fn level(&self, level: u8) -> Option<&WbsLevel> {
        self.levels.iter().find(|l| l.level == level)
    }

    /// 空间层 token 元组（1-5）
    pub fn spatial_tokens(&self) -> Vec<String> {
        self.levels
            .iter()
            .filter(|l| l.level <= 5)
            .map(level_token)
            .collect()
    }

    pub fn token(&self, level: u8) -> Option<String> {
        self.level(level).map(level_token)
    }

    /// 审计用原始路径: "L<level>:<code>"
    pub fn raw_path(&self) -> Vec<String> {
        self.levels
            .iter()
            .map(|l| format!("L{}:{}", l.level, l.code))
            .collect()
    }
}

/// 聚合 token: 编码优先,缺失时用描述;去空白、小写
pub fn level_token(level: &WbsLevel) -> String {
    let code = level.code.trim();
    let raw = if code.is_empty() {
        level.description.as_deref().unwrap_or("").trim()
    } else {
        code
    };
    raw.to_lowercase()
}

/// 去除非字母数字字符并转大写
pub fn sanitize_code(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

// ==========================================
// WbsBuilder - 层级构建器
// ==========================================
#[derive(Debug, Clone)]
pub struct WbsBuilder {
    fallback_code: String,
}

impl WbsBuilder {
    /// # 参数
    /// - fallback_code: 所有候选都为空时使用的编码（默认 "UNMAPPED"）
    pub fn new(fallback_code: impl Into<String>) -> Self {
        Self {
            fallback_code: fallback_code.into(),
        }
    }

    /// 构建测量行的 WBS 路径
    ///
    /// # 规则
    /// 1. 测量行空间分组引用 → 1-5 层（同层后者覆盖前者）
    /// 2. 产品 WBS6/WBS7 标签 → 6/7 层
    /// 3. 测量行直接引用的 6/7 层分组仅在产品无标签时使用
    /// 4. 仍无第 6 层 → 生成兜底节点
    pub fn build_path(
        &self,
        measurement: &Measurement,
        product: &Product,
        tables: &DefinitionTables,
    ) -> WbsPath {
        let mut levels: BTreeMap<u8, WbsLevel> = BTreeMap::new();
        let mut commodity_refs: BTreeMap<u8, WbsLevel> = BTreeMap::new();

        for group_id in &measurement.spatial_wbs_refs {
            let Some(group) = tables.group(group_id) else {
                debug!(group_id = %group_id, "分组引用不存在,忽略");
                continue;
            };
            let Some(level) = group.level() else {
                continue;
            };
            let node = WbsLevel {
                level,
                code: group.code.clone().unwrap_or_else(|| group.id.clone()),
                description: group.description.clone(),
            };
            if group.kind.is_spatial() {
                levels.insert(level, node);
            } else {
                commodity_refs.insert(level, node);
            }
        }

        if let Some(code) = non_empty(product.wbs6_code.as_deref()) {
            levels.insert(
                6,
                WbsLevel {
                    level: 6,
                    code: code.to_string(),
                    description: product.wbs6_description.clone(),
                },
            );
        }
        if let Some(code) = non_empty(product.wbs7_code.as_deref()) {
            levels.insert(
                7,
                WbsLevel {
                    level: 7,
                    code: code.to_string(),
                    description: product.wbs7_description.clone(),
                },
            );
        }
        for (level, node) in commodity_refs {
            levels.entry(level).or_insert(node);
        }

        let mut fallback_generated = false;
        if !levels.contains_key(&6) {
            let node = self.fallback_wbs6(product, measurement.progressive);
            debug!(
                product_id = %product.id,
                fallback_code = %node.code,
                "缺少 WBS6,生成兜底节点"
            );
            levels.insert(6, node);
            fallback_generated = true;
        }

        WbsPath {
            levels: levels.into_values().collect(),
            fallback_generated,
        }
    }

    /// 兜底 WBS6 节点
    ///
    /// 候选顺序: wbs6_code → code → product id → "PROG-<进度号>"
    pub fn fallback_wbs6(&self, product: &Product, progressive: Option<i64>) -> WbsLevel {
        let progressive_candidate =
            progressive.map(|p| format!("{}{}", FALLBACK_PROGRESSIVE_PREFIX, p));
        let candidate = [
            product.wbs6_code.as_deref(),
            Some(product.code.as_str()),
            Some(product.id.as_str()),
            progressive_candidate.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|c| !c.trim().is_empty())
        .unwrap_or("");

        let mut code = sanitize_code(candidate);
        if code.is_empty() {
            code = self.fallback_code.clone();
        }

        let description = non_empty(Some(product.description.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| code.clone());

        WbsLevel {
            level: 6,
            code,
            description: Some(description),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::GroupValue;
    use crate::domain::types::Operation;
    use indexmap::IndexMap;
    use std::collections::HashMap;

    fn product(code: &str, wbs6: Option<&str>) -> Product {
        Product {
            id: "PRD-1".to_string(),
            code: code.to_string(),
            description: "Calcestruzzo".to_string(),
            unit: Some("m3".to_string()),
            price_by_list: IndexMap::new(),
            price_priority: HashMap::new(),
            wbs6_code: wbs6.map(String::from),
            wbs6_description: wbs6.map(|_| "Strutture".to_string()),
            wbs7_code: None,
            wbs7_description: None,
            is_parent_voice: false,
            enriched_description: "Calcestruzzo".to_string(),
        }
    }

    fn measurement(refs: &[&str], progressive: Option<i64>) -> Measurement {
        Measurement {
            estimate_id: "E1".to_string(),
            sequence_index: 0,
            row_index: 0,
            product_id: "PRD-1".to_string(),
            progressive,
            price_list_id_raw: None,
            spatial_wbs_refs: refs.iter().map(|r| r.to_string()).collect(),
            operation: Operation::Add,
            cells: vec![],
            comments: vec![],
            reference_entries: vec![],
            quantity_direct: None,
            quantity_resolved: None,
        }
    }

    fn tables() -> DefinitionTables {
        let mut tables = DefinitionTables::default();
        for (id, code, label) in [
            ("G1", "EDIFICIO A", "WBS 01"),
            ("G2", "PIANO 1", "WBS 02"),
            ("G3", "EDIFICIO B", "WBS 01"),
            ("G6", "OPERE", "WBS 06"),
        ] {
            tables.groups.insert(
                id.to_string(),
                GroupValue {
                    id: id.to_string(),
                    code: Some(code.to_string()),
                    description: None,
                    kind: classify_group_label(label),
                    group_label: label.to_string(),
                },
            );
        }
        tables
    }

    #[test]
    fn test_classify_group_label() {
        assert_eq!(classify_group_label("WBS 01"), GroupKind::Spatial(1));
        assert_eq!(classify_group_label("wbs5"), GroupKind::Spatial(5));
        assert_eq!(classify_group_label("Livello WBS_06"), GroupKind::Wbs6);
        assert_eq!(classify_group_label("WBS 07"), GroupKind::Wbs7);
        assert_eq!(classify_group_label("WBS 09"), GroupKind::Other);
        assert_eq!(classify_group_label("Categoria"), GroupKind::Other);
    }

    #[test]
    fn test_fallback_code_from_product_code() {
        let builder = WbsBuilder::new("UNMAPPED");
        let node = builder.fallback_wbs6(&product("L032.020.07", None), None);
        assert_eq!(node.code, "L03202007");
        assert_eq!(node.description.as_deref(), Some("Calcestruzzo"));
    }

    #[test]
    fn test_fallback_code_unmapped() {
        let builder = WbsBuilder::new("UNMAPPED");
        let mut p = product("...", None);
        p.id = "--".to_string();
        assert_eq!(builder.fallback_wbs6(&p, None).code, "UNMAPPED");
        // 进度号候选
        p.code = String::new();
        p.id = String::new();
        assert_eq!(builder.fallback_wbs6(&p, Some(12)).code, "PROG12");
    }

    #[test]
    fn test_build_path_orders_levels_and_last_spatial_wins() {
        let builder = WbsBuilder::new("UNMAPPED");
        let path = builder.build_path(
            &measurement(&["G2", "G1", "G3"], Some(1)),
            &product("A.01", Some("OS01")),
            &tables(),
        );
        let levels: Vec<u8> = path.levels.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![1, 2, 6]);
        assert_eq!(path.level(1).unwrap().code, "EDIFICIO B");
        assert_eq!(path.level(6).unwrap().code, "OS01");
        assert!(!path.fallback_generated);
        assert_eq!(path.spatial_tokens(), vec!["edificio b", "piano 1"]);
    }

    #[test]
    fn test_measurement_commodity_group_used_when_product_untagged() {
        let builder = WbsBuilder::new("UNMAPPED");
        let path = builder.build_path(
            &measurement(&["G6"], None),
            &product("A.01", None),
            &tables(),
        );
        assert_eq!(path.token(6).as_deref(), Some("opere"));
        assert!(!path.fallback_generated);
    }

    #[test]
    fn test_build_path_generates_fallback() {
        let builder = WbsBuilder::new("UNMAPPED");
        let path = builder.build_path(
            &measurement(&["missing"], None),
            &product("L032.020.07", None),
            &tables(),
        );
        assert!(path.fallback_generated);
        assert_eq!(path.levels.len(), 1);
        assert_eq!(path.raw_path(), vec!["L6:L03202007".to_string()]);
    }
}
