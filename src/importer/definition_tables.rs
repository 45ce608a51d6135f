// ==========================================
// 计量计价导入 - 定义表构建
// ==========================================
// 职责: 单位、价目表、分组值、产品 → DefinitionTables
// 规则: 产品价格按规范价目表 ID 存储（同一规范 ID 首见价格生效）
// 规则: 非父项产品的描述前缀为最近父项（编码最长前缀匹配）的描述
// ==========================================

use crate::domain::catalog::{DefinitionTables, GroupValue, PriceList, Product, Unit};
use crate::domain::types::GroupKind;
use crate::engine::price_list::PriceListCanonicalizer;
use crate::engine::wbs::classify_group_label;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

const ENRICHED_SEPARATOR: &str = " - ";

/// 解析十进制文本（支持 "," 小数点与 "1.234,56" 千分位）
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') && trimmed.contains('.') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.replace(',', ".")
    };
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// 布尔属性（true/1/si/yes）
pub fn parse_flag(text: Option<&str>) -> bool {
    matches!(
        text.map(|t| t.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "si" | "sì" | "yes" | "s")
    )
}

// ==========================================
// ProductDraft - 产品草稿
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub id: String,
    pub code: String,
    pub description: String,
    pub unit_ref: Option<String>,               // 单位 ID 或符号
    pub prices: Vec<(String, Decimal)>,         // (raw 价目表 ID, 单价)
    pub group_refs: Vec<String>,                // 分组值 ID（WBS6/WBS7 标签）
    pub is_parent_voice: Option<bool>,          // None = 按"无单位且无报价"推断
}

// ==========================================
// DefinitionTablesBuilder - 定义表构建器
// ==========================================
pub struct DefinitionTablesBuilder<'s> {
    canonicalizer: &'s mut PriceListCanonicalizer,
    units: HashMap<String, Unit>,
    price_lists: Vec<PriceList>,
    groups: HashMap<String, GroupValue>,
    drafts: IndexMap<String, ProductDraft>,
}

impl<'s> DefinitionTablesBuilder<'s> {
    pub fn new(canonicalizer: &'s mut PriceListCanonicalizer) -> Self {
        Self {
            canonicalizer,
            units: HashMap::new(),
            price_lists: Vec::new(),
            groups: HashMap::new(),
            drafts: IndexMap::new(),
        }
    }

    pub fn add_unit(&mut self, id: &str, symbol: Option<&str>) {
        let symbol = symbol
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(id)
            .to_string();
        self.units.insert(
            id.to_string(),
            Unit {
                id: id.to_string(),
                symbol,
            },
        );
    }

    /// 登记价目表,返回规范 ID（raw_id 重复时沿用首次登记）
    pub fn add_price_list(&mut self, raw_id: &str, label: Option<&str>) -> String {
        if let Some(existing) = self.price_lists.iter().find(|pl| pl.raw_id == raw_id) {
            return existing.canonical_id.clone();
        }
        let list = self.canonicalizer.register(raw_id, label);
        let canonical_id = list.canonical_id.clone();
        self.price_lists.push(list);
        canonical_id
    }

    /// 登记分组值（由分组类型标签分类）
    pub fn add_group_value(
        &mut self,
        id: &str,
        code: Option<&str>,
        description: Option<&str>,
        group_label: &str,
    ) {
        self.add_group_value_with_kind(id, code, description, group_label, classify_group_label(group_label));
    }

    /// 登记已知类型的分组值
    pub fn add_group_value_with_kind(
        &mut self,
        id: &str,
        code: Option<&str>,
        description: Option<&str>,
        group_label: &str,
        kind: GroupKind,
    ) {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        self.groups.insert(
            id.to_string(),
            GroupValue {
                id: id.to_string(),
                code: clean(code),
                description: clean(description),
                kind,
                group_label: group_label.to_string(),
            },
        );
    }

    pub fn add_product(&mut self, draft: ProductDraft) {
        self.drafts.insert(draft.id.clone(), draft);
    }

    pub fn has_price_list(&self, raw_id: &str) -> bool {
        self.price_lists.iter().any(|pl| pl.raw_id == raw_id)
    }

    // ==========================================
    // 构建
    // ==========================================

    pub fn finish(mut self) -> DefinitionTables {
        // 同一规范 ID 的优先级以会话最终值为准
        for list in &mut self.price_lists {
            list.priority = self.canonicalizer.priority(&list.canonical_id);
        }

        let mut products: IndexMap<String, Product> = IndexMap::with_capacity(self.drafts.len());

        for (id, draft) in self.drafts {
            let mut price_by_list: IndexMap<String, Decimal> = IndexMap::new();
            let mut price_priority: HashMap<String, u8> = HashMap::new();
            for (raw_list, price) in &draft.prices {
                let (canonical, priority) = match self.price_lists.iter().find(|pl| &pl.raw_id == raw_list) {
                    Some(pl) => (pl.canonical_id.clone(), pl.priority),
                    None => {
                        debug!(product_id = %id, price_list = %raw_list, "报价引用了未登记的价目表");
                        (raw_list.clone(), 0)
                    }
                };
                price_by_list.entry(canonical.clone()).or_insert(*price);
                price_priority.entry(canonical).or_insert(priority);
            }

            let mut wbs6 = None;
            let mut wbs7 = None;
            for group_id in &draft.group_refs {
                let Some(group) = self.groups.get(group_id) else {
                    continue;
                };
                let entry = (
                    group.code.clone().or_else(|| group.description.clone()),
                    group.description.clone(),
                );
                match group.kind {
                    GroupKind::Wbs6 => wbs6 = Some(entry),
                    GroupKind::Wbs7 => wbs7 = Some(entry),
                    _ => {}
                }
            }
            let (wbs6_code, wbs6_description) = wbs6.unwrap_or((None, None));
            let (wbs7_code, wbs7_description) = wbs7.unwrap_or((None, None));

            let unit = draft.unit_ref.as_deref().map(|u| {
                self.units
                    .get(u)
                    .map(|unit| unit.symbol.clone())
                    .unwrap_or_else(|| u.to_string())
            });
            let is_parent_voice = draft
                .is_parent_voice
                .unwrap_or(unit.is_none() && draft.prices.is_empty());

            products.insert(
                id.clone(),
                Product {
                    id,
                    code: draft.code.trim().to_string(),
                    enriched_description: draft.description.trim().to_string(),
                    description: draft.description.trim().to_string(),
                    unit,
                    price_by_list,
                    price_priority,
                    wbs6_code,
                    wbs6_description,
                    wbs7_code,
                    wbs7_description,
                    is_parent_voice,
                },
            );
        }

        enrich_descriptions(&mut products);

        info!(
            units = self.units.len(),
            price_lists = self.price_lists.len(),
            groups = self.groups.len(),
            products = products.len(),
            "定义表构建完成"
        );

        DefinitionTables {
            units: self.units,
            price_lists: self.price_lists,
            groups: self.groups,
            products,
        }
    }
}

/// 父项描述前缀: 取编码为本产品编码最长真前缀的父项
fn enrich_descriptions(products: &mut IndexMap<String, Product>) {
    let parents: Vec<(String, String)> = products
        .values()
        .filter(|p| p.is_parent_voice && !p.code.is_empty() && !p.description.is_empty())
        .map(|p| (p.code.to_lowercase(), p.description.clone()))
        .collect();
    if parents.is_empty() {
        return;
    }

    for product in products.values_mut().filter(|p| !p.is_parent_voice) {
        let code = product.code.to_lowercase();
        let parent = parents
            .iter()
            .filter(|(parent_code, _)| code.len() > parent_code.len() && code.starts_with(parent_code.as_str()))
            .max_by_key(|(parent_code, _)| parent_code.len());
        if let Some((_, parent_description)) = parent {
            if product.description.is_empty() {
                product.enriched_description = parent_description.clone();
            } else if parent_description != &product.description {
                product.enriched_description =
                    format!("{}{}{}", parent_description, ENRICHED_SEPARATOR, product.description);
            }
        }
    }
}
