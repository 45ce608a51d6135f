// ==========================================
// 计量计价导入 - 定义表领域模型
// ==========================================
// 职责: 单位、价目表、分组值、产品目录
// 生命周期: 每次解析构建一次,加载后只读
// ==========================================

use crate::domain::types::GroupKind;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// Unit - 计量单位
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,     // 源文件内单位 ID
    pub symbol: String, // 单位符号（m, m2, kg ...）
}

// ==========================================
// PriceList - 价目表
// ==========================================
// 多个 raw_id 可能归并到同一个 canonical_id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub raw_id: String,       // 源文件内价目表 ID
    pub canonical_id: String, // 归一化 ID（prezzi_base / 其他 slug / listino）
    pub label: String,        // 原始标签
    pub priority: u8,         // 2=显式"prezzi base", 1=纯"base", 0=其他
    pub preferred: bool,      // 标签含 "progetto"/"default"
}

// ==========================================
// GroupValue - WBS 分组值（原始定义）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupValue {
    pub id: String,                  // 分组值 ID
    pub code: Option<String>,        // 分组值编码
    pub description: Option<String>, // 分组值描述
    pub kind: GroupKind,             // 由分组类型标签派生
    pub group_label: String,         // 所属分组的类型标签（审计用）
}

impl GroupValue {
    pub fn level(&self) -> Option<u8> {
        self.kind.level()
    }
}

// ==========================================
// Product - 产品（价目条目）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub code: String,
    pub description: String,
    pub unit: Option<String>,

    // ===== 价格 =====
    pub price_by_list: IndexMap<String, Decimal>, // canonical_id → 单价
    pub price_priority: HashMap<String, u8>,      // canonical_id → 优先级

    // ===== 商品分类 =====
    pub wbs6_code: Option<String>,
    pub wbs6_description: Option<String>,
    pub wbs7_code: Option<String>,
    pub wbs7_description: Option<String>,

    // ===== 父项 =====
    pub is_parent_voice: bool,
    pub enriched_description: String, // 最近父项描述 + 自身描述
}

impl Product {
    /// 选取行单价
    ///
    /// # 规则
    /// 1. 行自身价目表精确命中
    /// 2. 按偏好列表顺序首个命中
    /// 3. 任意可用价格（优先级高者优先,同级按加载顺序）
    /// 4. 全部缺失 → None
    ///
    /// # 返回
    /// - (命中的 canonical_id, 单价)
    pub fn pick_price(
        &self,
        row_price_list: Option<&str>,
        preference: &[String],
    ) -> Option<(String, Decimal)> {
        if let Some(list_id) = row_price_list {
            if let Some(price) = self.price_by_list.get(list_id) {
                return Some((list_id.to_string(), *price));
            }
        }

        for list_id in preference {
            if let Some(price) = self.price_by_list.get(list_id) {
                return Some((list_id.clone(), *price));
            }
        }

        let mut best: Option<(&String, &Decimal, u8)> = None;
        for (list_id, price) in &self.price_by_list {
            let priority = self.price_priority.get(list_id).copied().unwrap_or(0);
            match best {
                Some((_, _, best_priority)) if best_priority >= priority => {}
                _ => best = Some((list_id, price, priority)),
            }
        }
        best.map(|(list_id, price, _)| (list_id.clone(), *price))
    }

    /// 是否存在任何价格
    pub fn has_prices(&self) -> bool {
        !self.price_by_list.is_empty()
    }
}

// ==========================================
// DefinitionTables - 定义表集合
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionTables {
    pub units: HashMap<String, Unit>,
    pub price_lists: Vec<PriceList>, // 按出现顺序,raw_id 唯一
    pub groups: HashMap<String, GroupValue>,
    pub products: IndexMap<String, Product>,
}

impl DefinitionTables {
    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn group(&self, id: &str) -> Option<&GroupValue> {
        self.groups.get(id)
    }

    pub fn unit_symbol(&self, id: &str) -> Option<&str> {
        self.units.get(id).map(|u| u.symbol.as_str())
    }

    /// raw_id → canonical_id
    pub fn canonical_list_id(&self, raw_id: &str) -> Option<&str> {
        self.price_lists
            .iter()
            .find(|pl| pl.raw_id == raw_id || pl.canonical_id == raw_id)
            .map(|pl| pl.canonical_id.as_str())
    }
}
