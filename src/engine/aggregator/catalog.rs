// ==========================================
// 计量计价导入 - 价目目录输出
// ==========================================
// 每个产品一条,按 code+unit+wbs6+wbs7 归一化键去重（首见保留,补充新价目表价格）
// 父项（voce madre）不进入目录
// ==========================================

use crate::domain::catalog::{DefinitionTables, Product};
use crate::domain::estimate::{CatalogEntry, CatalogPrice};
use indexmap::IndexMap;
use tracing::debug;

/// 目录去重键
pub fn catalog_key(product: &Product) -> String {
    let part = |value: Option<&str>| value.unwrap_or("").trim().to_lowercase();
    format!(
        "{}|{}|{}|{}",
        part(Some(product.code.as_str())),
        part(product.unit.as_deref()),
        part(product.wbs6_code.as_deref()),
        part(product.wbs7_code.as_deref()),
    )
}

/// 构建价目目录
///
/// # 参数
/// - preference: 首选价目表顺序,用于 preferred_price
pub fn build_price_catalog(tables: &DefinitionTables, preference: &[String]) -> Vec<CatalogEntry> {
    let mut entries: IndexMap<String, CatalogEntry> = IndexMap::new();

    for product in tables.products.values().filter(|p| !p.is_parent_voice) {
        let key = catalog_key(product);
        let prices: Vec<CatalogPrice> = product
            .price_by_list
            .iter()
            .map(|(list, price)| CatalogPrice {
                price_list_id: list.clone(),
                price: *price,
            })
            .collect();

        match entries.get_mut(&key) {
            Some(existing) => {
                debug!(key = %key, product_id = %product.id, "目录键重复,合并价格");
                for price in prices {
                    if !existing
                        .prices
                        .iter()
                        .any(|p| p.price_list_id == price.price_list_id)
                    {
                        existing.prices.push(price);
                    }
                }
            }
            None => {
                let unit = product
                    .unit
                    .as_deref()
                    .map(|u| tables.unit_symbol(u).unwrap_or(u).to_string());
                entries.insert(
                    key.clone(),
                    CatalogEntry {
                        key,
                        product_id: product.id.clone(),
                        code: product.code.clone(),
                        description: product.enriched_description.clone(),
                        unit,
                        wbs6_code: product.wbs6_code.clone(),
                        wbs7_code: product.wbs7_code.clone(),
                        prices,
                        preferred_price: product.pick_price(None, preference).map(|(_, p)| p),
                    },
                );
            }
        }
    }

    entries.into_values().collect()
}
