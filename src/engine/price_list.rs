// ==========================================
// 计量计价导入 - 价目表归一化
// ==========================================
// 职责: 自由文本价目表标识 → 少量规范 ID + 确定性优先级
// 规则:
//   含 "prezzi" 且含 "base" → prezzi_base, 优先级 2
//   恰为 "base"            → prezzi_base, 优先级 1
//   其他                    → slug(标签 或 raw_id), 优先级 0
//   slug 为空               → listino, 优先级 0
// 红线: 永不失败;同一会话内同一 raw_id 始终映射到同一规范 ID
//       同一规范 ID 在会话内只有一个优先级（取已见最高值）
// ==========================================

use crate::domain::catalog::PriceList;
use std::collections::HashMap;
use tracing::debug;

pub const BASE_PRICE_LIST_ID: &str = "prezzi_base";
pub const GENERIC_PRICE_LIST_ID: &str = "listino";

pub const PRIORITY_EXPLICIT_BASE: u8 = 2;
pub const PRIORITY_PLAIN_BASE: u8 = 1;
pub const PRIORITY_OTHER: u8 = 0;

// ==========================================
// PriceListCanonicalizer - 会话级归一化器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PriceListCanonicalizer {
    aliases: HashMap<String, String>,
    priorities: HashMap<String, u8>,
    preferred_keywords: Vec<String>,
}

impl PriceListCanonicalizer {
    /// 创建归一化器
    ///
    /// # 参数
    /// - preferred_keywords: 标签含其一即标记为首选（小写比较）
    pub fn new(preferred_keywords: Vec<String>) -> Self {
        Self {
            aliases: HashMap::new(),
            priorities: HashMap::new(),
            preferred_keywords: preferred_keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// 归一化（带会话记忆）
    ///
    /// # 参数
    /// - label: 价目表标签（可缺失）
    /// - fallback_id: 源文件 raw_id
    ///
    /// # 返回
    /// - (规范 ID, 优先级)
    ///
    /// # 规则
    /// - 同一规范 ID 由多个 raw_id 命中时（如 "Prezzi base" 与 "base"）,
    ///   优先级取会话内已见最高值,保证 canonicalize(id, id) 与首次结果一致
    /// - 标签与 raw_id 同为已登记规范 ID 时直接映射到自身,先于 raw_id 记忆
    pub fn canonicalize(&mut self, label: Option<&str>, fallback_id: &str) -> (String, u8) {
        let alias_key = fallback_id.trim().to_lowercase();
        let label_matches = label.map_or(true, |l| l.trim().to_lowercase() == alias_key);
        if label_matches && self.priorities.contains_key(&alias_key) {
            let priority = self.priority(&alias_key);
            return (alias_key, priority);
        }
        if let Some(canonical_id) = self.aliases.get(&alias_key).cloned() {
            let priority = self.priority(&canonical_id);
            return (canonical_id, priority);
        }

        let (canonical_id, priority) = canonicalize_label(label, fallback_id);
        let priority = {
            let entry = self.priorities.entry(canonical_id.clone()).or_insert(priority);
            *entry = (*entry).max(priority);
            *entry
        };
        debug!(
            raw_id = %fallback_id,
            canonical_id = %canonical_id,
            priority = priority,
            "价目表归一化"
        );
        self.aliases.insert(alias_key, canonical_id.clone());
        // 规范 ID 自身也登记为别名,保证再次归一化结果不变
        self.aliases
            .entry(canonical_id.clone())
            .or_insert_with(|| canonical_id.clone());
        (canonical_id, priority)
    }

    /// 规范 ID 的会话优先级（未登记 → 0）
    pub fn priority(&self, canonical_id: &str) -> u8 {
        self.priorities
            .get(canonical_id)
            .copied()
            .unwrap_or(PRIORITY_OTHER)
    }

    /// 标签是否命中首选关键字
    pub fn is_preferred(&self, label: Option<&str>) -> bool {
        let Some(label) = label else {
            return false;
        };
        let lowered = label.to_lowercase();
        self.preferred_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    /// 登记价目表,返回完整 PriceList
    pub fn register(&mut self, raw_id: &str, label: Option<&str>) -> PriceList {
        let (canonical_id, priority) = self.canonicalize(label, raw_id);
        PriceList {
            raw_id: raw_id.to_string(),
            canonical_id,
            label: label
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(raw_id)
                .to_string(),
            priority,
            preferred: self.is_preferred(label),
        }
    }

    /// 已登记 raw_id 的规范 ID（未登记 → None）
    pub fn lookup(&self, raw_id: &str) -> Option<&str> {
        self.aliases
            .get(&raw_id.trim().to_lowercase())
            .map(String::as_str)
    }
}

/// 无记忆的纯函数归一化
pub fn canonicalize_label(label: Option<&str>, fallback_id: &str) -> (String, u8) {
    let label_token = label.map(|l| l.trim().to_lowercase()).unwrap_or_default();
    let fallback_token = fallback_id.trim().to_lowercase();
    let tokens = [&label_token, &fallback_token];

    if tokens
        .iter()
        .any(|t| t.contains("prezzi") && t.contains("base"))
    {
        return (BASE_PRICE_LIST_ID.to_string(), PRIORITY_EXPLICIT_BASE);
    }
    if tokens.iter().any(|t| t.as_str() == "base") {
        return (BASE_PRICE_LIST_ID.to_string(), PRIORITY_PLAIN_BASE);
    }

    let candidate = [label_token.as_str(), fallback_token.as_str()]
        .into_iter()
        .find(|t| !t.is_empty())
        .map(slugify)
        .unwrap_or_default();

    if candidate.is_empty() {
        (GENERIC_PRICE_LIST_ID.to_string(), PRIORITY_OTHER)
    } else {
        (candidate, PRIORITY_OTHER)
    }
}

/// 非字母数字连续片段 → '_',去除首尾 '_',小写
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// 首选价目表排序（规范 ID）
///
/// # 规则
/// 1. 标记 preferred 的价目表按出现顺序
/// 2. 全局最高优先级的价目表始终置于首位（即使未标记）
/// 3. 规范 ID 去重
pub fn preferred_order(price_lists: &[PriceList]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    for list in price_lists.iter().filter(|l| l.preferred) {
        if !ordered.contains(&list.canonical_id) {
            ordered.push(list.canonical_id.clone());
        }
    }

    let top = price_lists
        .iter()
        .fold(None::<&PriceList>, |best, list| match best {
            Some(b) if b.priority >= list.priority => Some(b),
            _ => Some(list),
        });
    if let Some(top) = top {
        ordered.retain(|id| id != &top.canonical_id);
        ordered.insert(0, top.canonical_id.clone());
    }
    ordered
}
