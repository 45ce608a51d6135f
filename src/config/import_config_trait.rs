// ==========================================
// 计量计价导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流程所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::importer::error::ImportResult;
use serde::{Deserialize, Serialize};

// ==========================================
// 默认值
// ==========================================
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_FORMULA_LENGTH: usize = 1024;
pub const DEFAULT_PREFERRED_KEYWORDS: &[&str] = &["progetto", "default"];
pub const DEFAULT_REFERENCE_PATTERN: &str =
    r"(?i)vedi\s+voce\s*(?:n[.°]?|nr\.?|num\.?|numero)?\s*(\d+)(?:\s*[x×*]\s*(\d+(?:[.,]\d+)?))?";
pub const DEFAULT_FALLBACK_WBS6_CODE: &str = "UNMAPPED";

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager
pub trait ImportConfigReader: Send + Sync {
    /// 获取文档大小上限（字节）
    ///
    /// # 默认值
    /// - 64 MiB
    ///
    /// # 用途
    /// - 解析前拒绝过大文档,限制单次导入的资源占用
    fn get_max_document_bytes(&self) -> ImportResult<usize>;

    /// 获取单元格公式长度上限（字符）
    ///
    /// # 默认值
    /// - 1024
    fn get_max_formula_length(&self) -> ImportResult<usize>;

    /// 获取"首选价目表"关键字
    ///
    /// # 默认值
    /// - ["progetto", "default"]
    fn get_preferred_price_list_keywords(&self) -> ImportResult<Vec<String>>;

    /// 获取"vedi voce"引用识别正则
    ///
    /// # 约定
    /// - 第 1 捕获组: 目标进度号
    /// - 第 2 捕获组（可选）: 显式乘数
    fn get_reference_pattern(&self) -> ImportResult<String>;

    /// 获取兜底 WBS6 编码（候选全部为空时使用）
    ///
    /// # 默认值
    /// - "UNMAPPED"
    fn get_fallback_wbs6_code(&self) -> ImportResult<String>;

    /// 一次性读取全部配置为快照
    fn snapshot(&self) -> ImportResult<ImportConfig> {
        Ok(ImportConfig {
            max_document_bytes: self.get_max_document_bytes()?,
            max_formula_length: self.get_max_formula_length()?,
            preferred_price_list_keywords: self.get_preferred_price_list_keywords()?,
            reference_pattern: self.get_reference_pattern()?,
            fallback_wbs6_code: self.get_fallback_wbs6_code()?,
        })
    }
}

// ==========================================
// ImportConfig - 配置快照
// ==========================================
// 每次导入取一次,存入 ParseSession,导入期间不变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub max_document_bytes: usize,
    pub max_formula_length: usize,
    pub preferred_price_list_keywords: Vec<String>,
    pub reference_pattern: String,
    pub fallback_wbs6_code: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_formula_length: DEFAULT_MAX_FORMULA_LENGTH,
            preferred_price_list_keywords: DEFAULT_PREFERRED_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reference_pattern: DEFAULT_REFERENCE_PATTERN.to_string(),
            fallback_wbs6_code: DEFAULT_FALLBACK_WBS6_CODE.to_string(),
        }
    }
}

// 快照本身也可作为配置读取器（测试/批量导入复用）
impl ImportConfigReader for ImportConfig {
    fn get_max_document_bytes(&self) -> ImportResult<usize> {
        Ok(self.max_document_bytes)
    }

    fn get_max_formula_length(&self) -> ImportResult<usize> {
        Ok(self.max_formula_length)
    }

    fn get_preferred_price_list_keywords(&self) -> ImportResult<Vec<String>> {
        Ok(self.preferred_price_list_keywords.clone())
    }

    fn get_reference_pattern(&self) -> ImportResult<String> {
        Ok(self.reference_pattern.clone())
    }

    fn get_fallback_wbs6_code(&self) -> ImportResult<String> {
        Ok(self.fallback_wbs6_code.clone())
    }
}
