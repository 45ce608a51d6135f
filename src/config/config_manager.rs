// ==========================================
// 计量计价导入 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: key-value（默认值 < JSON 文件 < 环境变量）
// ==========================================

use crate::config::import_config_trait::{
    ImportConfigReader, DEFAULT_FALLBACK_WBS6_CODE, DEFAULT_MAX_DOCUMENT_BYTES,
    DEFAULT_MAX_FORMULA_LENGTH, DEFAULT_PREFERRED_KEYWORDS, DEFAULT_REFERENCE_PATTERN,
};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const MAX_DOCUMENT_BYTES: &str = "max_document_bytes";
    pub const MAX_FORMULA_LENGTH: &str = "max_formula_length";
    pub const PREFERRED_PRICE_LIST_KEYWORDS: &str = "preferred_price_list_keywords";
    pub const REFERENCE_PATTERN: &str = "reference_pattern";
    pub const FALLBACK_WBS6_CODE: &str = "fallback_wbs6_code";

    /// 全部已知键
    pub const ALL: &[&str] = &[
        MAX_DOCUMENT_BYTES,
        MAX_FORMULA_LENGTH,
        PREFERRED_PRICE_LIST_KEYWORDS,
        REFERENCE_PATTERN,
        FALLBACK_WBS6_CODE,
    ];
}

/// 环境变量前缀（ESTIMATE_IMPORT_MAX_DOCUMENT_BYTES 等）
pub const ENV_PREFIX: &str = "ESTIMATE_IMPORT_";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    values: HashMap<String, String>,
}

impl ConfigManager {
    /// 创建空配置（全部使用默认值）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 文件加载配置
    ///
    /// # 格式
    /// - 顶层对象,值可为字符串/数字/字符串数组
    /// - 数组按逗号拼接存储
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ImportResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let raw = std::fs::read_to_string(path)?;
        let manager = Self::from_json_str(&raw)?;
        info!(path = %path.display(), keys = manager.values.len(), "配置文件加载完成");
        Ok(manager)
    }

    /// 从 JSON 字符串加载配置
    pub fn from_json_str(raw: &str) -> ImportResult<Self> {
        let parsed: serde_json::Value = serde_json::from_str(raw)?;
        let object = parsed.as_object().ok_or_else(|| ImportError::ConfigReadError {
            key: "<root>".to_string(),
            message: "配置文件顶层必须为对象".to_string(),
        })?;

        let mut values = HashMap::new();
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            values.insert(key.clone(), text);
        }

        Ok(Self { values })
    }

    /// 叠加环境变量覆写（ESTIMATE_IMPORT_<KEY 大写>）
    pub fn with_env_overrides(mut self) -> Self {
        for key in config_keys::ALL {
            let env_key = format!("{}{}", ENV_PREFIX, key.to_uppercase());
            if let Ok(value) = std::env::var(&env_key) {
                debug!(key = %key, env = %env_key, "环境变量覆写配置");
                self.values.insert(key.to_string(), value);
            }
        }
        self
    }

    /// 设置单个配置值
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// 读取配置值
    pub fn get_config_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 读取配置值,带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> String {
        self.get_config_value(key)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// 读取 usize 配置
    fn get_usize(&self, key: &str, default: usize) -> ImportResult<usize> {
        match self.get_config_value(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ImportError::ConfigValueError {
                    key: key.to_string(),
                    value: raw.to_string(),
                    message: e.to_string(),
                }),
        }
    }
}

impl ImportConfigReader for ConfigManager {
    fn get_max_document_bytes(&self) -> ImportResult<usize> {
        let value = self.get_usize(config_keys::MAX_DOCUMENT_BYTES, DEFAULT_MAX_DOCUMENT_BYTES)?;
        if value == 0 {
            return Err(ImportError::ConfigValueError {
                key: config_keys::MAX_DOCUMENT_BYTES.to_string(),
                value: value.to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        Ok(value)
    }

    fn get_max_formula_length(&self) -> ImportResult<usize> {
        self.get_usize(config_keys::MAX_FORMULA_LENGTH, DEFAULT_MAX_FORMULA_LENGTH)
    }

    fn get_preferred_price_list_keywords(&self) -> ImportResult<Vec<String>> {
        let raw = self.get_config_or_default(
            config_keys::PREFERRED_PRICE_LIST_KEYWORDS,
            &DEFAULT_PREFERRED_KEYWORDS.join(","),
        );
        Ok(raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect())
    }

    fn get_reference_pattern(&self) -> ImportResult<String> {
        let raw = self.get_config_or_default(config_keys::REFERENCE_PATTERN, DEFAULT_REFERENCE_PATTERN);
        // 正则须可编译
        regex::Regex::new(&raw).map_err(|e| ImportError::ConfigValueError {
            key: config_keys::REFERENCE_PATTERN.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        })?;
        Ok(raw)
    }

    fn get_fallback_wbs6_code(&self) -> ImportResult<String> {
        let raw = self.get_config_or_default(config_keys::FALLBACK_WBS6_CODE, DEFAULT_FALLBACK_WBS6_CODE);
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(DEFAULT_FALLBACK_WBS6_CODE.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }
}
