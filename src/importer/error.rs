// ==========================================
// 计量计价导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 只承载致命错误;可恢复异常走 ImportStats/ImportAnomaly
// ==========================================

use crate::domain::estimate::EstimateChoice;
use crate::domain::measurement::ProgressiveKey;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件格式不支持: {0}（仅支持 .six/.xml/.xpwe）")]
    UnsupportedFormat(String),

    #[error("压缩容器无效: {0}")]
    InvalidContainer(String),

    #[error("XML 解析失败: {0}")]
    XmlParseError(String),

    #[error("文档过大: {size} 字节,上限 {limit} 字节")]
    DocumentTooLarge { size: usize, limit: usize },

    // ===== 预算方案选择错误 =====
    #[error("文档中没有可导入的预算方案")]
    NoImportableEstimate,

    #[error("文档包含 {} 个预算方案,需指定其一: {}", .available.len(), format_choices(.available))]
    AmbiguousEstimateSelection { available: Vec<EstimateChoice> },

    #[error("预算方案不存在: {requested}（可选: {}）", format_choices(.available))]
    EstimateNotFound {
        requested: String,
        available: Vec<EstimateChoice>,
    },

    // ===== 引用图错误 =====
    #[error("进度号循环引用: {}", format_cycle(.path))]
    CircularReference { path: Vec<ProgressiveKey> },

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_choices(choices: &[EstimateChoice]) -> String {
    choices
        .iter()
        .map(|c| match &c.label {
            Some(label) => format!("{} ({})", c.id, label),
            None => c.id.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_cycle(path: &[ProgressiveKey]) -> String {
    path.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ImportError {
    /// 是否为循环引用错误
    pub fn is_circular_reference(&self) -> bool {
        matches!(self, ImportError::CircularReference { .. })
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<quick_xml::Error>
impl From<quick_xml::Error> for ImportError {
    fn from(err: quick_xml::Error) -> Self {
        ImportError::XmlParseError(err.to_string())
    }
}

// 实现 From<zip::result::ZipError>
impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::InvalidContainer(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::ConfigReadError {
            key: "<json>".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
