// ==========================================
// 计量计价导入 - 导入接口 Trait
// ==========================================
// 职责: 定义导入主接口与方言解析接口（不包含实现）
// ==========================================

use crate::domain::estimate::{EstimateChoice, ImportReport};
use crate::domain::measurement::ParsedDocument;
use crate::domain::types::SourceFormat;
use crate::engine::session::ParseSession;
use crate::importer::error::ImportResult;
use crate::importer::xml_tree::XmlDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ==========================================
// ImportOptions - 导入选项
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// 指定预算方案;文档含多个方案时必填
    pub estimate_id: Option<String>,
}

impl ImportOptions {
    pub fn with_estimate(estimate_id: impl Into<String>) -> Self {
        Self {
            estimate_id: Some(estimate_id.into()),
        }
    }
}

// ==========================================
// EstimateImporter Trait
// ==========================================
// 用途: 导入主接口
// 实现者: EstimateImporterImpl
pub trait EstimateImporter: Send + Sync {
    /// 从内存字节导入
    ///
    /// # 参数
    /// - file_name: 原始文件名（用于格式识别,可缺失）
    /// - bytes: 文件内容
    /// - options: 方案选择等选项
    ///
    /// # 返回
    /// - Ok(ImportReport): 归一化预算 + 统计 + 异常明细
    /// - Err: 致命错误（格式、容器、XML、方案选择、循环引用）
    fn import_bytes(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
        options: &ImportOptions,
    ) -> ImportResult<ImportReport>;

    /// 从磁盘文件导入
    fn import_file(&self, path: &Path, options: &ImportOptions) -> ImportResult<ImportReport>;

    /// 列出文档中的预算方案
    fn list_estimates(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> ImportResult<Vec<EstimateChoice>>;
}

// ==========================================
// DialectParser Trait
// ==========================================
// 用途: XML 方言 → 定义表 + 原始测量行
// 实现者: SixParser, XpweParser
pub trait DialectParser: Send + Sync {
    /// 方言名称（日志用）
    fn dialect(&self) -> &'static str;

    /// 解析文档
    ///
    /// # 参数
    /// - session: 价目表归一化在会话内记忆
    fn parse(
        &self,
        document: &XmlDocument,
        source_format: SourceFormat,
        session: &mut ParseSession,
    ) -> ImportResult<ParsedDocument>;
}
