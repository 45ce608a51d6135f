// ==========================================
// 计量计价导入 - 导入器实现
// ==========================================
// 职责: 整合导入流程,从字节到归一化预算
// 流程: 尺寸检查 → 格式识别/解包 → XML 树 → 方言解析 → 方案选择
//       → 测量行构建 → 引用图解析 → 清单聚合 → 结果封装
// 红线: 致命错误只返回单一错误,不返回部分结果
// ==========================================

use crate::config::{ImportConfig, ImportConfigReader};
use crate::domain::estimate::{
    EstimateChoice, ImportBatch, ImportReport, NormalizedEstimate,
};
use crate::domain::measurement::{ParsedDocument, ParsedEstimate};
use crate::domain::types::SourceFormat;
use crate::engine::session::ParseSession;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::estimate_importer_trait::{DialectParser, EstimateImporter, ImportOptions};
use crate::importer::file_parser::{load_document, read_file};
use crate::importer::six_parser::SixParser;
use crate::importer::xml_tree::XmlDocument;
use crate::importer::xpwe_parser::XpweParser;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// EstimateImporterImpl - 导入器实现
// ==========================================
pub struct EstimateImporterImpl<C>
where
    C: ImportConfigReader,
{
    // 配置读取器
    config: C,

    // 方言解析器
    six_parser: Box<dyn DialectParser>,
    xpwe_parser: Box<dyn DialectParser>,
}

impl<C> EstimateImporterImpl<C>
where
    C: ImportConfigReader,
{
    /// 创建导入器（默认方言解析器）
    pub fn new(config: C) -> Self {
        Self::with_parsers(config, Box::new(SixParser::new()), Box::new(XpweParser::new()))
    }

    /// 创建导入器（自定义方言解析器）
    pub fn with_parsers(
        config: C,
        six_parser: Box<dyn DialectParser>,
        xpwe_parser: Box<dyn DialectParser>,
    ) -> Self {
        Self {
            config,
            six_parser,
            xpwe_parser,
        }
    }

    fn parser_for(&self, format: SourceFormat) -> &dyn DialectParser {
        if format.is_six() {
            self.six_parser.as_ref()
        } else {
            self.xpwe_parser.as_ref()
        }
    }

    /// 步骤 1-4: 读取、识别、解析为方言无关的中间文档
    fn parse_document(
        &self,
        config: ImportConfig,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> ImportResult<(ParseSession, ParsedDocument)> {
        // === 步骤 1: 格式识别与解包 ===
        debug!("步骤 1: 格式识别与解包");
        let source = load_document(file_name, bytes, config.max_document_bytes)?;
        info!(
            format = %source.format,
            member = ?source.member_name,
            chars = source.xml.len(),
            "源文档已载入"
        );

        // === 步骤 2: XML 树 ===
        debug!("步骤 2: 构建 XML 树");
        let document = XmlDocument::parse(&source.xml)?;

        // === 步骤 3: 方言解析 ===
        let parser = self.parser_for(source.format);
        debug!(dialect = parser.dialect(), "步骤 3: 方言解析");
        let mut session = ParseSession::new(config)?;
        let parsed = parser.parse(&document, source.format, &mut session)?;

        Ok((session, parsed))
    }

    /// 方案选择
    ///
    /// # 规则
    /// - 无方案 → NoImportableEstimate
    /// - 指定 ID → 必须存在,否则 EstimateNotFound
    /// - 未指定且仅一个 → 该方案;多个 → AmbiguousEstimateSelection
    pub fn select_estimate<'d>(
        document: &'d ParsedDocument,
        options: &ImportOptions,
    ) -> ImportResult<&'d ParsedEstimate> {
        if document.estimates.is_empty() {
            return Err(ImportError::NoImportableEstimate);
        }

        match options.estimate_id.as_deref() {
            Some(requested) => document
                .estimates
                .iter()
                .find(|e| e.id == requested)
                .ok_or_else(|| ImportError::EstimateNotFound {
                    requested: requested.to_string(),
                    available: document.choices(),
                }),
            None if document.estimates.len() == 1 => Ok(&document.estimates[0]),
            None => Err(ImportError::AmbiguousEstimateSelection {
                available: document.choices(),
            }),
        }
    }

    fn run_import(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
        options: &ImportOptions,
        batch_id: &str,
    ) -> ImportResult<ImportReport> {
        let start_time = Instant::now();
        let config = self.config.snapshot()?;

        let (session, document) = self.parse_document(config, file_name, bytes)?;

        // === 步骤 4: 方案选择 ===
        debug!(estimates = document.estimates.len(), "步骤 4: 方案选择");
        let estimate = Self::select_estimate(&document, options)?;

        // === 步骤 5: 引擎处理 ===
        debug!(estimate_id = %estimate.id, "步骤 5: 引擎处理");
        let outcome = session.process_estimate(&document.tables, estimate)?;

        // === 步骤 6: 结果封装 ===
        let elapsed_time = start_time.elapsed();
        let batch = ImportBatch {
            batch_id: batch_id.to_string(),
            file_name: file_name.map(str::to_string),
            source_format: document.source_format,
            estimate_id: estimate.id.clone(),
            imported_at: Utc::now(),
            elapsed_ms: u64::try_from(elapsed_time.as_millis()).unwrap_or(u64::MAX),
        };

        let title = document.title.clone().or_else(|| estimate.label.clone());
        let normalized = NormalizedEstimate {
            estimate_id: estimate.id.clone(),
            title,
            source_format: document.source_format,
            total_amount: outcome.total_amount,
            total_quantity: outcome.total_quantity,
            voices: outcome.voices,
            price_catalog: outcome.price_catalog,
            price_lists: document.tables.price_lists.clone(),
        };

        if !outcome.anomalies.is_empty() {
            warn!(
                batch_id = %batch_id,
                anomalies = outcome.anomalies.len(),
                "导入存在可恢复异常"
            );
        }
        info!(
            batch_id = %batch_id,
            estimate_id = %normalized.estimate_id,
            voices = normalized.voices.len(),
            total_amount = ?normalized.total_amount,
            elapsed_ms = batch.elapsed_ms,
            "预算导入完成"
        );

        Ok(ImportReport {
            batch,
            estimate: normalized,
            summary: outcome.stats,
            anomalies: outcome.anomalies,
            elapsed_time,
        })
    }
}

impl<C> EstimateImporter for EstimateImporterImpl<C>
where
    C: ImportConfigReader,
{
    /// 从内存字节导入
    #[instrument(skip(self, bytes, options), fields(batch_id, size = bytes.len()))]
    fn import_bytes(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
        options: &ImportOptions,
    ) -> ImportResult<ImportReport> {
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        info!(batch_id = %batch_id, file_name = ?file_name, "开始导入预算文件");

        self.run_import(file_name, bytes, options, &batch_id)
            .map_err(|e| {
                error!(batch_id = %batch_id, error = %e, "预算导入失败");
                e
            })
    }

    fn import_file(&self, path: &Path, options: &ImportOptions) -> ImportResult<ImportReport> {
        let limit = self.config.get_max_document_bytes()?;
        let bytes = read_file(path, limit)?;
        let file_name = path.file_name().and_then(|n| n.to_str());
        self.import_bytes(file_name, &bytes, options)
    }

    fn list_estimates(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> ImportResult<Vec<EstimateChoice>> {
        let config = self.config.snapshot()?;
        let (_, document) = self.parse_document(config, file_name, bytes)?;
        Ok(document.choices())
    }
}

// ==========================================
// 多文档批量导入
// ==========================================
impl<C> EstimateImporterImpl<C>
where
    C: ImportConfigReader + Clone + 'static,
{
    /// 批量导入多个文件（并发执行）
    ///
    /// # 说明
    /// - 每个文件一个独立引擎实例,运行在 tokio 阻塞线程池
    /// - 某个文件失败不影响其他文件
    /// - 结果顺序与输入路径一致
    pub async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        options: ImportOptions,
    ) -> Vec<Result<ImportReport, String>> {
        use futures::future::join_all;

        info!(count = file_paths.len(), "开始批量导入文件");

        let import_tasks = file_paths.into_iter().map(|path| {
            let config = self.config.clone();
            let options = options.clone();
            let path_str = path.display().to_string();
            async move {
                let handle = tokio::task::spawn_blocking(move || {
                    EstimateImporterImpl::new(config).import_file(&path, &options)
                });
                match handle.await {
                    Ok(Ok(result)) => {
                        info!(
                            file = %path_str,
                            voices = result.estimate.voices.len(),
                            "文件导入成功"
                        );
                        Ok(result)
                    }
                    Ok(Err(e)) => {
                        error!(file = %path_str, error = %e, "文件导入失败");
                        Err(format!("文件 {} 导入失败: {}", path_str, e))
                    }
                    Err(e) => {
                        error!(file = %path_str, error = %e, "导入任务异常终止");
                        Err(format!("文件 {} 导入任务异常终止: {}", path_str, e))
                    }
                }
            }
        });

        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );

        results
    }
}
