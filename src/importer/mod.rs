// ==========================================
// 计量计价导入 - 导入层
// ==========================================
// 职责: 文件/容器处理、XML 方言解析、导入流程编排
// 支持: SIX (.six 容器 / 裸 XML), XPWE (PriMus)
// ==========================================

// 模块声明
pub mod definition_tables;
pub mod error;
pub mod estimate_importer_impl;
pub mod estimate_importer_trait;
pub mod file_parser;
pub mod six_parser;
pub mod xml_tree;
pub mod xpwe_parser;

// 重导出核心类型
pub use definition_tables::{DefinitionTablesBuilder, ProductDraft};
pub use error::{ImportError, ImportResult};
pub use estimate_importer_impl::EstimateImporterImpl;
pub use file_parser::{detect_format, load_document, SourceDocument};
pub use six_parser::SixParser;
pub use xml_tree::{XmlDocument, XmlElement};
pub use xpwe_parser::XpweParser;

// 重导出 Trait 接口
pub use estimate_importer_trait::{DialectParser, EstimateImporter, ImportOptions};
