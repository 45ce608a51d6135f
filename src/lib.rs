// ==========================================
// 计量计价导入 - 核心库
// ==========================================
// 输入: SIX (.six 容器 / 裸 XML) 与 XPWE 预算文档
// 输出: 归一化工程量清单（清单项 + 价格目录 + 统计）
// 红线: 引用环路、容器损坏、方案歧义为致命错误
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 引擎层 - 公式/价目表/引用图/WBS/聚合
pub mod engine;

// 导入层 - 容器与方言解析
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AnomalyKind, GroupKind, Operation, SourceFormat};

// 领域实体
pub use domain::{
    CatalogEntry, EstimateChoice, ImportAnomaly, ImportBatch, ImportReport, ImportStats,
    Measurement, NormalizedEstimate, ProgressiveKey, Voice,
};

// 引擎
pub use engine::{
    FormulaEvaluator, MeasurementBuilder, PriceListCanonicalizer, ReferenceGraph,
    VoiceAggregator, WbsBuilder,
};

// 导入器
pub use importer::{
    EstimateImporter, EstimateImporterImpl, ImportError, ImportOptions, ImportResult,
};

// 配置
pub use config::{ConfigManager, ImportConfig, ImportConfigReader};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "计量计价导入";
