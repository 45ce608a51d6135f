// ==========================================
// 计量计价导入 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含解析逻辑,不含引擎逻辑
// ==========================================

pub mod catalog;
pub mod estimate;
pub mod measurement;
pub mod types;

// 重导出核心类型
pub use catalog::{DefinitionTables, GroupValue, PriceList, Product, Unit};
pub use estimate::{
    CatalogEntry, CatalogPrice, EstimateChoice, ImportAnomaly, ImportBatch, ImportReport,
    ImportStats, NormalizedEstimate, Voice, VoiceMetadata, WbsLevel,
};
pub use measurement::{
    Measurement, MeasurementCell, ParsedDocument, ParsedEstimate, ProgressiveKey, RawCell,
    RawMeasurement, ReferenceEntry,
};
pub use types::{AnomalyKind, GroupKind, Operation, SourceFormat};
