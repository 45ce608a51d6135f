// ==========================================
// 计量计价导入 - 解析引擎层
// ==========================================
// 职责: 公式求值、价目表归一化、引用图解析、WBS 构建、清单聚合
// 红线: 引擎不做 I/O;所有输入在进入引擎前已完全物化
// 红线: 金额/数量一律 Decimal,舍入规则见 rounding
// ==========================================

pub mod aggregator;
pub mod formula;
pub mod price_list;
pub mod reference_graph;
pub mod references;
pub mod rounding;
pub mod session;
pub mod wbs;

// 重导出核心引擎
pub use aggregator::{build_price_catalog, AggregationOutput, VoiceAggregator};
pub use formula::{row_product, FormulaEvaluator};
pub use price_list::{canonicalize_label, preferred_order, PriceListCanonicalizer};
pub use reference_graph::ReferenceGraph;
pub use references::{MeasurementBuilder, ReferenceExtractor};
pub use session::{EstimateOutcome, ParseSession};
pub use wbs::{classify_group_label, WbsBuilder, WbsPath};
