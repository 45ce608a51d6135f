// ==========================================
// 计量计价导入 - 清单条目聚合与金额计算
// ==========================================
// 聚合键: (方案 ID, 条目顺序号, 进度号, 空间 token 元组, WBS6 token, WBS7 token)
// 红线: 金额逐行 round_half_up(数量 × 单价, 2) 后累加,数量累加时不舍入
// 红线: 同键首见单价生效,后续不同单价只告警不覆盖
// 红线: 产品缺失的行跳过并计数,不报错
// ==========================================
// 输入: 已完成引用解析的测量行（单一方案,按源顺序）
// 输出: Voice 列表 + 总额 + 统计 + 异常明细
// ==========================================

mod catalog;
mod core;

#[cfg(test)]
mod tests;

pub use self::catalog::build_price_catalog;
pub use self::core::{AggregatedVoice, AggregationKey, AggregationOutput, VoiceAggregator};
