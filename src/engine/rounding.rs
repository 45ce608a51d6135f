// ==========================================
// 计量计价导入 - 十进制舍入规则
// ==========================================
// 红线: 必须与旧系统逐位一致（ROUND_HALF_UP,远离零）
// 红线: 量化精度为常量,不开放配置
// ==========================================

use rust_decimal::{Decimal, RoundingStrategy};

/// 测量量子: 0.01
pub const MEASUREMENT_DP: u32 = 2;

/// 金额小数位: 2
pub const AMOUNT_DP: u32 = 2;

/// 输出时 |x| < 1e-9 视为 0
pub fn zero_clamp_epsilon() -> Decimal {
    Decimal::new(1, 9)
}

/// 引用链抵消阈值 |x| <= 1e-12
pub fn cancellation_epsilon() -> Decimal {
    Decimal::new(1, 12)
}

/// 四舍五入（半数远离零）
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// 量化到固定小数位（5 → 5.00）,幂等
pub fn quantize(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = round_half_up(value, dp);
    rounded.rescale(dp);
    rounded
}

/// 微小值归零（消除 -0.00）
pub fn clamp_zero(value: Decimal) -> Decimal {
    if value.abs() < zero_clamp_epsilon() {
        Decimal::ZERO
    } else {
        value
    }
}

/// 输出量化: 归零 + 2 位小数
pub fn quantize_output(value: Decimal) -> Decimal {
    let mut rounded = quantize(clamp_zero(value), AMOUNT_DP);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// 单行金额 = round_half_up(数量 × 单价, 2)
///
/// # 返回
/// - None: 乘法溢出
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity
        .checked_mul(unit_price)
        .map(|raw| quantize(raw, AMOUNT_DP))
}
