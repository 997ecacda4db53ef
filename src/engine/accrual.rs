//! Daily accrual computation.

use crate::domain::Money;

/// Compute one day's return for a position: `principal * rate / 100`,
/// rounded half-up to `scale` decimals.
///
/// Pure and deterministic: the orchestrator may recompute this for the same
/// position on a retried unit of work and must get the same amount.
pub fn daily_accrual(principal: Money, daily_rate_percent: Money, scale: u32) -> Money {
    (principal * daily_rate_percent / Money::hundred()).round_currency(scale)
}
