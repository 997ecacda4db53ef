//! Per-owner wallet balances.

use crate::domain::{Money, OwnerId};
use serde::{Deserialize, Serialize};

/// Balance sheet for one owner. One wallet per owner, created lazily on the
/// first credit that references them.
///
/// Every field is non-negative after any committed transaction; the schema
/// carries matching CHECK constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: OwnerId,
    /// Spendable balance; accruals and commissions land here.
    pub main_balance: Money,
    /// Funds earmarked for new positions; not touched by settlement.
    pub deposit_balance: Money,
    /// Lifetime accrual income.
    pub total_accrued: Money,
    /// Lifetime referral commission income.
    pub total_commission: Money,
}

impl Wallet {
    /// A zeroed wallet for a newly referenced owner.
    pub fn empty(owner: OwnerId) -> Self {
        Wallet {
            owner,
            main_balance: Money::zero(),
            deposit_balance: Money::zero(),
            total_accrued: Money::zero(),
            total_commission: Money::zero(),
        }
    }
}
