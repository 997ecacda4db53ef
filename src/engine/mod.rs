//! Pure computation engine for deterministic settlement math.
//!
//! Nothing in this module performs I/O; the orchestrator feeds it values read
//! inside a transaction and applies the outputs it returns. That keeps every
//! amount recomputable on retry.

use crate::domain::{Money, OwnerId};

pub mod accrual;
pub mod commission;

pub use accrual::daily_accrual;
pub use commission::{commission_plan, CommissionTable};

/// One ancestor in an owner's sponsor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub owner: OwnerId,
    /// Distance from the paying owner: 1 = direct sponsor.
    pub level: u32,
}

/// A single commission credit to apply for one settled position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionAward {
    /// The ancestor receiving the credit.
    pub owner: OwnerId,
    pub level: u32,
    pub amount: Money,
    /// The downstream owner whose accrual funded this award.
    pub source_owner: OwnerId,
}
