//! Domain types for the daily settlement ledger.
//!
//! This module provides:
//! - Lossless money handling via the Money wrapper
//! - Domain primitives: TimeMs, OwnerId, RunDate
//! - Position, Wallet, and Earning ledger records
//! - Settlement run types: RunHandle, RunSummary, RunOutcome, run logs

pub mod earning;
pub mod money;
pub mod position;
pub mod primitives;
pub mod run;
pub mod wallet;

pub use earning::{Earning, EarningKind, NewEarning};
pub use money::Money;
pub use position::{Position, PositionStatus};
pub use primitives::{OwnerId, RunDate, TimeMs};
pub use run::{FailedItem, RunHandle, RunOutcome, RunSummary, SettlementRunLog};
pub use wallet::Wallet;
