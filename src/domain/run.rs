//! Settlement run records: the daily gate handle, run summaries, run logs.

use crate::domain::{Money, RunDate, TimeMs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof that this invocation won the daily gate for `date`.
///
/// Exactly one handle exists per calendar date; losing invocations observe
/// `AlreadyRun` instead. Forced runs never hold a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub date: RunDate,
}

/// One position that failed inside its own unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub position_id: i64,
    pub error: String,
}

/// The outcome of a completed settlement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub date: RunDate,
    /// Positions settled successfully.
    pub processed: u64,
    /// Positions found ineligible at unit time (not failures).
    pub skipped: u64,
    pub total_accrual: Money,
    pub total_commission: Money,
    pub failed_items: Vec<FailedItem>,
}

impl RunSummary {
    pub fn empty(date: RunDate) -> Self {
        RunSummary {
            date,
            processed: 0,
            skipped: 0,
            total_accrual: Money::zero(),
            total_commission: Money::zero(),
            failed_items: Vec::new(),
        }
    }
}

/// Result of triggering settlement for a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The daily gate was already taken; nothing was posted by this call.
    AlreadyRun { date: RunDate },
    /// This call held the gate (or was forced) and produced a summary.
    Completed(RunSummary),
}

/// Persisted record of one run attempt, gated or forced.
///
/// Immutable once written; several logs may exist for the same date when an
/// administrator forces re-runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRunLog {
    pub id: i64,
    /// Gate handle id; None for forced runs, which bypass the gate.
    pub run_id: Option<Uuid>,
    pub date: RunDate,
    pub processed: u64,
    pub skipped: u64,
    pub total_accrual: Money,
    pub total_commission: Money,
    pub failed_items: Vec<FailedItem>,
    /// Raw diagnostic payload (JSON).
    pub detail: serde_json::Value,
    pub forced: bool,
    pub created_at: TimeMs,
}
