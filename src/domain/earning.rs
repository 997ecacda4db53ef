//! Append-only earnings ledger records.

use crate::domain::{Money, OwnerId, TimeMs};
use serde::{Deserialize, Serialize};

/// What kind of income an earning records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningKind {
    /// Daily return on the owner's own position.
    Accrual,
    /// Referral commission from a downstream owner's accrual.
    Commission,
}

impl EarningKind {
    /// Parse from the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCRUAL" => Some(EarningKind::Accrual),
            "COMMISSION" => Some(EarningKind::Commission),
            _ => None,
        }
    }

    /// Stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningKind::Accrual => "ACCRUAL",
            EarningKind::Commission => "COMMISSION",
        }
    }
}

impl std::fmt::Display for EarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable earnings record. Never mutated after insert.
///
/// Commission attribution is structural (`source_owner` + `level`);
/// `description` is display text only and is never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earning {
    pub id: i64,
    pub owner: OwnerId,
    pub kind: EarningKind,
    pub amount: Money,
    /// The position that produced the accrual (direct or upstream).
    pub position_id: Option<i64>,
    /// For commissions: the downstream owner whose accrual paid this.
    pub source_owner: Option<OwnerId>,
    /// For commissions: distance to the downstream owner (1 = direct referral).
    pub level: Option<u32>,
    pub description: String,
    pub created_at: TimeMs,
}

/// An earning as composed by the engine, before the store assigns its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEarning {
    pub owner: OwnerId,
    pub kind: EarningKind,
    pub amount: Money,
    pub position_id: Option<i64>,
    pub source_owner: Option<OwnerId>,
    pub level: Option<u32>,
    pub description: String,
    pub created_at: TimeMs,
}

impl NewEarning {
    /// An ACCRUAL record for a position owner's daily return.
    pub fn accrual(owner: OwnerId, position_id: i64, amount: Money, at: TimeMs) -> Self {
        NewEarning {
            description: format!("Daily return on position #{}", position_id),
            owner,
            kind: EarningKind::Accrual,
            amount,
            position_id: Some(position_id),
            source_owner: None,
            level: None,
            created_at: at,
        }
    }

    /// A COMMISSION record crediting `owner` for a downstream accrual.
    pub fn commission(
        owner: OwnerId,
        position_id: i64,
        source_owner: OwnerId,
        level: u32,
        amount: Money,
        at: TimeMs,
    ) -> Self {
        NewEarning {
            description: format!("Level {} referral commission from {}", level, source_owner),
            owner,
            kind: EarningKind::Commission,
            amount,
            position_id: Some(position_id),
            source_owner: Some(source_owner),
            level: Some(level),
            created_at: at,
        }
    }
}
