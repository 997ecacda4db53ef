//! Investment position earning a fixed daily return.

use crate::domain::{Money, OwnerId, RunDate, TimeMs};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an investment position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Accruing daily returns.
    Active,
    /// Ran its full term; principal released.
    Completed,
    /// Terminated before term; never settles again.
    Cancelled,
}

impl PositionStatus {
    /// Parse from the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PositionStatus::Active),
            "COMPLETED" => Some(PositionStatus::Completed),
            "CANCELLED" => Some(PositionStatus::Cancelled),
            _ => None,
        }
    }

    /// Stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Completed => "COMPLETED",
            PositionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An investment position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub owner: OwnerId,
    /// Invested principal; never negative.
    pub principal: Money,
    /// Daily return as a percentage of principal (e.g. 1.5 = 1.5%/day).
    pub daily_rate_percent: Money,
    pub status: PositionStatus,
    pub is_active: bool,
    pub started_at: TimeMs,
    /// UTC day this position last accrued, None before first settlement.
    pub last_settled_day: Option<RunDate>,
}

impl Position {
    /// Whether this position should accrue for `day`.
    ///
    /// A position settles at most once per calendar day; the check is against
    /// `last_settled_day`, not the run gate, so an administratively forced
    /// re-run on the same day still cannot double-pay a position.
    pub fn eligible_on(&self, day: RunDate) -> bool {
        self.status == PositionStatus::Active
            && self.is_active
            && self.last_settled_day.map_or(true, |settled| settled < day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn position(status: PositionStatus, is_active: bool, settled: Option<&str>) -> Position {
        Position {
            id: 1,
            owner: OwnerId::new("u-1"),
            principal: Money::from_str("1000").unwrap(),
            daily_rate_percent: Money::from_str("1.5").unwrap(),
            status,
            is_active,
            started_at: TimeMs::new(0),
            last_settled_day: settled.map(|s| RunDate::parse(s).unwrap()),
        }
    }

    #[test]
    fn test_eligible_when_active_and_unsettled() {
        let day = RunDate::parse("2024-03-15").unwrap();
        assert!(position(PositionStatus::Active, true, None).eligible_on(day));
        assert!(position(PositionStatus::Active, true, Some("2024-03-14")).eligible_on(day));
    }

    #[test]
    fn test_not_eligible_when_already_settled_today() {
        let day = RunDate::parse("2024-03-15").unwrap();
        assert!(!position(PositionStatus::Active, true, Some("2024-03-15")).eligible_on(day));
        // A future stamp (clock skew on a prior run) also blocks re-settlement
        assert!(!position(PositionStatus::Active, true, Some("2024-03-16")).eligible_on(day));
    }

    #[test]
    fn test_not_eligible_when_inactive_or_terminal() {
        let day = RunDate::parse("2024-03-15").unwrap();
        assert!(!position(PositionStatus::Active, false, None).eligible_on(day));
        assert!(!position(PositionStatus::Completed, true, None).eligible_on(day));
        assert!(!position(PositionStatus::Cancelled, true, None).eligible_on(day));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            PositionStatus::Active,
            PositionStatus::Completed,
            PositionStatus::Cancelled,
        ] {
            assert_eq!(PositionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PositionStatus::parse("PAUSED"), None);
    }
}
