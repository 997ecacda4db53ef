//! Domain primitives: TimeMs, OwnerId, RunDate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

/// Opaque account-owner identifier.
///
/// Owners are created by the onboarding flow outside this engine; here they
/// are only referenced, never minted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Create an OwnerId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC calendar day, the settlement granularity.
///
/// Serialized and stored as `YYYY-MM-DD`, so string ordering matches date
/// ordering (the eligibility query relies on this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunDate(pub NaiveDate);

impl RunDate {
    /// Create a RunDate from a NaiveDate.
    pub fn new(date: NaiveDate) -> Self {
        RunDate(date)
    }

    /// Truncate a timestamp to its UTC day boundary.
    pub fn from_time(time: TimeMs) -> Self {
        let dt = DateTime::<Utc>::from_timestamp_millis(time.as_ms())
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap());
        RunDate(dt.date_naive())
    }

    /// Parse from `YYYY-MM-DD`.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(RunDate)
    }

    /// Format as `YYYY-MM-DD`.
    pub fn to_key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for RunDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timems_ordering() {
        let t1 = TimeMs::new(1000);
        let t2 = TimeMs::new(2000);
        assert!(t1 < t2);
    }

    #[test]
    fn test_owner_id_display() {
        let owner = OwnerId::new("u-1001");
        assert_eq!(owner.to_string(), "u-1001");
    }

    #[test]
    fn test_run_date_from_time_truncates_to_day() {
        // 2024-03-15T23:59:59.999Z and 2024-03-15T00:00:00Z are the same day
        let late = RunDate::from_time(TimeMs::new(1710547199999));
        let early = RunDate::from_time(TimeMs::new(1710460800000));
        assert_eq!(late, early);
        assert_eq!(late.to_key(), "2024-03-15");

        // One millisecond later is the next day
        let next = RunDate::from_time(TimeMs::new(1710547200000));
        assert_eq!(next.to_key(), "2024-03-16");
    }

    #[test]
    fn test_run_date_key_ordering_matches_date_ordering() {
        let a = RunDate::parse("2024-01-31").unwrap();
        let b = RunDate::parse("2024-02-01").unwrap();
        assert!(a < b);
        assert!(a.to_key() < b.to_key());
    }

    #[test]
    fn test_run_date_parse_rejects_garbage() {
        assert!(RunDate::parse("not-a-date").is_err());
        assert!(RunDate::parse("2024-13-01").is_err());
    }
}
