//! Best-effort audit trail of wallet balance mutations.
//!
//! The sink is a side-channel: the orchestrator flushes entries after a
//! unit's transaction commits, and a sink failure is logged and swallowed.
//! Audit is observability, never a correctness dependency.

use crate::domain::{Money, OwnerId, TimeMs};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::fmt;
use thiserror::Error;

/// What kind of balance mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AccrualCredit,
    CommissionCredit,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccrualCredit => "accrual_credit",
            AuditAction::CommissionCredit => "commission_credit",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One balance mutation with its before/after snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub owner: OwnerId,
    pub action: AuditAction,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    /// Free-form context: position id, level, source owner, run date.
    pub metadata: serde_json::Value,
    pub created_at: TimeMs,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Sink for audit entries.
///
/// Implementations must be safe to call after the owning transaction has
/// committed; they get no way to fail it.
#[async_trait]
pub trait AuditSink: Send + Sync + fmt::Debug {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Audit sink appending to the `audit_log` table on its own connection.
#[derive(Debug, Clone)]
pub struct DbAuditSink {
    pool: SqlitePool,
}

impl DbAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (owner, action, amount, balance_before, balance_after, metadata, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.owner.as_str())
        .bind(entry.action.as_str())
        .bind(entry.amount.to_canonical_string())
        .bind(entry.balance_before.to_canonical_string())
        .bind(entry.balance_after.to_canonical_string())
        .bind(entry.metadata.to_string())
        .bind(entry.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use sqlx::Row;
    use std::str::FromStr;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_sink_appends_entry() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.unwrap();
        let sink = DbAuditSink::new(pool.clone());

        let entry = AuditEntry {
            owner: OwnerId::new("u-1"),
            action: AuditAction::AccrualCredit,
            amount: Money::from_str("15.00").unwrap(),
            balance_before: Money::from_str("100").unwrap(),
            balance_after: Money::from_str("115").unwrap(),
            metadata: serde_json::json!({"positionId": 7}),
            created_at: TimeMs::new(1000),
        };
        sink.record(&entry).await.unwrap();

        let row = sqlx::query("SELECT owner, action, amount, balance_before, balance_after FROM audit_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("owner"), "u-1");
        assert_eq!(row.get::<String, _>("action"), "accrual_credit");
        assert_eq!(row.get::<String, _>("amount"), "15");
        assert_eq!(row.get::<String, _>("balance_before"), "100");
        assert_eq!(row.get::<String, _>("balance_after"), "115");
    }
}
