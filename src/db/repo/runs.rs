//! Run registry: the daily idempotency gate, forced-run throttle, run logs.

use crate::domain::{FailedItem, Money, RunDate, RunHandle, RunSummary, SettlementRunLog, TimeMs};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use super::Repository;

const LAST_FORCED_RUN_KEY: &str = "last_forced_run_ms";

/// Outcome of asking for a forced-run slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedGate {
    Acquired,
    /// Denied: the previous forced run was too recent.
    Throttled { retry_after_ms: i64 },
}

/// A run summary ready to persist, with its registry bookkeeping.
#[derive(Debug, Clone)]
pub struct NewRunLog<'a> {
    pub run_id: Option<Uuid>,
    pub summary: &'a RunSummary,
    pub detail: serde_json::Value,
    pub forced: bool,
    pub created_at: TimeMs,
}

impl Repository {
    // =========================================================================
    // Daily gate
    // =========================================================================

    /// Claim the settlement gate for `day`.
    ///
    /// One atomic insert against the unique run-date key: the winner gets a
    /// handle, every other invocation for the same day gets None. Losing is
    /// the expected steady-state outcome, not an error.
    ///
    /// # Errors
    /// Returns an error if the insert itself fails.
    pub async fn begin_run(
        &self,
        day: RunDate,
        now: TimeMs,
    ) -> Result<Option<RunHandle>, sqlx::Error> {
        let run_id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO settlement_runs (run_date, run_id, started_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(run_date) DO NOTHING
            "#,
        )
        .bind(day.to_key())
        .bind(run_id.to_string())
        .bind(now.as_ms())
        .execute(self.pool())
        .await?;

        if result.rows_affected() > 0 {
            Ok(Some(RunHandle { run_id, date: day }))
        } else {
            Ok(None)
        }
    }

    /// Whether a settlement run has already claimed `day`.
    pub async fn run_exists(&self, day: RunDate) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM settlement_runs WHERE run_date = ?")
            .bind(day.to_key())
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }

    // =========================================================================
    // Forced-run throttle
    // =========================================================================

    /// Atomically claim a forced-run slot.
    ///
    /// The last-forced timestamp lives in the registry's storage, not process
    /// memory, so the minimum interval between forced runs survives restarts.
    /// Read and update happen in one transaction so two racing administrators
    /// cannot both acquire the slot.
    pub async fn try_acquire_forced_slot(
        &self,
        now: TimeMs,
        min_interval_ms: i64,
    ) -> Result<ForcedGate, sqlx::Error> {
        let mut tx = self.begin().await?;

        let row = sqlx::query("SELECT value FROM settlement_meta WHERE key = ?")
            .bind(LAST_FORCED_RUN_KEY)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = row {
            let value: String = row.get("value");
            let last_ms = value.parse::<i64>().unwrap_or_else(|e| {
                warn!(value = %value, error = %e, "Corrupt last_forced_run_ms, treating as never");
                i64::MIN / 2
            });
            let elapsed = now.as_ms() - last_ms;
            if elapsed < min_interval_ms {
                return Ok(ForcedGate::Throttled {
                    retry_after_ms: min_interval_ms - elapsed,
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO settlement_meta (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_FORCED_RUN_KEY)
        .bind(now.as_ms().to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ForcedGate::Acquired)
    }

    // =========================================================================
    // Run logs
    // =========================================================================

    /// Persist the summary of one run attempt. Every completed pass logs,
    /// gated or forced; failure here is fatal to the run and propagates.
    pub async fn insert_run_log(&self, log: &NewRunLog<'_>) -> Result<i64, sqlx::Error> {
        let failed_items = serde_json::to_string(&log.summary.failed_items)
            .unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO settlement_run_logs
                (run_id, run_date, processed, skipped, total_accrual, total_commission,
                 failed_items, detail, forced, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.run_id.map(|id| id.to_string()))
        .bind(log.summary.date.to_key())
        .bind(log.summary.processed as i64)
        .bind(log.summary.skipped as i64)
        .bind(log.summary.total_accrual.to_canonical_string())
        .bind(log.summary.total_commission.to_canonical_string())
        .bind(failed_items)
        .bind(log.detail.to_string())
        .bind(log.forced as i64)
        .bind(log.created_at.as_ms())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Page through run logs, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_run_logs(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SettlementRunLog>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, run_date, processed, skipped, total_accrual,
                   total_commission, failed_items, detail, forced, created_at_ms
            FROM settlement_run_logs
            ORDER BY created_at_ms DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        let logs = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");

                let run_id = row
                    .get::<Option<String>, _>("run_id")
                    .and_then(|s| match Uuid::parse_str(&s) {
                        Ok(u) => Some(u),
                        Err(e) => {
                            warn!(log_id = id, run_id = %s, error = %e, "Corrupt run_id in run log");
                            None
                        }
                    });

                let date_str: String = row.get("run_date");
                let date = RunDate::parse(&date_str).unwrap_or_else(|e| {
                    warn!(log_id = id, run_date = %date_str, error = %e, "Corrupt run_date in run log");
                    RunDate::from_time(TimeMs::new(0))
                });

                let failed_items_str: String = row.get("failed_items");
                let failed_items: Vec<FailedItem> = serde_json::from_str(&failed_items_str)
                    .unwrap_or_else(|e| {
                        warn!(log_id = id, error = %e, "Corrupt failed_items in run log");
                        Vec::new()
                    });

                let detail_str: String = row.get("detail");
                let detail = serde_json::from_str(&detail_str)
                    .unwrap_or(serde_json::Value::Null);

                SettlementRunLog {
                    id,
                    run_id,
                    date,
                    processed: row.get::<i64, _>("processed") as u64,
                    skipped: row.get::<i64, _>("skipped") as u64,
                    total_accrual: lenient_money(id, "total_accrual", &row.get::<String, _>("total_accrual")),
                    total_commission: lenient_money(
                        id,
                        "total_commission",
                        &row.get::<String, _>("total_commission"),
                    ),
                    failed_items,
                    detail,
                    forced: row.get::<i64, _>("forced") != 0,
                    created_at: TimeMs::new(row.get("created_at_ms")),
                }
            })
            .collect();

        Ok(logs)
    }
}

fn lenient_money(log_id: i64, column: &str, value: &str) -> Money {
    Money::from_str(value).unwrap_or_else(|e| {
        warn!(log_id, column, value = %value, error = %e, "Failed to parse run log decimal, using default");
        Money::default()
    })
}
