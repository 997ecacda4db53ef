//! Append-only earnings ledger operations.

use crate::domain::{Earning, EarningKind, Money, NewEarning, OwnerId, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::Repository;

impl Repository {
    /// Append one earnings record inside the settling unit's transaction.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_earning(
        &self,
        conn: &mut SqliteConnection,
        earning: &NewEarning,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO earnings (owner, kind, amount, position_id, source_owner, level, description, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(earning.owner.as_str())
        .bind(earning.kind.as_str())
        .bind(earning.amount.to_canonical_string())
        .bind(earning.position_id)
        .bind(earning.source_owner.as_ref().map(|o| o.as_str().to_string()))
        .bind(earning.level.map(|l| l as i64))
        .bind(&earning.description)
        .bind(earning.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Query one owner's earnings in a time range, oldest first, optionally
    /// filtered by kind.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_earnings(
        &self,
        owner: &OwnerId,
        kind: Option<EarningKind>,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Earning>, sqlx::Error> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    SELECT id, owner, kind, amount, position_id, source_owner, level, description, created_at_ms
                    FROM earnings
                    WHERE owner = ? AND kind = ? AND created_at_ms >= ? AND created_at_ms <= ?
                    ORDER BY created_at_ms ASC, id ASC
                    "#,
                )
                .bind(owner.as_str())
                .bind(kind.as_str())
                .bind(from_ms)
                .bind(to_ms)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, owner, kind, amount, position_id, source_owner, level, description, created_at_ms
                    FROM earnings
                    WHERE owner = ? AND created_at_ms >= ? AND created_at_ms <= ?
                    ORDER BY created_at_ms ASC, id ASC
                    "#,
                )
                .bind(owner.as_str())
                .bind(from_ms)
                .bind(to_ms)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.iter().map(earning_from_row).collect())
    }

    /// Query earnings across all owners in a time range, oldest first,
    /// optionally filtered by kind. Feeds the reporting/export surface.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_earnings_in_range(
        &self,
        kind: Option<EarningKind>,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Earning>, sqlx::Error> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    SELECT id, owner, kind, amount, position_id, source_owner, level, description, created_at_ms
                    FROM earnings
                    WHERE kind = ? AND created_at_ms >= ? AND created_at_ms <= ?
                    ORDER BY created_at_ms ASC, id ASC
                    "#,
                )
                .bind(kind.as_str())
                .bind(from_ms)
                .bind(to_ms)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, owner, kind, amount, position_id, source_owner, level, description, created_at_ms
                    FROM earnings
                    WHERE created_at_ms >= ? AND created_at_ms <= ?
                    ORDER BY created_at_ms ASC, id ASC
                    "#,
                )
                .bind(from_ms)
                .bind(to_ms)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.iter().map(earning_from_row).collect())
    }
}

/// Map a row into an Earning.
///
/// Reporting reads are lenient: a malformed amount is logged and surfaced as
/// zero rather than failing the whole report. Settlement never reads these
/// amounts back, so leniency here cannot corrupt postings.
fn earning_from_row(row: &SqliteRow) -> Earning {
    let id: i64 = row.get("id");
    let amount_str: String = row.get("amount");
    let amount = Money::from_str(&amount_str).unwrap_or_else(|e| {
        warn!(
            earning_id = id,
            amount = %amount_str,
            error = %e,
            "Failed to parse earning amount decimal, using default"
        );
        Money::default()
    });

    let kind_str: String = row.get("kind");
    let kind = EarningKind::parse(&kind_str).unwrap_or_else(|| {
        warn!(earning_id = id, kind = %kind_str, "Unknown earning kind, treating as ACCRUAL");
        EarningKind::Accrual
    });

    Earning {
        id,
        owner: OwnerId::new(row.get::<String, _>("owner")),
        kind,
        amount,
        position_id: row.get("position_id"),
        source_owner: row
            .get::<Option<String>, _>("source_owner")
            .map(OwnerId::new),
        level: row.get::<Option<i64>, _>("level").map(|l| l as u32),
        description: row.get("description"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    }
}
