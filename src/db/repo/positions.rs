//! Position operations: enumeration for a run, per-unit reads and stamps.

use crate::domain::{Money, OwnerId, Position, PositionStatus, RunDate, TimeMs};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::{decode_err, parse_money, Repository};

/// A position as created by the deposit/approval workflow (external to the
/// engine); exposed here for tests and admin seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosition {
    pub owner: OwnerId,
    pub principal: Money,
    pub daily_rate_percent: Money,
    pub status: PositionStatus,
    pub is_active: bool,
    pub started_at: TimeMs,
}

impl NewPosition {
    /// An ACTIVE, settleable position.
    pub fn active(owner: OwnerId, principal: Money, daily_rate_percent: Money, at: TimeMs) -> Self {
        NewPosition {
            owner,
            principal,
            daily_rate_percent,
            status: PositionStatus::Active,
            is_active: true,
            started_at: at,
        }
    }
}

impl Repository {
    /// Insert a position, returning its id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_position(&self, position: &NewPosition) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (owner, principal, daily_rate_percent, status, is_active, started_at_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.owner.as_str())
        .bind(position.principal.to_canonical_string())
        .bind(position.daily_rate_percent.to_canonical_string())
        .bind(position.status.as_str())
        .bind(position.is_active as i64)
        .bind(position.started_at.as_ms())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// One page of position ids eligible for settlement on `day`, in id
    /// order, starting strictly after `after_id`.
    ///
    /// Keyset pagination keeps memory bounded however many positions exist;
    /// the orchestrator walks pages rather than materializing the whole set.
    /// Eligibility is re-checked inside each unit's transaction, so a stale
    /// page entry degrades to a skip, never a double payment.
    pub async fn eligible_position_ids(
        &self,
        day: RunDate,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM positions
            WHERE status = 'ACTIVE'
              AND is_active = 1
              AND (last_settled_day IS NULL OR last_settled_day < ?)
              AND id > ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(day.to_key())
        .bind(after_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
    }

    /// Re-read a position inside its unit's transaction.
    ///
    /// Money columns parse strictly: a corrupt principal or rate fails this
    /// position's unit instead of settling a wrong amount.
    pub async fn position_for_update(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Position>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, principal, daily_rate_percent, status, is_active,
                   started_at_ms, last_settled_day
            FROM positions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|r| {
            let status_str: String = r.get("status");
            let status = PositionStatus::parse(&status_str).ok_or_else(|| {
                decode_err(format!("unknown position status {:?} for id {}", status_str, id))
            })?;

            let last_settled_day = r
                .get::<Option<String>, _>("last_settled_day")
                .map(|s| {
                    RunDate::parse(&s).map_err(|e| {
                        decode_err(format!("invalid last_settled_day {:?} for id {}: {}", s, id, e))
                    })
                })
                .transpose()?;

            Ok(Position {
                id: r.get("id"),
                owner: OwnerId::new(r.get::<String, _>("owner")),
                principal: parse_money("positions.principal", &r.get::<String, _>("principal"))?,
                daily_rate_percent: parse_money(
                    "positions.daily_rate_percent",
                    &r.get::<String, _>("daily_rate_percent"),
                )?,
                status,
                is_active: r.get::<i64, _>("is_active") != 0,
                started_at: TimeMs::new(r.get("started_at_ms")),
                last_settled_day,
            })
        })
        .transpose()
    }

    /// Stamp a position as settled for `day`. Part of the unit's transaction.
    pub async fn mark_position_settled(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        day: RunDate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE positions SET last_settled_day = ? WHERE id = ?")
            .bind(day.to_key())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn active_position(owner: &str) -> NewPosition {
        NewPosition::active(
            OwnerId::new(owner),
            money("1000"),
            money("1.5"),
            TimeMs::new(1_700_000_000_000),
        )
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (repo, _temp) = setup_repo().await;
        let id = repo.insert_position(&active_position("u-1")).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let position = repo
            .position_for_update(&mut tx, id)
            .await
            .unwrap()
            .expect("position missing");

        assert_eq!(position.id, id);
        assert_eq!(position.owner, OwnerId::new("u-1"));
        assert_eq!(position.principal, money("1000"));
        assert_eq!(position.daily_rate_percent, money("1.5"));
        assert_eq!(position.status, PositionStatus::Active);
        assert!(position.is_active);
        assert_eq!(position.last_settled_day, None);
    }

    #[tokio::test]
    async fn test_eligible_filter_and_pagination() {
        let (repo, _temp) = setup_repo().await;
        let day = RunDate::parse("2024-03-15").unwrap();

        for i in 0..5 {
            repo.insert_position(&active_position(&format!("u-{}", i)))
                .await
                .unwrap();
        }
        // An inactive, a cancelled, and an already-settled position
        let mut inactive = active_position("u-x");
        inactive.is_active = false;
        repo.insert_position(&inactive).await.unwrap();

        let mut cancelled = active_position("u-y");
        cancelled.status = PositionStatus::Cancelled;
        repo.insert_position(&cancelled).await.unwrap();

        let settled_id = repo.insert_position(&active_position("u-z")).await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        repo.mark_position_settled(&mut tx, settled_id, day)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let page1 = repo.eligible_position_ids(day, 0, 3).await.unwrap();
        assert_eq!(page1.len(), 3);
        let page2 = repo
            .eligible_position_ids(day, *page1.last().unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(page2.len(), 2);
        let page3 = repo
            .eligible_position_ids(day, *page2.last().unwrap(), 3)
            .await
            .unwrap();
        assert!(page3.is_empty());
    }

    #[tokio::test]
    async fn test_settled_position_eligible_again_next_day() {
        let (repo, _temp) = setup_repo().await;
        let day = RunDate::parse("2024-03-15").unwrap();
        let next_day = RunDate::parse("2024-03-16").unwrap();

        let id = repo.insert_position(&active_position("u-1")).await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        repo.mark_position_settled(&mut tx, id, day).await.unwrap();
        tx.commit().await.unwrap();

        assert!(repo.eligible_position_ids(day, 0, 10).await.unwrap().is_empty());
        assert_eq!(
            repo.eligible_position_ids(next_day, 0, 10).await.unwrap(),
            vec![id]
        );
    }

    #[tokio::test]
    async fn test_corrupt_principal_fails_read() {
        let (repo, _temp) = setup_repo().await;
        let id = repo.insert_position(&active_position("u-1")).await.unwrap();

        sqlx::query("UPDATE positions SET principal = 'garbage' WHERE id = ?")
            .bind(id)
            .execute(repo.pool())
            .await
            .unwrap();

        let mut tx = repo.begin().await.unwrap();
        let err = repo.position_for_update(&mut tx, id).await.unwrap_err();
        assert!(err.to_string().contains("principal"));
    }

    #[tokio::test]
    async fn test_missing_position_is_none() {
        let (repo, _temp) = setup_repo().await;
        let mut tx = repo.begin().await.unwrap();
        assert!(repo
            .position_for_update(&mut tx, 9999)
            .await
            .unwrap()
            .is_none());
    }
}
