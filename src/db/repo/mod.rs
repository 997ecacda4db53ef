//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `positions.rs` - position enumeration and per-unit settlement reads/writes
//! - `earnings.rs` - append-only earnings ledger
//! - `runs.rs` - run registry: daily gate, forced-run throttle, run logs
//!
//! Transaction-scoped methods take `&mut SqliteConnection` so the settlement
//! orchestrator can compose one position's reads and writes into a single
//! transaction it owns. Pool-scoped methods are for standalone operations.

mod earnings;
mod positions;
mod runs;

pub use positions::NewPosition;
pub use runs::{ForcedGate, NewRunLog};

use crate::domain::{Money, OwnerId, Wallet};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;

/// Before/after snapshot of a wallet's main balance for one credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCredit {
    pub owner: OwnerId,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
}

/// Which cumulative total a credit bumps alongside the main balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreditKind {
    Accrual,
    Commission,
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for one settlement unit of work.
    ///
    /// # Errors
    /// Returns an error if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Lightweight liveness probe for readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Wallet operations
    // =========================================================================

    /// Read a wallet, or None if the owner has never been credited.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored balance is corrupt.
    pub async fn wallet(&self, owner: &OwnerId) -> Result<Option<Wallet>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        self.wallet_in(&mut *conn, owner).await
    }

    /// Transaction-scoped wallet read.
    pub async fn wallet_in(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
    ) -> Result<Option<Wallet>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT owner, main_balance, deposit_balance, total_accrued, total_commission
            FROM wallets
            WHERE owner = ?
            "#,
        )
        .bind(owner.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|r| {
            Ok(Wallet {
                owner: OwnerId::new(r.get::<String, _>("owner")),
                main_balance: parse_money("wallets.main_balance", &r.get::<String, _>("main_balance"))?,
                deposit_balance: parse_money(
                    "wallets.deposit_balance",
                    &r.get::<String, _>("deposit_balance"),
                )?,
                total_accrued: parse_money("wallets.total_accrued", &r.get::<String, _>("total_accrued"))?,
                total_commission: parse_money(
                    "wallets.total_commission",
                    &r.get::<String, _>("total_commission"),
                )?,
            })
        })
        .transpose()
    }

    /// Read a wallet inside a transaction, creating a zeroed one on first
    /// reference.
    pub async fn get_or_create_wallet(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
    ) -> Result<Wallet, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallets (owner)
            VALUES (?)
            ON CONFLICT(owner) DO NOTHING
            "#,
        )
        .bind(owner.as_str())
        .execute(&mut *conn)
        .await?;

        self.wallet_in(conn, owner)
            .await?
            .ok_or_else(|| decode_err(format!("wallet for {} vanished after upsert", owner)))
    }

    /// Credit an accrual: main balance and lifetime accrual total.
    ///
    /// Must be called inside the settling position's transaction; re-reads
    /// the current balance rather than trusting any earlier snapshot.
    pub async fn credit_accrual(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
        amount: Money,
    ) -> Result<WalletCredit, sqlx::Error> {
        self.credit_wallet(conn, owner, amount, CreditKind::Accrual)
            .await
    }

    /// Credit a referral commission: main balance and lifetime commission total.
    pub async fn credit_commission(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
        amount: Money,
    ) -> Result<WalletCredit, sqlx::Error> {
        self.credit_wallet(conn, owner, amount, CreditKind::Commission)
            .await
    }

    async fn credit_wallet(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
        amount: Money,
        kind: CreditKind,
    ) -> Result<WalletCredit, sqlx::Error> {
        let wallet = self.get_or_create_wallet(conn, owner).await?;

        let balance_before = wallet.main_balance;
        let balance_after = balance_before + amount;
        let total_column = match kind {
            CreditKind::Accrual => "total_accrued",
            CreditKind::Commission => "total_commission",
        };
        let new_total = match kind {
            CreditKind::Accrual => wallet.total_accrued + amount,
            CreditKind::Commission => wallet.total_commission + amount,
        };

        let sql = format!(
            "UPDATE wallets SET main_balance = ?, {} = ? WHERE owner = ?",
            total_column
        );
        sqlx::query(&sql)
            .bind(balance_after.to_canonical_string())
            .bind(new_total.to_canonical_string())
            .bind(owner.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(WalletCredit {
            owner: owner.clone(),
            amount,
            balance_before,
            balance_after,
        })
    }

    // =========================================================================
    // Sponsor edges
    // =========================================================================

    /// One upward step in the referral forest.
    pub async fn sponsor_of(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerId,
    ) -> Result<Option<OwnerId>, sqlx::Error> {
        let row = sqlx::query("SELECT sponsor FROM sponsor_edges WHERE owner = ?")
            .bind(owner.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| OwnerId::new(r.get::<String, _>("sponsor"))))
    }

    /// Record an owner's sponsor. Onboarding-side write, exposed for tests
    /// and admin seeding; the engine itself only reads edges.
    pub async fn set_sponsor(&self, owner: &OwnerId, sponsor: &OwnerId) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sponsor_edges (owner, sponsor)
            VALUES (?, ?)
            ON CONFLICT(owner) DO UPDATE SET sponsor = excluded.sponsor
            "#,
        )
        .bind(owner.as_str())
        .bind(sponsor.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Strict decimal parse for settlement-critical columns.
///
/// A corrupt stored amount must fail the owning unit of work; silently
/// defaulting would post wrong money.
pub(crate) fn parse_money(column: &str, value: &str) -> Result<Money, sqlx::Error> {
    Money::from_str(value)
        .map_err(|e| decode_err(format!("invalid decimal in {}: {:?} ({})", column, value, e)))
}

pub(crate) fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup_repo() -> (Arc<Repository>, SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Arc::new(Repository::new(pool.clone())), pool, temp_dir)
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_wallet_created_lazily() {
        let (repo, _pool, _temp) = setup_repo().await;
        let owner = OwnerId::new("u-1");

        assert!(repo.wallet(&owner).await.unwrap().is_none());

        let mut tx = repo.begin().await.unwrap();
        let wallet = repo.get_or_create_wallet(&mut tx, &owner).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(wallet, Wallet::empty(owner.clone()));
        assert!(repo.wallet(&owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_credit_accrual_updates_balance_and_total() {
        let (repo, _pool, _temp) = setup_repo().await;
        let owner = OwnerId::new("u-1");

        let mut tx = repo.begin().await.unwrap();
        let credit = repo
            .credit_accrual(&mut tx, &owner, money("15.00"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(credit.balance_before.is_zero());
        assert_eq!(credit.balance_after, money("15"));

        let wallet = repo.wallet(&owner).await.unwrap().unwrap();
        assert_eq!(wallet.main_balance, money("15"));
        assert_eq!(wallet.total_accrued, money("15"));
        assert!(wallet.total_commission.is_zero());
    }

    #[tokio::test]
    async fn test_credit_commission_updates_commission_total() {
        let (repo, _pool, _temp) = setup_repo().await;
        let owner = OwnerId::new("u-1");

        let mut tx = repo.begin().await.unwrap();
        repo.credit_accrual(&mut tx, &owner, money("10"))
            .await
            .unwrap();
        let credit = repo
            .credit_commission(&mut tx, &owner, money("1.50"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(credit.balance_before, money("10"));
        assert_eq!(credit.balance_after, money("11.50"));

        let wallet = repo.wallet(&owner).await.unwrap().unwrap();
        assert_eq!(wallet.main_balance, money("11.50"));
        assert_eq!(wallet.total_accrued, money("10"));
        assert_eq!(wallet.total_commission, money("1.50"));
    }

    #[tokio::test]
    async fn test_uncommitted_credit_rolls_back() {
        let (repo, _pool, _temp) = setup_repo().await;
        let owner = OwnerId::new("u-1");

        {
            let mut tx = repo.begin().await.unwrap();
            repo.credit_accrual(&mut tx, &owner, money("99"))
                .await
                .unwrap();
            // dropped without commit
        }

        assert!(repo.wallet(&owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sponsor_of_follows_edge() {
        let (repo, _pool, _temp) = setup_repo().await;
        let owner = OwnerId::new("child");
        let sponsor = OwnerId::new("parent");

        repo.set_sponsor(&owner, &sponsor).await.unwrap();

        let mut conn = repo.pool().acquire().await.unwrap();
        assert_eq!(
            repo.sponsor_of(&mut *conn, &owner).await.unwrap(),
            Some(sponsor)
        );
        assert_eq!(
            repo.sponsor_of(&mut *conn, &OwnerId::new("parent"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_parse_money_rejects_garbage() {
        let err = parse_money("wallets.main_balance", "not-a-number").unwrap_err();
        assert!(err.to_string().contains("main_balance"));
    }
}
