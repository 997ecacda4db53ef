//! The settlement run: gate, per-position units of work, run log.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::config::Config;
use crate::db::{ForcedGate, NewRunLog, Repository};
use crate::domain::{
    FailedItem, Money, NewEarning, RunDate, RunOutcome, RunSummary, TimeMs,
};
use crate::engine::{commission_plan, daily_accrual, CommissionTable};
use crate::orchestration::referral::resolve_ancestors;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Eligible-position page size. Settlement streams id pages instead of
/// materializing every position, so memory stays flat for large books.
const POSITION_PAGE_SIZE: i64 = 500;

#[derive(Clone)]
pub struct Orchestrator {
    repo: Arc<Repository>,
    audit: Arc<dyn AuditSink>,
    table: CommissionTable,
    max_sponsor_depth: u32,
    currency_scale: u32,
    forced_run_min_interval_ms: i64,
}

/// Result of one position's unit of work.
enum UnitOutcome {
    Settled {
        accrual: Money,
        commission_total: Money,
        audit_entries: Vec<AuditEntry>,
    },
    /// No longer eligible when re-read inside the transaction.
    Skipped,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    /// A fault outside the per-position loop: gate access, position
    /// enumeration. Fatal to the run.
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("forced run throttled, retry in {retry_after_ms} ms")]
    ForcedRunThrottled { retry_after_ms: i64 },
    /// The pass completed but its summary could not be persisted. Fatal:
    /// a run whose outcome is unrecorded must not report success.
    #[error("failed to persist settlement run log: {0}")]
    LogWrite(#[source] sqlx::Error),
}

impl Orchestrator {
    pub fn new(repo: Arc<Repository>, audit: Arc<dyn AuditSink>, config: &Config) -> Self {
        Self {
            repo,
            audit,
            table: CommissionTable::new(config.commission_level_percents.clone()),
            max_sponsor_depth: config.max_sponsor_depth,
            currency_scale: config.currency_scale,
            forced_run_min_interval_ms: config.forced_run_min_interval_secs * 1000,
        }
    }

    /// Run settlement for today (UTC).
    ///
    /// Scheduled runs (`forced = false`) pass through the daily gate and are
    /// idempotent per calendar day. Forced runs bypass the gate but must
    /// clear the persisted minimum-interval throttle; positions already
    /// settled today are skipped either way, so a forced re-run repairs
    /// failures without double-paying successes.
    pub async fn run_settlement(&self, forced: bool) -> Result<RunOutcome, SettlementError> {
        let started_at = TimeMs::now();
        let day = RunDate::from_time(started_at);
        self.run_settlement_at(day, started_at, forced).await
    }

    /// Settlement with an explicit clock, the testable entrypoint.
    pub async fn run_settlement_at(
        &self,
        day: RunDate,
        now: TimeMs,
        forced: bool,
    ) -> Result<RunOutcome, SettlementError> {
        let run_id = if forced {
            match self
                .repo
                .try_acquire_forced_slot(now, self.forced_run_min_interval_ms)
                .await?
            {
                ForcedGate::Acquired => {
                    info!(%day, "Starting forced settlement run");
                    None
                }
                ForcedGate::Throttled { retry_after_ms } => {
                    warn!(%day, retry_after_ms, "Forced settlement run throttled");
                    return Err(SettlementError::ForcedRunThrottled { retry_after_ms });
                }
            }
        } else {
            match self.repo.begin_run(day, now).await? {
                Some(handle) => {
                    info!(%day, run_id = %handle.run_id, "Claimed settlement gate");
                    Some(handle.run_id)
                }
                None => {
                    info!(%day, "Settlement already ran for this day; nothing to do");
                    return Ok(RunOutcome::AlreadyRun { date: day });
                }
            }
        };

        let summary = self.process_positions(day, now).await?;
        self.persist_run_log(&summary, run_id, forced, now).await?;

        info!(
            %day,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed_items.len(),
            total_accrual = %summary.total_accrual,
            total_commission = %summary.total_commission,
            "Settlement run complete"
        );

        Ok(RunOutcome::Completed(summary))
    }

    /// Iterate every eligible position, isolating each failure to its own
    /// unit. Only enumeration faults escape this loop.
    async fn process_positions(
        &self,
        day: RunDate,
        now: TimeMs,
    ) -> Result<RunSummary, SettlementError> {
        let mut summary = RunSummary::empty(day);
        let mut after_id = 0i64;

        loop {
            let page = self
                .repo
                .eligible_position_ids(day, after_id, POSITION_PAGE_SIZE)
                .await?;
            let Some(&last_id) = page.last() else {
                break;
            };

            for position_id in page {
                match self.settle_position(position_id, day, now).await {
                    Ok(UnitOutcome::Settled {
                        accrual,
                        commission_total,
                        audit_entries,
                    }) => {
                        summary.processed += 1;
                        summary.total_accrual = summary.total_accrual + accrual;
                        summary.total_commission = summary.total_commission + commission_total;
                        self.flush_audit(audit_entries).await;
                    }
                    Ok(UnitOutcome::Skipped) => {
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        warn!(position_id, error = %e, "Position settlement failed; continuing run");
                        summary.failed_items.push(FailedItem {
                            position_id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            after_id = last_id;
        }

        Ok(summary)
    }

    /// One position's atomic unit of work.
    ///
    /// Everything between the re-read and the commit happens in a single
    /// transaction; an error at any step rolls back this position only.
    async fn settle_position(
        &self,
        position_id: i64,
        day: RunDate,
        now: TimeMs,
    ) -> Result<UnitOutcome, sqlx::Error> {
        let mut tx = self.repo.begin().await?;

        // Re-read inside the transaction: the enumeration snapshot may be
        // stale if another trigger or an admin mutation got here first.
        let Some(position) = self.repo.position_for_update(&mut tx, position_id).await? else {
            return Ok(UnitOutcome::Skipped);
        };
        if !position.eligible_on(day) {
            return Ok(UnitOutcome::Skipped);
        }

        let accrual = daily_accrual(
            position.principal,
            position.daily_rate_percent,
            self.currency_scale,
        );

        let mut audit_entries = Vec::new();
        let mut commission_total = Money::zero();

        if accrual.is_positive() {
            let credit = self
                .repo
                .credit_accrual(&mut tx, &position.owner, accrual)
                .await?;
            self.repo
                .insert_earning(
                    &mut tx,
                    &NewEarning::accrual(position.owner.clone(), position_id, accrual, now),
                )
                .await?;
            audit_entries.push(AuditEntry {
                owner: position.owner.clone(),
                action: AuditAction::AccrualCredit,
                amount: accrual,
                balance_before: credit.balance_before,
                balance_after: credit.balance_after,
                metadata: serde_json::json!({
                    "positionId": position_id,
                    "runDate": day.to_key(),
                }),
                created_at: now,
            });

            let ancestors =
                resolve_ancestors(&self.repo, &mut tx, &position.owner, self.max_sponsor_depth)
                    .await?;
            let awards = commission_plan(
                accrual,
                &position.owner,
                &ancestors,
                &self.table,
                self.currency_scale,
            );

            for award in awards {
                let credit = self
                    .repo
                    .credit_commission(&mut tx, &award.owner, award.amount)
                    .await?;
                self.repo
                    .insert_earning(
                        &mut tx,
                        &NewEarning::commission(
                            award.owner.clone(),
                            position_id,
                            award.source_owner.clone(),
                            award.level,
                            award.amount,
                            now,
                        ),
                    )
                    .await?;
                commission_total = commission_total + award.amount;
                audit_entries.push(AuditEntry {
                    owner: award.owner.clone(),
                    action: AuditAction::CommissionCredit,
                    amount: award.amount,
                    balance_before: credit.balance_before,
                    balance_after: credit.balance_after,
                    metadata: serde_json::json!({
                        "positionId": position_id,
                        "sourceOwner": award.source_owner.as_str(),
                        "level": award.level,
                        "runDate": day.to_key(),
                    }),
                    created_at: now,
                });
            }
        }

        // Stamped even when the accrual rounds to zero: the position had its
        // settlement for this day.
        self.repo
            .mark_position_settled(&mut tx, position_id, day)
            .await?;

        tx.commit().await?;

        Ok(UnitOutcome::Settled {
            accrual,
            commission_total,
            audit_entries,
        })
    }

    /// Flush audit entries after the unit committed. Best-effort by design.
    async fn flush_audit(&self, entries: Vec<AuditEntry>) {
        for entry in entries {
            if let Err(e) = self.audit.record(&entry).await {
                warn!(owner = %entry.owner, action = %entry.action, error = %e,
                    "Audit write failed; settlement unaffected");
            }
        }
    }

    async fn persist_run_log(
        &self,
        summary: &RunSummary,
        run_id: Option<Uuid>,
        forced: bool,
        started_at: TimeMs,
    ) -> Result<(), SettlementError> {
        let finished_at = TimeMs::now();
        let detail = serde_json::json!({
            "trigger": if forced { "forced" } else { "scheduled" },
            "startedAtMs": started_at.as_ms(),
            "finishedAtMs": finished_at.as_ms(),
        });

        self.repo
            .insert_run_log(&NewRunLog {
                run_id,
                summary,
                detail,
                forced,
                created_at: finished_at,
            })
            .await
            .map_err(SettlementError::LogWrite)?;

        Ok(())
    }
}
