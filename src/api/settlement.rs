use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{FailedItem, RunDate, RunOutcome, SettlementRunLog};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQuery {
    /// Bypass the daily gate (administrative re-run). Subject to the
    /// persisted minimum-interval throttle.
    pub forced: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunResponse {
    #[serde(rename_all = "camelCase")]
    Completed {
        date: String,
        processed: u64,
        skipped: u64,
        total_accrual: String,
        total_commission: String,
        failed_items: Vec<FailedItem>,
    },
    #[serde(rename_all = "camelCase")]
    AlreadyRun { date: String },
}

pub async fn run_settlement(
    Query(params): Query<RunQuery>,
    State(state): State<AppState>,
) -> Result<Json<RunResponse>, AppError> {
    let forced = params.forced.unwrap_or(false);
    let outcome = state.orchestrator.run_settlement(forced).await?;

    let response = match outcome {
        RunOutcome::Completed(summary) => RunResponse::Completed {
            date: summary.date.to_key(),
            processed: summary.processed,
            skipped: summary.skipped,
            total_accrual: summary.total_accrual.to_canonical_string(),
            total_commission: summary.total_commission.to_canonical_string(),
            failed_items: summary.failed_items,
        },
        RunOutcome::AlreadyRun { date } => RunResponse::AlreadyRun {
            date: date.to_key(),
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    /// Calendar date, `YYYY-MM-DD` (UTC).
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub date: String,
    pub already_run: bool,
}

pub async fn get_status(
    Query(params): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let date = RunDate::parse(&params.date)
        .map_err(|_| AppError::BadRequest("date must be YYYY-MM-DD".into()))?;

    let already_run = state.repo.run_exists(date).await?;

    Ok(Json(StatusResponse {
        date: date.to_key(),
        already_run,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogDto {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub date: String,
    pub processed: u64,
    pub skipped: u64,
    pub total_accrual: String,
    pub total_commission: String,
    pub failed_items: Vec<FailedItem>,
    pub forced: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsResponse {
    pub count: usize,
    pub runs: Vec<RunLogDto>,
}

pub async fn list_runs(
    Query(params): Query<RunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<RunsResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    let logs = state.repo.list_run_logs(limit, offset).await?;
    let runs: Vec<RunLogDto> = logs.into_iter().map(run_log_dto).collect();

    Ok(Json(RunsResponse {
        count: runs.len(),
        runs,
    }))
}

fn run_log_dto(log: SettlementRunLog) -> RunLogDto {
    RunLogDto {
        id: log.id,
        run_id: log.run_id.map(|u| u.to_string()),
        date: log.date.to_key(),
        processed: log.processed,
        skipped: log.skipped,
        total_accrual: log.total_accrual.to_canonical_string(),
        total_commission: log.total_commission.to_canonical_string(),
        failed_items: log.failed_items,
        forced: log.forced,
        created_at_ms: log.created_at.as_ms(),
    }
}
