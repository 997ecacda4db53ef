use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Earning, EarningKind, Money, OwnerId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsQuery {
    pub owner: String,
    /// `ACCRUAL` or `COMMISSION`; omit for both.
    pub kind: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub owner: String,
    pub total_amount: String,
    pub count: i64,
    pub earnings: Vec<EarningDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningDto {
    pub kind: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    pub description: String,
    pub created_at_ms: i64,
}

pub async fn get_earnings(
    Query(params): Query<EarningsQuery>,
    State(state): State<AppState>,
) -> Result<Json<EarningsResponse>, AppError> {
    let owner = OwnerId::new(params.owner.clone());
    let kind = parse_kind(params.kind.as_deref())?;
    let (from_ms, to_ms) = time_range(params.from_ms, params.to_ms)?;

    let earnings = state
        .repo
        .query_earnings(&owner, kind, from_ms, to_ms)
        .await?;

    let mut total_amount = Money::zero();
    for e in &earnings {
        total_amount = total_amount + e.amount;
    }

    let count = earnings.len() as i64;
    let earnings = earnings.into_iter().map(earning_dto).collect();

    Ok(Json(EarningsResponse {
        owner: params.owner,
        total_amount: total_amount.to_canonical_string(),
        count,
        earnings,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub kind: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

/// CSV export of earnings across all owners, for daily financial summaries.
pub async fn export_earnings(
    Query(params): Query<ExportQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(params.kind.as_deref())?;
    let (from_ms, to_ms) = time_range(params.from_ms, params.to_ms)?;

    let earnings = state
        .repo
        .query_earnings_in_range(kind, from_ms, to_ms)
        .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "owner",
            "kind",
            "amount",
            "position_id",
            "source_owner",
            "level",
            "created_at_ms",
        ])
        .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;

    for e in &earnings {
        writer
            .write_record([
                e.owner.as_str().to_string(),
                e.kind.as_str().to_string(),
                e.amount.to_canonical_string(),
                e.position_id.map(|id| id.to_string()).unwrap_or_default(),
                e.source_owner
                    .as_ref()
                    .map(|o| o.as_str().to_string())
                    .unwrap_or_default(),
                e.level.map(|l| l.to_string()).unwrap_or_default(),
                e.created_at.as_ms().to_string(),
            ])
            .map_err(|err| AppError::Internal(format!("CSV write failed: {}", err)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        bytes,
    ))
}

fn parse_kind(raw: Option<&str>) -> Result<Option<EarningKind>, AppError> {
    match raw {
        None => Ok(None),
        Some(s) => EarningKind::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("kind must be ACCRUAL or COMMISSION".into())),
    }
}

fn time_range(from_ms: Option<i64>, to_ms: Option<i64>) -> Result<(i64, i64), AppError> {
    let from = from_ms.unwrap_or(0);
    let to = to_ms.unwrap_or(i64::MAX);
    if from > to {
        return Err(AppError::BadRequest("fromMs must be <= toMs".into()));
    }
    Ok((from, to))
}

fn earning_dto(e: Earning) -> EarningDto {
    EarningDto {
        kind: e.kind.as_str().to_string(),
        amount: e.amount.to_canonical_string(),
        position_id: e.position_id,
        source_owner: e.source_owner.map(|o| o.as_str().to_string()),
        level: e.level,
        description: e.description,
        created_at_ms: e.created_at.as_ms(),
    }
}
