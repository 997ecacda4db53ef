//! Earnings reporting and export endpoints.

use axum::http::StatusCode;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use yieldbook::api::{self, AppState};
use yieldbook::audit::DbAuditSink;
use yieldbook::config::Config;
use yieldbook::db::{init_db, NewPosition};
use yieldbook::domain::{Money, OwnerId, TimeMs};
use yieldbook::orchestration::Orchestrator;
use yieldbook::Repository;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    orchestrator: Arc<Orchestrator>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool.clone()));

    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), db_path);
    let config = Config::from_env_map(env).unwrap();

    let audit = Arc::new(DbAuditSink::new(pool));
    let orchestrator = Arc::new(Orchestrator::new(repo.clone(), audit, &config));
    let app = api::create_router(AppState::new(repo.clone(), orchestrator.clone()));

    TestApp {
        app,
        repo,
        orchestrator,
        _temp: temp_dir,
    }
}

/// Settle a referred position so both earning kinds exist.
async fn seed_settled_day(test_app: &TestApp) {
    test_app
        .repo
        .set_sponsor(&OwnerId::new("payer"), &OwnerId::new("sponsor"))
        .await
        .unwrap();
    test_app
        .repo
        .insert_position(&NewPosition::active(
            OwnerId::new("payer"),
            Money::from_str("1000").unwrap(),
            Money::from_str("1.5").unwrap(),
            TimeMs::new(0),
        ))
        .await
        .unwrap();

    test_app.orchestrator.run_settlement(false).await.unwrap();
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, body)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_earnings_listing_with_totals() {
    let test_app = setup_test_app().await;
    seed_settled_day(&test_app).await;

    let (status, body) = get_json(test_app.app.clone(), "/v1/earnings?owner=payer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner"], "payer");
    assert_eq!(body["count"], 1);
    assert_eq!(body["totalAmount"], "15");

    let earning = &body["earnings"][0];
    assert_eq!(earning["kind"], "ACCRUAL");
    assert_eq!(earning["amount"], "15");
    assert!(earning["positionId"].is_i64());
    assert!(earning["description"].as_str().unwrap().contains("position"));

    let (status, body) = get_json(test_app.app, "/v1/earnings?owner=sponsor").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalAmount"], "1.5");
    let earning = &body["earnings"][0];
    assert_eq!(earning["kind"], "COMMISSION");
    assert_eq!(earning["sourceOwner"], "payer");
    assert_eq!(earning["level"], 1);
}

#[tokio::test]
async fn test_earnings_kind_filter() {
    let test_app = setup_test_app().await;
    seed_settled_day(&test_app).await;

    let (status, body) = get_json(
        test_app.app.clone(),
        "/v1/earnings?owner=payer&kind=COMMISSION",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = get_json(test_app.app, "/v1/earnings?owner=payer&kind=BONUS").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_earnings_rejects_inverted_range() {
    let test_app = setup_test_app().await;

    let (status, _) = get_json(
        test_app.app,
        "/v1/earnings?owner=payer&fromMs=2000&toMs=1000",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_csv_export() {
    let test_app = setup_test_app().await;
    seed_settled_day(&test_app).await;

    let (status, body) = get(test_app.app, "/v1/earnings/export").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "owner,kind,amount,position_id,source_owner,level,created_at_ms"
    );

    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.contains("payer,ACCRUAL,15")));
    assert!(rows.iter().any(|r| r.contains("sponsor,COMMISSION,1.5")));
}

#[tokio::test]
async fn test_csv_export_kind_filter() {
    let test_app = setup_test_app().await;
    seed_settled_day(&test_app).await;

    let (status, body) = get(test_app.app, "/v1/earnings/export?kind=ACCRUAL").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let rows: Vec<&str> = text.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("ACCRUAL"));
}
