pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use audit::{AuditEntry, AuditSink, DbAuditSink};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Earning, EarningKind, Money, OwnerId, Position, PositionStatus, RunDate, RunOutcome,
    RunSummary, TimeMs, Wallet,
};
pub use error::AppError;
pub use orchestration::Orchestrator;
