use crate::domain::Money;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Commission percentage per referral level, level 1 first. The table's
    /// length is the deepest level that pays.
    pub commission_level_percents: Vec<Money>,
    /// Hard bound on sponsor-chain traversal. Always enforced, so a cyclic
    /// or malformed sponsor graph cannot loop the resolver.
    pub max_sponsor_depth: u32,
    /// Decimal places of the ledger's minimum currency unit.
    pub currency_scale: u32,
    /// Minimum seconds between administratively forced runs.
    pub forced_run_min_interval_secs: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let commission_level_percents = parse_commission_levels(
            env_map
                .get("COMMISSION_LEVEL_PERCENTS")
                .map(|s| s.as_str())
                .unwrap_or("10,5,2"),
        )?;

        let max_sponsor_depth = env_map
            .get("MAX_SPONSOR_DEPTH")
            .map(|s| s.as_str())
            .unwrap_or("10")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MAX_SPONSOR_DEPTH".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;
        if max_sponsor_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_SPONSOR_DEPTH".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let currency_scale = env_map
            .get("CURRENCY_SCALE")
            .map(|s| s.as_str())
            .unwrap_or("2")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CURRENCY_SCALE".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;
        if currency_scale > 8 {
            return Err(ConfigError::InvalidValue(
                "CURRENCY_SCALE".to_string(),
                "must be at most 8".to_string(),
            ));
        }

        let forced_run_min_interval_secs = env_map
            .get("FORCED_RUN_MIN_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("3600")
            .parse::<i64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FORCED_RUN_MIN_INTERVAL_SECS".to_string(),
                    "must be a valid i64".to_string(),
                )
            })?;
        if forced_run_min_interval_secs < 0 {
            return Err(ConfigError::InvalidValue(
                "FORCED_RUN_MIN_INTERVAL_SECS".to_string(),
                "must be non-negative".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            commission_level_percents,
            max_sponsor_depth,
            currency_scale,
            forced_run_min_interval_secs,
        })
    }
}

fn parse_commission_levels(raw: &str) -> Result<Vec<Money>, ConfigError> {
    let mut percents = Vec::new();
    for (i, part) in raw.split(',').enumerate() {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let percent = Money::from_str(trimmed).map_err(|_| {
            ConfigError::InvalidValue(
                "COMMISSION_LEVEL_PERCENTS".to_string(),
                format!("level {} entry {:?} is not a decimal", i + 1, trimmed),
            )
        })?;
        if percent.is_negative() {
            return Err(ConfigError::InvalidValue(
                "COMMISSION_LEVEL_PERCENTS".to_string(),
                format!("level {} entry {:?} is negative", i + 1, trimmed),
            ));
        }
        percents.push(percent);
    }
    Ok(percents)
}
