use std::path::Path;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::risk::RiskConfig;

pub const LOG_ENV: &str = "LIGHTHOUSE_LOG";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match std::env::var("LIGHTHOUSE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("invalid LIGHTHOUSE_MAX_CONNECTIONS: {value}"))?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Loads scorer thresholds from a JSON file; missing keys keep their defaults.
pub fn load_risk_config(path: Option<&Path>) -> anyhow::Result<RiskConfig> {
    let Some(path) = path else {
        return Ok(RiskConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read risk config {}", path.display()))?;
    parse_risk_config(&raw).with_context(|| format!("invalid risk config {}", path.display()))
}

pub fn parse_risk_config(raw: &str) -> anyhow::Result<RiskConfig> {
    let config: RiskConfig = serde_json::from_str(raw)?;
    if config.medium_threshold > config.high_threshold {
        anyhow::bail!(
            "medium_threshold ({}) must not exceed high_threshold ({})",
            config.medium_threshold,
            config.high_threshold
        );
    }
    Ok(config)
}

/// Logs go to stderr so command output on stdout stays pipeable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_risk_config(r#"{ "high_threshold": 0.8 }"#).unwrap();
        assert_eq!(config.high_threshold, 0.8);
        assert_eq!(config.medium_threshold, 0.4);
        assert_eq!(config.decline_weight, 0.3);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let err = parse_risk_config(r#"{ "medium_threshold": 0.9 }"#).unwrap_err();
        assert!(err.to_string().contains("medium_threshold"));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(load_risk_config(None).unwrap(), RiskConfig::default());
    }
}
