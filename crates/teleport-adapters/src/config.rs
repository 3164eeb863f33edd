use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use teleport_core::OrchestratorConfig;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {name}={value}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct TeleportAdapterConfig {
    pub source_rpc_url: Option<String>,
    pub destination_rpc_url: Option<String>,
    pub rpc_timeout_ms: u64,
    pub oracle_api_url: String,
    pub oracle_poll_interval_ms: u64,
    pub oracle_threshold: usize,
    pub oracle_channel_capacity: usize,
    pub max_receipt_attempts: u32,
    pub receipt_backoff_ms: u64,
    pub max_relay_attempts: u32,
    pub relay_expiry_secs: u64,
    pub retry_delay_ms: u64,
}

impl Default for TeleportAdapterConfig {
    fn default() -> Self {
        Self {
            source_rpc_url: None,
            destination_rpc_url: None,
            rpc_timeout_ms: 15_000,
            oracle_api_url: "http://127.0.0.1:8080/".to_owned(),
            oracle_poll_interval_ms: 5_000,
            oracle_threshold: 1,
            oracle_channel_capacity: 16,
            max_receipt_attempts: 10,
            receipt_backoff_ms: 1_000,
            max_relay_attempts: 2,
            relay_expiry_secs: 60 * 60,
            retry_delay_ms: 2_000,
        }
    }
}

impl TeleportAdapterConfig {
    /// Reads `TELEPORT_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("TELEPORT_SOURCE_RPC_URL") {
            config.source_rpc_url = Some(url);
        }
        if let Some(url) = var("TELEPORT_DESTINATION_RPC_URL") {
            config.destination_rpc_url = Some(url);
        }
        if let Some(url) = var("TELEPORT_ORACLE_API_URL") {
            config.oracle_api_url = url;
        }
        config.rpc_timeout_ms = parse(&var, "TELEPORT_RPC_TIMEOUT_MS", config.rpc_timeout_ms)?;
        config.oracle_poll_interval_ms = parse(
            &var,
            "TELEPORT_ORACLE_POLL_INTERVAL_MS",
            config.oracle_poll_interval_ms,
        )?;
        config.oracle_threshold =
            parse(&var, "TELEPORT_ORACLE_THRESHOLD", config.oracle_threshold)?;
        config.oracle_channel_capacity = parse(
            &var,
            "TELEPORT_ORACLE_CHANNEL_CAPACITY",
            config.oracle_channel_capacity,
        )?;
        config.max_receipt_attempts = parse(
            &var,
            "TELEPORT_MAX_RECEIPT_ATTEMPTS",
            config.max_receipt_attempts,
        )?;
        config.receipt_backoff_ms =
            parse(&var, "TELEPORT_RECEIPT_BACKOFF_MS", config.receipt_backoff_ms)?;
        config.max_relay_attempts =
            parse(&var, "TELEPORT_MAX_RELAY_ATTEMPTS", config.max_relay_attempts)?;
        config.relay_expiry_secs =
            parse(&var, "TELEPORT_RELAY_EXPIRY_SECS", config.relay_expiry_secs)?;
        config.retry_delay_ms = parse(&var, "TELEPORT_RETRY_DELAY_MS", config.retry_delay_ms)?;

        if config.oracle_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "TELEPORT_ORACLE_CHANNEL_CAPACITY",
                value: "0".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        Ok(config)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn oracle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.oracle_poll_interval_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_receipt_attempts: self.max_receipt_attempts,
            receipt_backoff_unit: Duration::from_millis(self.receipt_backoff_ms),
            max_relay_attempts: self.max_relay_attempts,
            relay_expiry: Duration::from_secs(self.relay_expiry_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..OrchestratorConfig::default()
        }
    }
}

fn parse<T, V>(var: &V, name: &'static str, fallback: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(fallback),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn unset_and_blank_variables_keep_defaults() {
        let config =
            TeleportAdapterConfig::from_lookup(lookup(&[("TELEPORT_SOURCE_RPC_URL", "  ")]))
                .expect("config");
        assert_eq!(config.source_rpc_url, None);
        assert_eq!(config.max_relay_attempts, 2);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn overrides_flow_into_orchestrator_config() {
        let config = TeleportAdapterConfig::from_lookup(lookup(&[
            ("TELEPORT_DESTINATION_RPC_URL", "http://goerli.invalid"),
            ("TELEPORT_MAX_RECEIPT_ATTEMPTS", "4"),
            ("TELEPORT_RECEIPT_BACKOFF_MS", " 250 "),
            ("TELEPORT_MAX_RELAY_ATTEMPTS", "1"),
        ]))
        .expect("config");
        assert_eq!(
            config.destination_rpc_url.as_deref(),
            Some("http://goerli.invalid")
        );
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.max_receipt_attempts, 4);
        assert_eq!(orchestrator.receipt_backoff_unit, Duration::from_millis(250));
        assert_eq!(orchestrator.max_relay_attempts, 1);
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = TeleportAdapterConfig::from_lookup(lookup(&[(
            "TELEPORT_ORACLE_THRESHOLD",
            "two",
        )]))
        .expect_err("not a number");
        let ConfigError::Invalid { name, value, .. } = err;
        assert_eq!(name, "TELEPORT_ORACLE_THRESHOLD");
        assert_eq!(value, "two");
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let err = TeleportAdapterConfig::from_lookup(lookup(&[(
            "TELEPORT_ORACLE_CHANNEL_CAPACITY",
            "0",
        )]))
        .expect_err("zero capacity");
        assert!(err.to_string().contains("TELEPORT_ORACLE_CHANNEL_CAPACITY"));
    }
}
