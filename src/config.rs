//! Operator configuration read from the environment

use std::time::Duration;

use crate::controller::error::{Error, Result};

/// Enables or disables orphan pod cleanup
pub const ORPHAN_POD_CLEANUP_ENV: &str = "ORPHAN_POD_CLEANUP";
/// Seconds between periodic reconciliations of a healthy cluster
pub const RECONCILE_INTERVAL_ENV: &str = "RECONCILE_INTERVAL_SECS";
/// Restricts all watches to a single namespace
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
pub const HEALTH_PORT_ENV: &str = "HEALTH_PORT";

const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEALTH_PORT: u16 = 8080;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Run the real orphan pod cleaner instead of the no-op one
    pub orphan_pod_cleanup: bool,
    pub reconcile_interval: Duration,
    /// `None` watches cluster-wide
    pub watch_namespace: Option<String>,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            orphan_pod_cleanup: true,
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            watch_namespace: None,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = get(ORPHAN_POD_CLEANUP_ENV) {
            config.orphan_pod_cleanup = parse_bool(ORPHAN_POD_CLEANUP_ENV, &value)?;
        }

        if let Some(value) = get(RECONCILE_INTERVAL_ENV) {
            let secs: u64 = value.parse().map_err(|_| {
                Error::InvalidConfig(format!(
                    "{} must be a number of seconds, got '{}'",
                    RECONCILE_INTERVAL_ENV, value
                ))
            })?;
            if secs == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be greater than zero",
                    RECONCILE_INTERVAL_ENV
                )));
            }
            config.reconcile_interval = Duration::from_secs(secs);
        }

        config.watch_namespace = get(WATCH_NAMESPACE_ENV);

        if let Some(value) = get(HEALTH_PORT_ENV) {
            config.health_port = value.parse().map_err(|_| {
                Error::InvalidConfig(format!(
                    "{} must be a port number, got '{}'",
                    HEALTH_PORT_ENV, value
                ))
            })?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
