use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::Client;

use crate::controller::error::{BackoffConfig, Error, ErrorContext};
use crate::controller::orphan_pods_cleaner::OrphanPodsCleaner;
use crate::health::HealthState;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Orphan pod cleaner (no-op when cleanup is disabled)
    pub cleaner: Arc<dyn OrphanPodsCleaner>,
    /// Health state for metrics recording
    pub health_state: Option<Arc<HealthState>>,
    /// Requeue interval after a successful reconciliation
    pub reconcile_interval: Duration,
    pub backoff: BackoffConfig,
    /// Consecutive error tracking per cluster, keyed by `namespace/name`
    errors: Mutex<HashMap<String, ErrorContext>>,
}

impl Context {
    pub fn new(
        client: Client,
        cleaner: Arc<dyn OrphanPodsCleaner>,
        health_state: Option<Arc<HealthState>>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            client,
            cleaner,
            health_state,
            reconcile_interval,
            backoff: BackoffConfig::default(),
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed reconciliation and return the number of consecutive failures
    pub fn record_error(&self, key: &str, error: &Error) -> u32 {
        match self.errors.lock() {
            Ok(mut errors) => {
                let entry = errors.entry(key.to_string()).or_default();
                entry.record_error(error);
                entry.consecutive_errors
            }
            // A poisoned map only loses backoff history
            Err(_) => 1,
        }
    }

    /// Forget the error history of a cluster after a successful reconciliation
    pub fn reset_errors(&self, key: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.remove(key);
        }
    }
}
