//! Error types for the TidbCluster controller

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix where they wrap another error type.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Cache not ready: {0}")]
    CacheNotReady(String),

    #[error("Failed to delete pod {namespace}/{pod}: {source}")]
    PodDeletion {
        namespace: String,
        pod: String,
        #[source]
        source: kube::Error,
    },
}

impl Error {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(e) | Error::PodDeletion { source: e, .. } => is_api_code(e, 404),
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) | Error::PodDeletion { source: e, .. } => is_retryable_kube_error(e),
            // The reflector may still be syncing
            Error::CacheNotReady(_) => true,
            // The cluster or operator must be fixed by hand
            Error::MissingObjectKey(_) => false,
            Error::InvalidConfig(_) => false,
            Error::InvalidSelector(_) => false,
        }
    }
}

fn is_api_code(e: &kube::Error, code: u16) -> bool {
    matches!(e, kube::Error::Api(api_err) if api_err.code == code)
}

fn is_retryable_kube_error(e: &kube::Error) -> bool {
    match e {
        kube::Error::Api(api_err) => {
            // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
            let code = api_err.code;
            if (400..500).contains(&code) {
                return code == 409 || code == 429;
            }
            // 5xx errors are retryable
            true
        }
        // Network and other errors are retryable
        _ => true,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponent capped so the product stays finite
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT) as i32;
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention
            self.max_delay
        }
    }
}

/// Context for tracking error state during reconciliation
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    /// Number of consecutive errors
    pub consecutive_errors: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ErrorContext {
    /// Record an error
    pub fn record_error(&mut self, error: &Error) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    /// Reset error tracking (called on successful reconciliation)
    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
    }
}
