//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group for all custom resources and finalizer tokens
pub const API_GROUP: &str = "vault.microscaler.io";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Minimum backoff for failed reconciliations (minutes)
pub const BACKOFF_MIN_MINUTES: u64 = 1;

/// Maximum backoff for failed reconciliations (minutes)
pub const BACKOFF_MAX_MINUTES: u64 = 10;

/// Default auth engine mount used for the Kubernetes JWT login exchange
pub const DEFAULT_AUTH_MOUNT: &str = "kubernetes";

/// Default path of the projected service account token used as the
/// workload identity credential for Vault logins
pub const DEFAULT_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Environment variable naming the Vault server address (required)
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";

/// Environment variable naming the default Vault namespace (optional)
pub const ENV_VAULT_NAMESPACE: &str = "VAULT_NAMESPACE";

/// Environment variable overriding the service account token path
pub const ENV_VAULT_JWT_PATH: &str = "VAULT_JWT_PATH";

/// Environment variable enabling drift detection, as a Vault-style
/// duration ("30m", "1h"). Unset means drift detection is off: resources
/// are only reconciled on spec changes, failures, and scheduled deadlines.
pub const ENV_DRIFT_DETECTION_INTERVAL: &str = "DRIFT_DETECTION_INTERVAL";

/// Environment variable overriding the metrics/probe server port
pub const ENV_METRICS_PORT: &str = "METRICS_PORT";
