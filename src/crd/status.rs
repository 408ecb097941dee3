//! # Status Types
//!
//! Condition records shared by every resource kind, plus the plain status
//! used by kinds that track nothing beyond reconcile outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents the latest reconcile outcome for a resource.
///
/// `type` is `ReconcileSuccessful` or `ReconcileFailed`;
/// `observedGeneration` records which spec generation the outcome applies
/// to.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    /// "True", "False", or "Unknown"
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Status for kinds with no extra observed fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultResourceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
