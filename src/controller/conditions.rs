//! # Status Condition Bookkeeping
//!
//! Helpers for recording reconcile outcomes as status conditions,
//! following the Kubernetes API conventions: `lastTransitionTime` moves
//! only when the condition's status actually flips.

use chrono::{DateTime, Utc};

use crate::crd::Condition;

pub const CONDITION_TRUE: &str = "True";

/// Condition type recorded after a successful reconcile.
pub const CONDITION_RECONCILE_SUCCESSFUL: &str = "ReconcileSuccessful";

/// Condition type recorded after a failed reconcile.
pub const CONDITION_RECONCILE_FAILED: &str = "ReconcileFailed";

/// Build a `ReconcileSuccessful` condition for the given generation.
#[must_use]
pub fn successful(observed_generation: Option<i64>, message: &str, now: DateTime<Utc>) -> Condition {
    Condition {
        r#type: CONDITION_RECONCILE_SUCCESSFUL.to_string(),
        status: CONDITION_TRUE.to_string(),
        last_transition_time: Some(now.to_rfc3339()),
        reason: Some("ReconciliationSucceeded".to_string()),
        message: Some(message.to_string()),
        observed_generation,
    }
}

/// Build a `ReconcileFailed` condition carrying the error message.
#[must_use]
pub fn failed(observed_generation: Option<i64>, message: &str, now: DateTime<Utc>) -> Condition {
    Condition {
        r#type: CONDITION_RECONCILE_FAILED.to_string(),
        status: CONDITION_TRUE.to_string(),
        last_transition_time: Some(now.to_rfc3339()),
        reason: Some("ReconciliationFailed".to_string()),
        message: Some(message.to_string()),
        observed_generation,
    }
}

/// Record a successful outcome: upsert `ReconcileSuccessful` and clear any
/// stale `ReconcileFailed` entry.
pub fn record_success(conditions: &mut Vec<Condition>, new: Condition) {
    conditions.retain(|c| c.r#type != CONDITION_RECONCILE_FAILED);
    upsert(conditions, new);
}

/// Record a failed outcome: upsert `ReconcileFailed`. The last successful
/// condition is kept so its age stays visible to drift detection.
pub fn record_failure(conditions: &mut Vec<Condition>, new: Condition) {
    upsert(conditions, new);
}

/// Replace the condition of the same type, preserving the transition time
/// when the status did not change.
fn upsert(conditions: &mut Vec<Condition>, mut new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status == new.status {
            new.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = new;
    } else {
        conditions.push(new);
    }
}

/// Transition time of the last successful reconcile, if any.
#[must_use]
pub fn last_successful_time(conditions: &[Condition]) -> Option<DateTime<Utc>> {
    conditions
        .iter()
        .find(|c| c.r#type == CONDITION_RECONCILE_SUCCESSFUL && c.status == CONDITION_TRUE)
        .and_then(|c| c.last_transition_time.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Whether the resource was ever successfully reconciled. Cleanup is
/// skipped for resources that never made it into the backend.
#[must_use]
pub fn was_created(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| c.r#type == CONDITION_RECONCILE_SUCCESSFUL && c.status == CONDITION_TRUE)
}

/// Whether the latest recorded outcome is a failure awaiting retry.
#[must_use]
pub fn has_failed_condition(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| c.r#type == CONDITION_RECONCILE_FAILED && c.status == CONDITION_TRUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_clears_failure() {
        let now = Utc::now();
        let mut conditions = vec![failed(Some(1), "boom", now)];
        record_success(&mut conditions, successful(Some(2), "ok", now));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].r#type, CONDITION_RECONCILE_SUCCESSFUL);
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn failure_keeps_last_success() {
        let now = Utc::now();
        let mut conditions = vec![successful(Some(1), "ok", now)];
        record_failure(&mut conditions, failed(Some(2), "boom", now));
        assert_eq!(conditions.len(), 2);
        assert!(was_created(&conditions));
        assert!(has_failed_condition(&conditions));
    }

    #[test]
    fn upsert_preserves_transition_time_when_status_unchanged() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(60);
        let mut conditions = vec![successful(Some(1), "ok", t0)];
        record_success(&mut conditions, successful(Some(2), "still ok", t1));
        assert_eq!(conditions[0].last_transition_time, Some(t0.to_rfc3339()));
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn last_successful_time_parses_rfc3339() {
        let now = Utc::now();
        let conditions = vec![successful(Some(1), "ok", now)];
        let parsed = last_successful_time(&conditions).unwrap();
        assert!((parsed - now).num_seconds().abs() <= 1);
    }
}
