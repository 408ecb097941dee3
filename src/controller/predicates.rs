//! # Scheduling Predicates
//!
//! Decides whether a change event warrants touching the backend at all.
//! A spec edit (generation change) always reconciles; a pending failure
//! always retries; a due schedule always runs. Beyond that, the only
//! source of unforced periodic reconciliation is the optional drift
//! detection interval, which is off by default to avoid needless backend
//! calls.
//!
//! The policy is constructed once at wiring time and injected into every
//! reconciler; there is no mutable scheduling state anywhere else.

use chrono::{DateTime, Utc};
use std::time::Duration;

use kube_runtime::controller::Action;

use super::clock::ClockDecision;

/// Immutable scheduling configuration, set once at process start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncPolicy {
    drift_detection_interval: Option<Duration>,
}

/// What a reconcile event resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed(ProceedReason),
    /// Nothing to do; requeue at the next known deadline, or sleep until
    /// the next watch event when there is none.
    Skip { requeue_after: Option<Duration> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedReason {
    /// The spec generation moved past the last observed generation.
    SpecChange,
    /// The last recorded outcome is a failure; the requeue is a retry.
    RetryAfterFailure,
    /// A rotation/refresh deadline is due.
    ScheduleDue,
    /// The drift detection interval elapsed since the last success.
    DriftDetection,
}

impl ProceedReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProceedReason::SpecChange => "spec-change",
            ProceedReason::RetryAfterFailure => "retry-after-failure",
            ProceedReason::ScheduleDue => "schedule-due",
            ProceedReason::DriftDetection => "drift-detection",
        }
    }
}

/// Inputs to one predicate evaluation, all taken from the object itself.
#[derive(Debug, Clone, Copy)]
pub struct EvaluateInput {
    pub generation: Option<i64>,
    pub observed_generation: Option<i64>,
    pub last_success: Option<DateTime<Utc>>,
    pub retrying_failure: bool,
    /// Clock decision for kinds with a rotation/refresh schedule.
    pub schedule: Option<ClockDecision>,
    pub now: DateTime<Utc>,
}

impl SyncPolicy {
    #[must_use]
    pub fn new(drift_detection_interval: Option<Duration>) -> Self {
        Self {
            drift_detection_interval,
        }
    }

    #[must_use]
    pub fn evaluate(&self, input: &EvaluateInput) -> Decision {
        if input.generation != input.observed_generation {
            return Decision::Proceed(ProceedReason::SpecChange);
        }
        if input.retrying_failure {
            return Decision::Proceed(ProceedReason::RetryAfterFailure);
        }
        if matches!(input.schedule, Some(ClockDecision::RunNow)) {
            return Decision::Proceed(ProceedReason::ScheduleDue);
        }

        let drift_remaining = self.drift_remaining(input.last_success, input.now);
        if drift_remaining == Some(Duration::ZERO) {
            return Decision::Proceed(ProceedReason::DriftDetection);
        }

        let schedule_remaining = match input.schedule {
            Some(ClockDecision::Wait(d)) => Some(d),
            _ => None,
        };
        Decision::Skip {
            requeue_after: min_deadline(drift_remaining, schedule_remaining),
        }
    }

    /// Time until the drift detection interval elapses, `Duration::ZERO`
    /// when it already has, `None` when drift detection is off or there
    /// was never a success to measure from.
    fn drift_remaining(
        &self,
        last_success: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let interval = self.drift_detection_interval?;
        let last = last_success?;
        let age = (now - last).to_std().unwrap_or(Duration::ZERO);
        Some(interval.saturating_sub(age))
    }

    /// Fallback action after a successful reconcile that requested no
    /// deadline of its own.
    #[must_use]
    pub fn default_requeue(&self) -> Action {
        match self.drift_detection_interval {
            Some(interval) => Action::requeue(interval),
            None => Action::await_change(),
        }
    }
}

fn min_deadline(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
