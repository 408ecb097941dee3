//! # Rotation Clock
//!
//! Decides when time-based actions run: root credential rotation and
//! generated secret refresh. The controller never polls; whenever the
//! decision is "wait", the exact remaining duration is returned and handed
//! to the scheduler as the next reconcile deadline.
//!
//! Rotation fires ahead of the deadline (at >95% of the period) so a
//! credential is never observed expired; refresh fires at the full period.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Rotation runs once elapsed time exceeds this share of the period.
const ROTATION_THRESHOLD: f64 = 0.95;

/// Outcome of a clock evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDecision {
    /// The action is due now.
    RunNow,
    /// The action is due after this duration; requeue then.
    Wait(Duration),
    /// No period is configured and the action already ran: never again.
    Never,
}

/// Clock for one resource's rotation/refresh schedule.
#[derive(Debug, Clone, Copy)]
pub struct RotationClock {
    period: Option<Duration>,
}

impl RotationClock {
    #[must_use]
    pub fn new(period: Option<Duration>) -> Self {
        Self { period }
    }

    /// Rotation semantics: fire at >95% of the period.
    #[must_use]
    pub fn rotation_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ClockDecision {
        self.decide(last, now, ROTATION_THRESHOLD)
    }

    /// Refresh semantics: fire at the full period.
    #[must_use]
    pub fn refresh_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ClockDecision {
        self.decide(last, now, 1.0)
    }

    /// Deadline to hand the scheduler after the action just ran.
    #[must_use]
    pub fn next_after_run(&self) -> Option<Duration> {
        self.period
    }

    fn decide(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        threshold: f64,
    ) -> ClockDecision {
        let Some(last) = last else {
            // Never ran: run once. With a period the next deadline comes
            // from next_after_run; without one it never runs again.
            return ClockDecision::RunNow;
        };

        let Some(period) = self.period else {
            return ClockDecision::Never;
        };

        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        let ratio = elapsed.as_secs_f64() / period.as_secs_f64();

        if ratio > threshold || ratio >= 1.0 {
            ClockDecision::RunNow
        } else {
            // Remaining time to the full deadline, not the threshold: the
            // requeue lands on the deadline and the threshold check passes.
            ClockDecision::Wait(period.saturating_sub(elapsed))
        }
    }
}
