//! Attempt state machine
//!
//! Every transition mutates an [`ActivityInstance`] in place and registers
//! the side effects it implies (dispatch an attempt, arm or cancel a
//! backoff timer) on the caller's [`EffectLedger`]. Nothing touches a
//! collaborator until the ledger commits.
//!
//! ```text
//!             schedule            start               complete
//!   (new) ───────────▶ Scheduled ───────▶ Started ───────────▶ Completed
//!                        ▲  │ pause          │ fail
//!              timer/    │  ▼                ├── retryable ──▶ Scheduled (+timer)
//!              unpause   Paused              └── exhausted ──▶ Failed
//! ```
//!
//! `cancel` and deadline expiry lead to `Cancelled` and `TimedOut` from any
//! non-terminal status.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::collaborators::{Collaborators, DispatchTask};
use super::instance::{ActivityInstance, ActivityStatus, FailureDetail, TimerToken};
use crate::clock::{add_duration, elapsed_between};
use crate::effect::EffectLedger;
use crate::reliability::{RetryDecision, StopReason, TimeoutType};

/// Control or lifecycle operation applied to an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Schedule,
    Start,
    Complete,
    Fail,
    Pause,
    Unpause,
    Reset,
    Cancel,
    AttemptDue,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Schedule => "schedule",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Reset => "reset",
            Self::Cancel => "cancel",
            Self::AttemptDue => "attempt_due",
        };
        f.write_str(name)
    }
}

/// A transition that the instance's current state does not allow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {operation} activity in status {status}")]
    InvalidState {
        operation: Operation,
        status: ActivityStatus,
    },

    #[error("stale dispatch: task stamp {task} does not match current stamp {current}")]
    StaleDispatch { task: u32, current: u32 },
}

/// Result of reporting a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Next attempt scheduled after `delay`
    Retrying { attempt: u32, delay: Duration },

    /// Instance is now `Failed`
    Exhausted(StopReason),
}

/// Result of a backoff timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The attempt was dispatched
    Dispatched,

    /// Nothing to do; the instance state explains why
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Token superseded by a reset, pause or later failure
    Stale,
    Paused,
    InFlight,
    Terminal,
}

/// Transition context for one instance within one unit of work
pub struct AttemptMachine<'a> {
    instance: &'a mut ActivityInstance,
    effects: &'a mut EffectLedger,
    collaborators: &'a Collaborators,
    now: DateTime<Utc>,
}

impl<'a> AttemptMachine<'a> {
    pub fn new(
        instance: &'a mut ActivityInstance,
        effects: &'a mut EffectLedger,
        collaborators: &'a Collaborators,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance,
            effects,
            collaborators,
            now,
        }
    }

    pub fn instance(&self) -> &ActivityInstance {
        self.instance
    }

    /// Move to `TimedOut` if a deadline has passed
    pub fn enforce_deadlines(&mut self) -> Option<TimeoutType> {
        if self.instance.is_terminal() {
            return None;
        }
        let kind = self.instance.deadlines.expired(self.now)?;

        self.cancel_timer();
        self.instance.status = ActivityStatus::TimedOut;
        self.instance.timeout_type = Some(kind);
        self.instance.backoff_until = None;
        self.touch();
        debug!(key = %self.instance.key, timeout = %kind, "activity timed out");
        Some(kind)
    }

    /// Make the current attempt eligible to run
    ///
    /// A paused instance records the decision without dispatching.
    pub fn schedule(&mut self) -> Result<(), TransitionError> {
        self.require(
            Operation::Schedule,
            &[ActivityStatus::Scheduled, ActivityStatus::Paused],
        )?;
        self.cancel_timer();
        self.instance.backoff_until = None;
        if self.instance.paused {
            self.instance.status = ActivityStatus::Paused;
        } else {
            self.instance.status = ActivityStatus::Scheduled;
            self.dispatch();
        }
        self.touch();
        Ok(())
    }

    /// A worker picked up `attempt` carrying `stamp`
    pub fn start(&mut self, stamp: u32) -> Result<(), TransitionError> {
        self.require(Operation::Start, &[ActivityStatus::Scheduled])?;
        if stamp != self.instance.stamp || self.instance.pending_timer.is_some() {
            return Err(TransitionError::StaleDispatch {
                task: stamp,
                current: self.instance.stamp,
            });
        }

        self.instance.status = ActivityStatus::Started;
        self.instance.last_started_at = Some(self.now);
        self.instance.deadlines.start_to_close =
            self.instance.timeouts.start_to_close_deadline(self.now);
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
        self.require(Operation::Complete, &[ActivityStatus::Started])?;
        self.instance.status = ActivityStatus::Completed;
        self.instance.result = Some(result);
        self.instance.deadlines.start_to_close = None;
        self.touch();
        Ok(())
    }

    /// Record a failed attempt and consult the retry policy
    pub fn fail(&mut self, failure: FailureDetail) -> Result<FailOutcome, TransitionError> {
        self.require(Operation::Fail, &[ActivityStatus::Started])?;

        let retryable = !failure.non_retryable
            && self
                .instance
                .retry_policy
                .should_retry(failure.error_type.as_deref());
        self.instance.last_failure = Some(failure);
        self.instance.deadlines.start_to_close = None;

        let next_attempt = self.instance.attempt.saturating_add(1);
        let decision = if retryable {
            self.instance.retry_policy.evaluate(
                next_attempt,
                elapsed_between(self.instance.first_scheduled_at, self.now),
                self.instance.timeouts.schedule_to_close,
            )
        } else {
            RetryDecision::Stop(StopReason::NonRetryable)
        };

        let outcome = match decision {
            RetryDecision::Backoff(delay) => {
                self.instance.attempt = next_attempt;
                self.instance.status = if self.instance.paused {
                    ActivityStatus::Paused
                } else {
                    ActivityStatus::Scheduled
                };
                self.arm_timer(delay);
                FailOutcome::Retrying {
                    attempt: next_attempt,
                    delay,
                }
            }
            RetryDecision::Stop(reason) => {
                self.cancel_timer();
                self.instance.status = ActivityStatus::Failed;
                self.instance.backoff_until = None;
                FailOutcome::Exhausted(reason)
            }
        };
        self.touch();
        Ok(outcome)
    }

    /// Suppress scheduling; idempotent
    ///
    /// A running attempt is unaffected. Its completion is still accepted and
    /// a failure still computes the next retry, which waits for unpause.
    /// Returns `false` when the instance was already paused.
    pub fn pause(&mut self) -> Result<bool, TransitionError> {
        self.require_live(Operation::Pause)?;
        if self.instance.paused {
            return Ok(false);
        }

        self.instance.paused = true;
        if self.instance.status == ActivityStatus::Scheduled {
            self.instance.status = ActivityStatus::Paused;
            self.cancel_timer();
        }
        self.touch();
        Ok(true)
    }

    /// Clear the pause flag and resume the pending scheduling decision
    pub fn unpause(&mut self) -> Result<(), TransitionError> {
        self.require_live(Operation::Unpause)?;
        if !self.instance.paused {
            return Err(self.invalid(Operation::Unpause));
        }

        self.instance.paused = false;
        if self.instance.status == ActivityStatus::Paused {
            self.instance.status = ActivityStatus::Scheduled;
            let remaining = self
                .instance
                .backoff_until
                .map(|until| elapsed_between(self.now, until))
                .unwrap_or(Duration::ZERO);

            if remaining.is_zero() {
                self.schedule()?;
            } else if self.instance.pending_timer.is_none() {
                self.arm_timer(remaining);
            }
        }
        self.touch();
        Ok(())
    }

    /// Restart the attempt series from attempt 1
    ///
    /// A running attempt keeps running; only the next scheduling decision
    /// counts from 1. With `keep_paused` a paused instance stays paused; on
    /// an instance that is not paused the flag has no effect and attempt 1
    /// is dispatched as with a plain reset.
    pub fn reset(&mut self, keep_paused: bool) -> Result<(), TransitionError> {
        self.require_live(Operation::Reset)?;

        self.instance.attempt = 1;
        self.instance.last_failure = None;
        self.instance.backoff_until = None;
        self.cancel_timer();

        let stay_paused = keep_paused && self.instance.paused;
        if !stay_paused {
            self.instance.paused = false;
        }

        match self.instance.status {
            ActivityStatus::Started => {}
            _ if stay_paused => self.instance.status = ActivityStatus::Paused,
            _ => {
                self.instance.status = ActivityStatus::Scheduled;
                self.schedule()?;
            }
        }
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.require_live(Operation::Cancel)?;
        self.cancel_timer();
        self.instance.status = ActivityStatus::Cancelled;
        self.instance.backoff_until = None;
        self.instance.deadlines.start_to_close = None;
        self.touch();
        Ok(())
    }

    /// A backoff timer fired
    ///
    /// Only the instance's current token schedules anything. Firing on a
    /// paused instance consumes the token; unpause resumes from there.
    pub fn attempt_due(&mut self, token: TimerToken) -> TimerOutcome {
        if self.instance.is_terminal() {
            return TimerOutcome::Ignored(IgnoreReason::Terminal);
        }
        if self.instance.pending_timer != Some(token) {
            return TimerOutcome::Ignored(IgnoreReason::Stale);
        }
        if self.instance.in_flight() {
            return TimerOutcome::Ignored(IgnoreReason::InFlight);
        }

        self.instance.pending_timer = None;
        if self.instance.paused {
            self.touch();
            return TimerOutcome::Ignored(IgnoreReason::Paused);
        }

        self.instance.backoff_until = None;
        self.instance.status = ActivityStatus::Scheduled;
        self.dispatch();
        self.touch();
        TimerOutcome::Dispatched
    }

    fn require(
        &self,
        operation: Operation,
        allowed: &[ActivityStatus],
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.instance.status) {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn require_live(&self, operation: Operation) -> Result<(), TransitionError> {
        if self.instance.is_terminal() {
            Err(self.invalid(operation))
        } else {
            Ok(())
        }
    }

    fn invalid(&self, operation: Operation) -> TransitionError {
        TransitionError::InvalidState {
            operation,
            status: self.instance.status,
        }
    }

    fn touch(&mut self) {
        self.instance.updated_at = self.now;
    }

    fn dispatch(&mut self) {
        self.instance.stamp = self.instance.stamp.wrapping_add(1);
        let task = DispatchTask {
            key: self.instance.key.clone(),
            activity_type: self.instance.activity_type.clone(),
            input: self.instance.input.clone(),
            attempt: self.instance.attempt,
            stamp: self.instance.stamp,
        };
        let dispatcher = self.collaborators.dispatcher.clone();
        self.effects
            .on_commit(move || dispatcher.enqueue(task).map_err(Into::into));
    }

    fn arm_timer(&mut self, delay: Duration) {
        self.cancel_timer();
        let token = TimerToken::new();
        let fire_at = add_duration(self.now, delay);
        self.instance.pending_timer = Some(token);
        self.instance.backoff_until = Some(fire_at);

        let key = self.instance.key.clone();
        let timers = self.collaborators.timers.clone();
        self.effects
            .on_commit(move || timers.arm(&key, token, fire_at).map_err(Into::into));
    }

    fn cancel_timer(&mut self) {
        if let Some(token) = self.instance.pending_timer.take() {
            let timers = self.collaborators.timers.clone();
            self.effects
                .on_commit(move || timers.cancel(token).map_err(Into::into));
        }
    }
}
