//! Activity deadline enforcement
//!
//! Deadlines are checked whenever an instance is touched; there is no
//! background sweep in this crate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::add_duration;
use crate::serde_util::option_duration_millis;

/// Which deadline expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    /// Overall budget from first schedule to close
    ScheduleToClose,
    /// Budget for a single started attempt
    StartToClose,
}

impl std::fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScheduleToClose => write!(f, "schedule_to_close"),
            Self::StartToClose => write!(f, "start_to_close"),
        }
    }
}

/// Timeout configuration for activities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum time from first schedule to completion (None = unbounded)
    #[serde(with = "option_duration_millis", default)]
    pub schedule_to_close: Option<Duration>,

    /// Maximum time from start to completion of one attempt (None = unbounded)
    #[serde(with = "option_duration_millis", default)]
    pub start_to_close: Option<Duration>,
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule_to_close(mut self, timeout: Duration) -> Self {
        self.schedule_to_close = Some(timeout);
        self
    }

    pub fn with_start_to_close(mut self, timeout: Duration) -> Self {
        self.start_to_close = Some(timeout);
        self
    }

    /// Absolute schedule-to-close deadline for an instance first scheduled at `at`
    pub fn schedule_to_close_deadline(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule_to_close.map(|t| add_duration(at, t))
    }

    /// Absolute start-to-close deadline for an attempt started at `at`
    pub fn start_to_close_deadline(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.start_to_close.map(|t| add_duration(at, t))
    }
}

/// Absolute deadlines carried by an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub schedule_to_close: Option<DateTime<Utc>>,
    pub start_to_close: Option<DateTime<Utc>>,
}

impl Deadlines {
    /// First deadline that has passed at `now`, if any
    ///
    /// Schedule-to-close wins when both have expired.
    pub fn expired(&self, now: DateTime<Utc>) -> Option<TimeoutType> {
        if self.schedule_to_close.is_some_and(|d| now > d) {
            return Some(TimeoutType::ScheduleToClose);
        }
        if self.start_to_close.is_some_and(|d| now > d) {
            return Some(TimeoutType::StartToClose);
        }
        None
    }

    pub fn get(&self, kind: TimeoutType) -> Option<DateTime<Utc>> {
        match kind {
            TimeoutType::ScheduleToClose => self.schedule_to_close,
            TimeoutType::StartToClose => self.start_to_close,
        }
    }

    /// Time left before `kind` expires
    pub fn remaining(&self, kind: TimeoutType, now: DateTime<Utc>) -> Option<Duration> {
        self.get(kind)?.signed_duration_since(now).to_std().ok()
    }
}
