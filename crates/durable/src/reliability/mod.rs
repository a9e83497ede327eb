//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Backoff evaluation for failed attempts
//! - [`TimeoutConfig`] / [`Deadlines`] - Schedule-to-close and start-to-close enforcement

mod retry;
mod timeout;

pub use retry::{RetryDecision, RetryPolicy, RetryPolicyError, StopReason};
pub use timeout::{Deadlines, TimeoutConfig, TimeoutType};
