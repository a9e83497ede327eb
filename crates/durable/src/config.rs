//! Engine, worker and metrics configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::reliability::RetryPolicy;
use crate::serde_util::duration_millis;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Attempts at a transition that keeps losing the version race
    pub max_conflict_retries: u32,

    /// Policy for schedule requests that do not carry one
    pub default_retry_policy: RetryPolicy,

    pub worker: WorkerConfig,

    pub metrics: RuntimeMetricsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 8,
            default_retry_policy: RetryPolicy::default(),
            worker: WorkerConfig::default(),
            metrics: RuntimeMetricsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `DURABLE_*` environment variables
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| parse_var::<u64, _>(&lookup, name);
        let millis = |name: &str| parse(name).map(Duration::from_millis);

        let policy = defaults.default_retry_policy.clone();
        let default_retry_policy = RetryPolicy {
            initial_interval: millis("DURABLE_RETRY_INITIAL_INTERVAL_MS")
                .unwrap_or(policy.initial_interval),
            backoff_coefficient: parse_var(&lookup, "DURABLE_RETRY_BACKOFF_COEFFICIENT")
                .unwrap_or(policy.backoff_coefficient),
            maximum_interval: millis("DURABLE_RETRY_MAXIMUM_INTERVAL_MS")
                .unwrap_or(policy.maximum_interval),
            maximum_attempts: parse("DURABLE_RETRY_MAXIMUM_ATTEMPTS")
                .map(|n| n as u32)
                .unwrap_or(policy.maximum_attempts),
            non_retryable_error_types: lookup("DURABLE_RETRY_NON_RETRYABLE_TYPES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(policy.non_retryable_error_types),
        };

        let worker = WorkerConfig {
            worker_id: lookup("DURABLE_WORKER_ID").unwrap_or(defaults.worker.worker_id),
            max_concurrency: parse("DURABLE_WORKER_MAX_CONCURRENCY")
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.worker.max_concurrency),
            shutdown_timeout: millis("DURABLE_WORKER_SHUTDOWN_TIMEOUT_MS")
                .unwrap_or(defaults.worker.shutdown_timeout),
        };

        let metrics = RuntimeMetricsConfig {
            report_interval: millis("DURABLE_METRICS_REPORT_INTERVAL_MS")
                .unwrap_or(defaults.metrics.report_interval),
            instance_id: lookup("DURABLE_INSTANCE_ID").unwrap_or(defaults.metrics.instance_id),
        };

        Self {
            max_conflict_retries: parse("DURABLE_MAX_CONFLICT_RETRIES")
                .map(|n| n as u32)
                .unwrap_or(defaults.max_conflict_retries),
            default_retry_policy,
            worker,
            metrics,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_metrics(mut self, metrics: RuntimeMetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Activity worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Maximum concurrent handler executions
    pub max_concurrency: usize,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            max_concurrency: 10,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Runtime metrics reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeMetricsConfig {
    /// How often process and runtime gauges are sampled
    #[serde(with = "duration_millis")]
    pub report_interval: Duration,

    /// Attached to every gauge as `instance.id`
    pub instance_id: String,
}

impl Default for RuntimeMetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(10),
            instance_id: Uuid::now_v7().to_string(),
        }
    }
}

impl RuntimeMetricsConfig {
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }
}

/// Read and parse one variable; unparsable values are ignored with a warning
fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
