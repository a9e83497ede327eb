//! Periodic process and runtime health reporter

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::metrics::Gauge;
use opentelemetry::{global, KeyValue};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RuntimeMetricsConfig;

const METER_NAME: &str = "relay-durable";

/// One reading of process and runtime health
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeSample {
    /// Resident memory in bytes
    pub memory_bytes: Option<u64>,
    pub virtual_memory_bytes: Option<u64>,
    pub cpu_percent: Option<f32>,
    /// Tokio worker threads (0 outside a runtime)
    pub runtime_workers: usize,
    pub alive_tasks: usize,
    pub uptime: Duration,
}

struct Gauges {
    memory: Gauge<f64>,
    virtual_memory: Gauge<f64>,
    cpu: Gauge<f64>,
    workers: Gauge<u64>,
    alive_tasks: Gauge<u64>,
    uptime: Gauge<f64>,
    build_info: Gauge<u64>,
}

impl Gauges {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            memory: meter
                .f64_gauge("process.memory.usage")
                .with_unit("By")
                .with_description("Resident memory of the process")
                .build(),
            virtual_memory: meter
                .f64_gauge("process.memory.virtual")
                .with_unit("By")
                .build(),
            cpu: meter
                .f64_gauge("process.cpu.utilization")
                .with_unit("%")
                .build(),
            workers: meter
                .u64_gauge("tokio.workers")
                .with_description("Tokio runtime worker threads")
                .build(),
            alive_tasks: meter
                .u64_gauge("tokio.tasks.alive")
                .with_description("Tasks alive on the tokio runtime")
                .build(),
            uptime: meter.f64_gauge("process.uptime").with_unit("s").build(),
            build_info: meter
                .u64_gauge("build_information")
                .with_description("Constant 1, labelled with build metadata")
                .build(),
        }
    }
}

struct Sampler {
    system: System,
    pid: Option<Pid>,
    started: Instant,
}

impl Sampler {
    fn new() -> Self {
        Self {
            system: System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
            ),
            pid: sysinfo::get_current_pid().ok(),
            started: Instant::now(),
        }
    }

    fn sample(&mut self) -> RuntimeSample {
        let mut sample = RuntimeSample {
            uptime: self.started.elapsed(),
            ..RuntimeSample::default()
        };

        if let Some(pid) = self.pid {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::new().with_memory().with_cpu(),
            );
            if let Some(process) = self.system.process(pid) {
                sample.memory_bytes = Some(process.memory());
                sample.virtual_memory_bytes = Some(process.virtual_memory());
                sample.cpu_percent = Some(process.cpu_usage());
            }
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let metrics = handle.metrics();
            sample.runtime_workers = metrics.num_workers();
            sample.alive_tasks = metrics.num_alive_tasks();
        }
        sample
    }
}

struct Shared {
    sampler: Mutex<Sampler>,
    gauges: Gauges,
    attributes: Vec<KeyValue>,
    build_attributes: Vec<KeyValue>,
}

impl Shared {
    fn report(&self) -> RuntimeSample {
        let sample = self.sampler.lock().sample();
        let attrs = &self.attributes;

        if let Some(bytes) = sample.memory_bytes {
            self.gauges.memory.record(bytes as f64, attrs);
        }
        if let Some(bytes) = sample.virtual_memory_bytes {
            self.gauges.virtual_memory.record(bytes as f64, attrs);
        }
        if let Some(cpu) = sample.cpu_percent {
            self.gauges.cpu.record(f64::from(cpu), attrs);
        }
        self.gauges
            .workers
            .record(sample.runtime_workers as u64, attrs);
        self.gauges
            .alive_tasks
            .record(sample.alive_tasks as u64, attrs);
        self.gauges
            .uptime
            .record(sample.uptime.as_secs_f64(), attrs);
        self.gauges.build_info.record(1, &self.build_attributes);

        debug!(
            memory_bytes = ?sample.memory_bytes,
            cpu_percent = ?sample.cpu_percent,
            runtime_workers = sample.runtime_workers,
            alive_tasks = sample.alive_tasks,
            "runtime metrics reported"
        );
        sample
    }
}

/// Samples process and runtime health on an interval
///
/// [`start`](Self::start) is idempotent. After [`stop`](Self::stop) the
/// reporter cannot be started again.
pub struct RuntimeMetricsReporter {
    interval: Duration,
    shared: Arc<Shared>,
    started: AtomicBool,
    stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RuntimeMetricsReporter {
    pub fn new(config: RuntimeMetricsConfig) -> Self {
        let attributes = vec![KeyValue::new("instance.id", config.instance_id.clone())];
        let mut build_attributes = attributes.clone();
        build_attributes.push(KeyValue::new("version", env!("CARGO_PKG_VERSION")));
        build_attributes.push(KeyValue::new("platform", std::env::consts::ARCH));

        Self {
            interval: config.report_interval,
            shared: Arc::new(Shared {
                sampler: Mutex::new(Sampler::new()),
                gauges: Gauges::new(),
                attributes,
                build_attributes,
            }),
            started: AtomicBool::new(false),
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Report once now, then on every interval
    ///
    /// Returns `false` if the reporter was already started or has been
    /// stopped. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.stop.is_cancelled()
            || self
                .started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return false;
        }

        self.shared.report();
        let shared = Arc::clone(&self.shared);
        let stop = self.stop.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        shared.report();
                    }
                    _ = stop.cancelled() => break,
                }
            }
        });
        *self.handle.lock() = Some(handle);
        info!(interval = ?self.interval, "RuntimeMetricsReporter started");
        true
    }

    /// Stop reporting; permanent
    pub async fn stop(&self) {
        self.stop.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("RuntimeMetricsReporter stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stop.is_cancelled()
    }

    /// Take and record a sample outside the schedule
    pub fn report_now(&self) -> RuntimeSample {
        self.shared.report()
    }
}

impl Drop for RuntimeMetricsReporter {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
