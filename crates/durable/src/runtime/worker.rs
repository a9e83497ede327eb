//! Activity worker
//!
//! Consumes dispatch tasks and timer fires, starts attempts through the
//! engine, runs the registered handler and reports the outcome back.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::activity::{ActivityKey, DispatchTask, FailureDetail, TimerFired};
use crate::config::WorkerConfig;
use crate::engine::{ActivityEngine, EngineError};

/// Handed to a handler for one attempt
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub key: ActivityKey,

    /// Current attempt number (1-based, restarts after a reset)
    pub attempt: u32,

    pub input: serde_json::Value,

    cancellation: CancellationToken,
}

impl AttemptContext {
    /// Check if the worker is shutting down past its drain timeout
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Activity execution result
pub type ActivityResult = Result<serde_json::Value, FailureDetail>;

/// Activity handler function type
pub type ActivityHandler = Arc<
    dyn Fn(AttemptContext) -> Pin<Box<dyn Future<Output = ActivityResult> + Send>> + Send + Sync,
>;

/// Worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Created, not started
    Idle,
    /// Accepting tasks
    Running,
    /// Finishing in-flight attempts, not accepting new ones
    Draining,
    Stopped,
}

/// Worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker is already running")]
    AlreadyRunning,

    #[error("worker has been stopped and cannot be restarted")]
    Stopped,

    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Executes dispatched attempts
///
/// # Example
///
/// ```ignore
/// use relay_durable::runtime::in_process;
///
/// let (engine, worker) = in_process(store, EngineConfig::default(), clock);
/// worker.register_handler("charge_card", |ctx| async move {
///     Ok(json!({"charged": ctx.input["amount"]}))
/// });
/// worker.start()?;
/// // ... later, graceful shutdown
/// worker.shutdown().await?;
/// ```
pub struct ActivityWorker {
    engine: ActivityEngine,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<String, ActivityHandler>>>,
    inbox: Mutex<Option<Inbox>>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerStatus>,
    active: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    cancellation: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inbox {
    tasks: mpsc::UnboundedReceiver<DispatchTask>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
}

impl ActivityWorker {
    pub fn new(
        engine: ActivityEngine,
        config: WorkerConfig,
        tasks: mpsc::UnboundedReceiver<DispatchTask>,
        timers: mpsc::UnboundedReceiver<TimerFired>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            engine,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            inbox: Mutex::new(Some(Inbox { tasks, timers })),
            shutdown_tx,
            status: RwLock::new(WorkerStatus::Idle),
            active: Arc::new(Semaphore::new(max_concurrency)),
            running: Arc::new(AtomicUsize::new(0)),
            cancellation: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Register an activity handler
    pub fn register_handler<F, Fut>(&self, activity_type: &str, handler: F)
    where
        F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActivityResult> + Send + 'static,
    {
        let handler: ActivityHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.handlers
            .write()
            .insert(activity_type.to_string(), handler);
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.read()
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn engine(&self) -> &ActivityEngine {
        &self.engine
    }

    /// Attempts currently executing
    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Start the receive loop on the current runtime
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) -> Result<(), WorkerError> {
        match self.status() {
            WorkerStatus::Running | WorkerStatus::Draining => {
                return Err(WorkerError::AlreadyRunning)
            }
            WorkerStatus::Stopped => return Err(WorkerError::Stopped),
            WorkerStatus::Idle => {}
        }
        let inbox = self.inbox.lock().take().ok_or(WorkerError::Stopped)?;

        info!(
            worker_id = %self.config.worker_id,
            max_concurrency = self.config.max_concurrency,
            "Starting activity worker"
        );
        *self.status.write() = WorkerStatus::Running;

        let handle = tokio::spawn(receive_loop(
            self.engine.clone(),
            Arc::clone(&self.handlers),
            Arc::clone(&self.active),
            Arc::clone(&self.running),
            self.cancellation.clone(),
            self.shutdown_tx.subscribe(),
            inbox,
        ));
        *self.loop_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop accepting work and wait for in-flight attempts
    ///
    /// Attempts still running at the shutdown timeout are signalled through
    /// their context's cancellation and the call returns
    /// [`WorkerError::ShutdownTimeout`].
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        match self.status() {
            WorkerStatus::Stopped => return Ok(()),
            WorkerStatus::Idle => {
                self.inbox.lock().take();
                *self.status.write() = WorkerStatus::Stopped;
                return Ok(());
            }
            WorkerStatus::Running | WorkerStatus::Draining => {}
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");
        *self.status.write() = WorkerStatus::Draining;
        let _ = self.shutdown_tx.send(true);

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Worker loop ended abnormally: {}", e);
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let result = loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                debug!("All attempts completed");
                break Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(remaining_attempts = in_flight, "Shutdown timeout reached");
                self.cancellation.cancel();
                break Err(WorkerError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        };

        *self.status.write() = WorkerStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Activity worker stopped");
        result
    }
}

async fn receive_loop(
    engine: ActivityEngine,
    handlers: Arc<RwLock<HashMap<String, ActivityHandler>>>,
    active: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    cancellation: CancellationToken,
    mut shutdown_rx: watch::Receiver<bool>,
    mut inbox: Inbox,
) {
    let mut timers_open = true;
    let mut tasks_open = true;
    // A task is only taken off the channel once a slot is held
    let mut slot: Option<OwnedSemaphorePermit> = None;

    while timers_open || tasks_open {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                debug!("Receive loop: shutdown requested");
                break;
            }

            fired = inbox.timers.recv(), if timers_open => match fired {
                Some(TimerFired { key, token }) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.attempt_due(&key, token).await {
                            report_error(&key, "attempt_due", &e);
                        }
                    });
                }
                None => timers_open = false,
            },

            permit = Arc::clone(&active).acquire_owned(), if tasks_open && slot.is_none() => {
                match permit {
                    Ok(permit) => slot = Some(permit),
                    Err(_) => break,
                }
            }

            task = inbox.tasks.recv(), if tasks_open && slot.is_some() => match task {
                Some(task) => {
                    let guard = Running::enter(slot.take(), &running);
                    let handler = handlers.read().get(&task.activity_type).cloned();
                    let engine = engine.clone();
                    let cancellation = cancellation.clone();
                    tokio::spawn(async move {
                        execute(engine, handler, task, cancellation).await;
                        drop(guard);
                    });
                }
                None => tasks_open = false,
            },
        }
    }

    debug!("Receive loop exited");
}

/// Slot and count held by one running attempt, released on drop
struct Running {
    _permit: Option<OwnedSemaphorePermit>,
    count: Arc<AtomicUsize>,
}

impl Running {
    fn enter(permit: Option<OwnedSemaphorePermit>, count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self {
            _permit: permit,
            count: Arc::clone(count),
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run one dispatched attempt end to end
async fn execute(
    engine: ActivityEngine,
    handler: Option<ActivityHandler>,
    task: DispatchTask,
    cancellation: CancellationToken,
) {
    let key = task.key.clone();
    let snapshot = match engine.start(&task).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report_error(&key, "start", &e);
            return;
        }
    };

    let result = match handler {
        Some(handler) => {
            let ctx = AttemptContext {
                key: key.clone(),
                attempt: snapshot.attempt,
                input: task.input,
                cancellation,
            };
            handler(ctx).await
        }
        None => {
            warn!(activity_type = %task.activity_type, "No handler registered");
            Err(FailureDetail::non_retryable(format!(
                "no handler registered for activity type: {}",
                task.activity_type
            ))
            .with_type("HandlerNotFound"))
        }
    };

    let reported = match result {
        Ok(output) => engine.complete(&key, output).await.map(|_| ()),
        Err(failure) => engine.fail(&key, failure).await.map(|_| ()),
    };
    if let Err(e) = reported {
        report_error(&key, "report", &e);
    }
}

/// Rejections caused by concurrent control operations are expected
fn report_error(key: &ActivityKey, stage: &str, e: &EngineError) {
    match e {
        EngineError::StaleDispatch { .. }
        | EngineError::InvalidStateTransition { .. }
        | EngineError::DeadlineExceeded { .. } => {
            debug!(%key, stage, "{}", e);
        }
        _ => error!(%key, stage, "Worker operation failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_status() {
        assert_ne!(WorkerStatus::Running, WorkerStatus::Stopped);
        assert_ne!(WorkerStatus::Draining, WorkerStatus::Running);
    }
}
