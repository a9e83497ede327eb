//! In-process runtime: timers, dispatch and workers on tokio
//!
//! The engine only sees the [`TimerService`](crate::activity::TimerService)
//! and [`Dispatcher`](crate::activity::Dispatcher) traits. This module
//! provides implementations that deliver timer fires and dispatch tasks
//! over channels to an [`ActivityWorker`] in the same process.

mod dispatcher;
mod timer;
mod worker;

use std::sync::Arc;

pub use dispatcher::ChannelDispatcher;
pub use timer::TokioTimerService;
pub use worker::{
    ActivityHandler, ActivityResult, ActivityWorker, AttemptContext, WorkerError, WorkerStatus,
};

use crate::activity::Collaborators;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::engine::ActivityEngine;
use crate::persistence::ActivityStore;

/// Wire an engine to a worker through an in-process timer service and dispatcher
pub fn in_process(
    store: Arc<dyn ActivityStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
) -> (ActivityEngine, ActivityWorker) {
    let (timers, fired) = TokioTimerService::new(Arc::clone(&clock));
    let (dispatcher, tasks) = ChannelDispatcher::new();
    let worker_config = config.worker.clone();

    let engine = ActivityEngine::new(
        store,
        Collaborators::new(Arc::new(timers), Arc::new(dispatcher)),
        config,
    )
    .with_clock(clock);
    let worker = ActivityWorker::new(engine.clone(), worker_config, tasks, fired);
    (engine, worker)
}
