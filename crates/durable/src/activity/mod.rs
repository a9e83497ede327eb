//! Activity instances and the attempt state machine
//!
//! An activity is one unit of work inside a workflow execution. It runs as
//! a series of attempts: failures are retried with backoff according to its
//! [`RetryPolicy`](crate::reliability::RetryPolicy), and operators can
//! pause, unpause, reset or cancel the series at any point.

mod collaborators;
mod instance;
mod machine;

pub use collaborators::{
    CollaboratorError, Collaborators, DispatchTask, Dispatcher, RecordingDispatcher,
    RecordingTimers, TimerCall, TimerFired, TimerService,
};
pub use instance::{
    ActivityInstance, ActivityKey, ActivityOptions, ActivitySnapshot, ActivityStatus,
    FailureDetail, ScheduleActivity, TimerToken,
};
pub use machine::{
    AttemptMachine, FailOutcome, IgnoreReason, Operation, TimerOutcome, TransitionError,
};
