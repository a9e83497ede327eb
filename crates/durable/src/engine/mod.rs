//! Activity engine
//!
//! [`ActivityEngine`] is the public control surface: schedule, start,
//! complete, fail, pause, unpause, reset and cancel activity instances,
//! each as one persisted transition whose side effects follow the save.

mod service;

pub use service::{ActivityEngine, EngineError};
