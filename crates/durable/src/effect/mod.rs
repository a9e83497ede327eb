//! Transactional effect deferral
//!
//! Components register side effects ("arm a retry timer", "enqueue a
//! dispatch task") on the current [`UnitOfWork`]'s [`EffectLedger`]. They
//! become visible only if the unit commits; otherwise the rollback
//! callbacks run instead.

mod ledger;
mod unit_of_work;

pub use ledger::{
    BoxError, EffectCallback, EffectError, EffectKind, EffectLedger, Outcome, Registration,
    ResolutionReport,
};
pub use unit_of_work::UnitOfWork;
