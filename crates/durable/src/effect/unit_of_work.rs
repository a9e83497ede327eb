//! Commit/rollback boundary that owns an effect ledger

use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use super::ledger::{EffectLedger, Outcome, ResolutionReport};

/// One persistence transaction and the effects that depend on it
///
/// Created when a transition starts, handed to the state machine for
/// effect registration, then finished exactly once by whoever learns the
/// persistence outcome.
#[derive(Debug)]
pub struct UnitOfWork {
    id: Uuid,
    ledger: EffectLedger,
    started: Instant,
}

impl UnitOfWork {
    pub fn begin() -> Self {
        Self {
            id: Uuid::now_v7(),
            ledger: EffectLedger::transactional(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn effects(&mut self) -> &mut EffectLedger {
        &mut self.ledger
    }

    pub fn commit(self) -> ResolutionReport {
        self.finish(Outcome::Committed)
    }

    pub fn rollback(self) -> ResolutionReport {
        self.finish(Outcome::RolledBack)
    }

    /// Resolve against a persistence result: `Ok` commits, `Err` rolls back
    pub fn settle<T, E>(self, result: &Result<T, E>) -> ResolutionReport {
        match result {
            Ok(_) => self.commit(),
            Err(_) => self.rollback(),
        }
    }

    fn finish(self, outcome: Outcome) -> ResolutionReport {
        let id = self.id;
        let elapsed = self.started.elapsed();
        let report = self.ledger.resolve(outcome);
        debug!(unit_of_work = %id, ?outcome, ?elapsed, "unit of work finished");
        report
    }
}
