//! Deferred side effects resolved against a commit/rollback outcome

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

/// Error type returned by effect callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A deferred side effect
pub type EffectCallback = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// When a registered callback should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    OnCommit,
    OnRollback,
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnCommit => write!(f, "on_commit"),
            Self::OnRollback => write!(f, "on_rollback"),
        }
    }
}

/// Final disposition of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack,
}

impl Outcome {
    fn runs(self) -> EffectKind {
        match self {
            Self::Committed => EffectKind::OnCommit,
            Self::RolledBack => EffectKind::OnRollback,
        }
    }
}

/// A callback that did not complete
///
/// Failures are reported, never escalated: the remaining callbacks of the
/// same resolution still run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("{kind} callback #{index} failed: {message}")]
    CallbackFailed {
        index: usize,
        kind: EffectKind,
        message: String,
    },

    #[error("{kind} callback #{index} panicked")]
    CallbackPanicked { index: usize, kind: EffectKind },
}

/// What happened to a registration
#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    /// Held until the ledger is resolved
    Deferred,
    /// Ran synchronously (immediate ledger, `OnCommit`)
    Ran(Result<(), EffectError>),
    /// Dropped without running (immediate ledger, `OnRollback`)
    Discarded,
}

/// Summary of a resolution
#[derive(Debug)]
pub struct ResolutionReport {
    pub outcome: Outcome,
    /// Callbacks invoked (including failed ones)
    pub ran: usize,
    /// Callbacks of the other kind, dropped
    pub discarded: usize,
    pub failures: Vec<EffectError>,
}

impl ResolutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Entry {
    index: usize,
    kind: EffectKind,
    callback: EffectCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Transactional,
    Immediate,
}

/// Ordered, append-only list of deferred side effects for one unit of work
///
/// A transactional ledger holds every registration until [`resolve`] is
/// called with the unit's final [`Outcome`]; the matching callbacks then run
/// in registration order and the others are dropped. Resolution consumes
/// the ledger, so it happens exactly once. A ledger dropped without being
/// resolved is treated as rolled back.
///
/// An immediate ledger stands for "no pending transaction": it is already
/// committed, so `OnCommit` callbacks run during registration and
/// `OnRollback` callbacks are discarded.
///
/// # Example
///
/// ```
/// use relay_durable::effect::{EffectLedger, Outcome};
/// use std::sync::{Arc, Mutex};
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let mut ledger = EffectLedger::transactional();
///
/// let l = log.clone();
/// ledger.on_commit(move || { l.lock().unwrap().push("arm timer"); Ok(()) });
/// let l = log.clone();
/// ledger.on_rollback(move || { l.lock().unwrap().push("compensate"); Ok(()) });
///
/// assert!(log.lock().unwrap().is_empty());
/// ledger.resolve(Outcome::Committed);
/// assert_eq!(*log.lock().unwrap(), vec!["arm timer"]);
/// ```
///
/// [`resolve`]: EffectLedger::resolve
pub struct EffectLedger {
    mode: Mode,
    entries: Vec<Entry>,
    registered: usize,
    resolved: bool,
}

impl EffectLedger {
    /// Ledger scoped to a pending transaction
    pub fn transactional() -> Self {
        Self {
            mode: Mode::Transactional,
            entries: Vec::new(),
            registered: 0,
            resolved: false,
        }
    }

    /// Ledger for work that is not part of any transaction
    pub fn immediate() -> Self {
        Self {
            mode: Mode::Immediate,
            entries: Vec::new(),
            registered: 0,
            resolved: true,
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.mode == Mode::Immediate
    }

    /// Number of held registrations of `kind`
    pub fn pending(&self, kind: EffectKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a callback for `kind`
    pub fn register<F>(&mut self, kind: EffectKind, callback: F) -> Registration
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let index = self.registered;
        self.registered += 1;
        match (self.mode, kind) {
            (Mode::Transactional, _) => {
                self.entries.push(Entry {
                    index,
                    kind,
                    callback: Box::new(callback),
                });
                Registration::Deferred
            }
            (Mode::Immediate, EffectKind::OnCommit) => {
                Registration::Ran(invoke(index, kind, Box::new(callback)))
            }
            (Mode::Immediate, EffectKind::OnRollback) => Registration::Discarded,
        }
    }

    pub fn on_commit<F>(&mut self, callback: F) -> Registration
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.register(EffectKind::OnCommit, callback)
    }

    pub fn on_rollback<F>(&mut self, callback: F) -> Registration
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.register(EffectKind::OnRollback, callback)
    }

    /// Fold a nested ledger's registrations into this one, preserving order
    ///
    /// The nested ledger never resolves on its own; its callbacks follow
    /// this ledger's outcome. Absorbing into an immediate ledger resolves the
    /// nested registrations as committed right away.
    pub fn absorb(&mut self, mut nested: EffectLedger) {
        let entries = std::mem::take(&mut nested.entries);
        nested.resolved = true;
        for entry in entries {
            self.register(entry.kind, entry.callback);
        }
    }

    /// Run the callbacks matching `outcome` in registration order
    pub fn resolve(mut self, outcome: Outcome) -> ResolutionReport {
        self.resolve_in_place(outcome)
    }

    fn resolve_in_place(&mut self, outcome: Outcome) -> ResolutionReport {
        self.resolved = true;
        let wanted = outcome.runs();
        let mut report = ResolutionReport {
            outcome,
            ran: 0,
            discarded: 0,
            failures: Vec::new(),
        };

        for entry in std::mem::take(&mut self.entries) {
            if entry.kind != wanted {
                report.discarded += 1;
                continue;
            }
            report.ran += 1;
            if let Err(err) = invoke(entry.index, entry.kind, entry.callback) {
                report.failures.push(err);
            }
        }

        debug!(
            ?outcome,
            ran = report.ran,
            discarded = report.discarded,
            failed = report.failures.len(),
            "resolved effect ledger"
        );
        report
    }
}

impl Default for EffectLedger {
    fn default() -> Self {
        Self::transactional()
    }
}

impl std::fmt::Debug for EffectLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectLedger")
            .field("mode", &self.mode)
            .field("on_commit", &self.pending(EffectKind::OnCommit))
            .field("on_rollback", &self.pending(EffectKind::OnRollback))
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl Drop for EffectLedger {
    fn drop(&mut self) {
        if !self.resolved && !self.entries.is_empty() {
            warn!(
                pending = self.entries.len(),
                "effect ledger dropped unresolved, rolling back"
            );
            self.resolve_in_place(Outcome::RolledBack);
        }
    }
}

fn invoke(index: usize, kind: EffectKind, callback: EffectCallback) -> Result<(), EffectError> {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!(index, %kind, error = %err, "effect callback failed");
            Err(EffectError::CallbackFailed {
                index,
                kind,
                message: err.to_string(),
            })
        }
        Err(_) => {
            warn!(index, %kind, "effect callback panicked");
            Err(EffectError::CallbackPanicked { index, kind })
        }
    }
}
