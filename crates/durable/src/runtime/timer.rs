//! In-process timer service on tokio sleeps

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::activity::{ActivityKey, CollaboratorError, TimerFired, TimerService, TimerToken};
use crate::clock::{elapsed_between, Clock};

/// Timer service that sleeps on the current tokio runtime
///
/// Each armed token is one spawned task; fires are delivered on the
/// channel returned by [`TokioTimerService::new`]. Timers do not survive a
/// process restart.
pub struct TokioTimerService {
    clock: Arc<dyn Clock>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    pending: Arc<DashMap<TimerToken, AbortHandle>>,
}

impl TokioTimerService {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let service = Self {
            clock,
            fired_tx,
            pending: Arc::new(DashMap::new()),
        };
        (service, fired_rx)
    }

    /// Number of armed, not yet fired timers
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl TimerService for TokioTimerService {
    fn arm(
        &self,
        key: &ActivityKey,
        token: TimerToken,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError> {
        let handle =
            Handle::try_current().map_err(|e| CollaboratorError::TimerUnavailable(e.to_string()))?;
        let delay = elapsed_between(self.clock.now(), fire_at);

        let fired_tx = self.fired_tx.clone();
        let pending = Arc::clone(&self.pending);
        let key = key.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove(&token);
            trace!(%key, %token, "timer fired");
            if fired_tx.send(TimerFired { key, token }).is_err() {
                debug!(%token, "timer receiver dropped");
            }
        });

        self.pending.insert(token, task.abort_handle());
        if task.is_finished() {
            self.pending.remove(&token);
        }
        debug!(%token, ?delay, "timer armed");
        Ok(())
    }

    fn cancel(&self, token: TimerToken) -> Result<(), CollaboratorError> {
        if let Some((_, handle)) = self.pending.remove(&token) {
            handle.abort();
            debug!(%token, "timer cancelled");
        }
        Ok(())
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for entry in self.pending.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::time::Duration;
    use uuid::Uuid;

    fn key() -> ActivityKey {
        ActivityKey::new(Uuid::now_v7(), "step")
    }

    #[tokio::test]
    async fn test_timer_fires() {
        let (timers, mut fired) = TokioTimerService::new(Arc::new(SystemClock));
        let token = TimerToken::new();
        let key = key();
        timers
            .arm(&key, token, Utc::now() + chrono::Duration::milliseconds(20))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, TimerFired { key, token });
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let (timers, mut fired) = TokioTimerService::new(Arc::new(SystemClock));
        let token = TimerToken::new();
        timers
            .arm(&key(), token, Utc::now() + chrono::Duration::milliseconds(50))
            .unwrap();
        timers.cancel(token).unwrap();
        assert_eq!(timers.pending(), 0);

        let result = tokio::time::timeout(Duration::from_millis(200), fired.recv()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_arm_outside_runtime_fails() {
        let (timers, _fired) = TokioTimerService::new(Arc::new(SystemClock));
        let err = timers
            .arm(&key(), TimerToken::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::TimerUnavailable(_)));
    }
}
