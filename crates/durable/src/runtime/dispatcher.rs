//! Channel-backed dispatcher

use tokio::sync::mpsc;

use crate::activity::{CollaboratorError, DispatchTask, Dispatcher};

/// Dispatcher that hands tasks to an in-process worker over a channel
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn enqueue(&self, task: DispatchTask) -> Result<(), CollaboratorError> {
        self.tx.send(task).map_err(|_| {
            CollaboratorError::DispatcherUnavailable("dispatch queue closed".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityKey;
    use uuid::Uuid;

    fn task() -> DispatchTask {
        DispatchTask {
            key: ActivityKey::new(Uuid::now_v7(), "a"),
            activity_type: "noop".to_string(),
            input: serde_json::json!({}),
            attempt: 1,
            stamp: 1,
        }
    }

    #[test]
    fn test_enqueue_delivers() {
        let (dispatcher, mut rx) = ChannelDispatcher::new();
        dispatcher.enqueue(task()).unwrap();
        assert_eq!(rx.try_recv().unwrap().attempt, 1);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let (dispatcher, rx) = ChannelDispatcher::new();
        drop(rx);
        assert!(matches!(
            dispatcher.enqueue(task()),
            Err(CollaboratorError::DispatcherUnavailable(_))
        ));
    }
}
