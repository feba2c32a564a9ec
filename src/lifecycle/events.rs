//! Lifecycle notifications

use super::State;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 100;

/// A notification emitted by the application state machine
///
/// Every transition emits `StateChanged` followed by `Entered` for the new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    StateChanged { from: State, to: State },
    Entered(State),
}

/// In-memory fan-out of lifecycle notifications
#[derive(Clone)]
pub struct LifecycleEvents {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publish the notifications for a transition
    pub(crate) fn transition(&self, from: State, to: State) {
        // No subscribers is not an error.
        let _ = self.sender.send(LifecycleEvent::StateChanged { from, to });
        let _ = self.sender.send(LifecycleEvent::Entered(to));
    }

    /// Subscribe to all notifications published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_order() {
        let events = LifecycleEvents::new();
        let mut rx = events.subscribe();

        events.transition(State::Created, State::Starting);

        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::StateChanged {
                from: State::Created,
                to: State::Starting
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Entered(State::Starting)
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = LifecycleEvents::new();
        events.transition(State::Started, State::Stopping);
    }
}
