use tokio::sync::broadcast;
use tracing::trace;

/// Notification that an episode's page set changed in some way. Carries no
/// detail beyond the episode id; observers re-fetch whatever they display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagesChanged {
    pub episode_id: String,
}

/// Fire-and-forget publish surface for page mutations.
///
/// Backed by a broadcast channel: no subscribers is fine, and a subscriber
/// that lags past the channel capacity loses events rather than blocking a
/// writer. Nothing about correctness may depend on delivery.
#[derive(Clone)]
pub struct PageEvents {
    sender: broadcast::Sender<PagesChanged>,
}

impl PageEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PagesChanged> {
        self.sender.subscribe()
    }

    pub fn publish(&self, episode_id: &str) {
        trace!(%episode_id, "pages changed");
        let _ = self.sender.send(PagesChanged {
            episode_id: episode_id.to_string(),
        });
    }
}

impl Default for PageEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
