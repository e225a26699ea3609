//! In-process notifier bus for discussion entities.
//!
//! Views showing the same comment (thread screen, responses screen, ...)
//! subscribe here so a vote, flag, or new reply made in one place is reflected
//! everywhere.

use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::Comment;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscussionEvent {
    /// The aggregate state of a comment (votes, flag, child count) changed.
    CommentUpdated(Comment),
}

#[derive(Clone, Debug)]
pub struct DiscussionNotifier {
    tx: broadcast::Sender<DiscussionEvent>,
}

impl Default for DiscussionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscussionNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscussionEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; having no subscribers is not an error.
    pub fn send(&self, event: DiscussionEvent) {
        match self.tx.send(event) {
            Ok(n) => debug!(target: "discussion", receivers = n, "Notifier event sent"),
            Err(_) => debug!(target: "discussion", "Notifier event dropped (no subscribers)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let bus = DiscussionNotifier::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let c = Comment { id: "c1".into(), child_count: 3, ..Default::default() };

        bus.send(DiscussionEvent::CommentUpdated(c.clone()));

        assert_eq!(a.recv().await.expect("a"), DiscussionEvent::CommentUpdated(c.clone()));
        assert_eq!(b.recv().await.expect("b"), DiscussionEvent::CommentUpdated(c));
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        DiscussionNotifier::new().send(DiscussionEvent::CommentUpdated(Comment::default()));
    }
}
