//! Per-origin event routing.
//!
//! Every origin gets its own broadcast channel, created when the first
//! subscriber shows up. Publishing never crosses origins and there is no
//! global channel.

mod events;

pub use events::TaskEvent;

use dashmap::DashMap;
use tabpilot_core_types::OriginId;
use tokio::sync::broadcast;
use tracing::trace;

/// Trait implemented by payload types that can be carried on the router.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

pub struct EventRouter<E = TaskEvent>
where
    E: Event,
{
    channels: DashMap<OriginId, broadcast::Sender<E>>,
    capacity: usize,
}

impl<E> EventRouter<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Deliver to the origin's subscribers; returns how many received it
    pub fn publish(&self, origin: &OriginId, event: E) -> usize {
        let Some(sender) = self.channels.get(origin) else {
            trace!(origin = %origin, "no channel; event dropped");
            return 0;
        };
        sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, origin: &OriginId) -> broadcast::Receiver<E> {
        self.channels
            .entry(origin.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop the origin's channel; open receivers see the stream end
    pub fn close(&self, origin: &OriginId) -> bool {
        self.channels.remove(origin).is_some()
    }

    pub fn subscriber_count(&self, origin: &OriginId) -> usize {
        self.channels
            .get(origin)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl<E> Default for EventRouter<E>
where
    E: Event,
{
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn events_stay_with_their_origin() {
        let router: EventRouter<String> = EventRouter::new(8);
        let a = OriginId::new("tab-a");
        let b = OriginId::new("tab-b");
        let mut rx_a = router.subscribe(&a);
        let mut rx_b = router.subscribe(&b);

        assert_eq!(router.publish(&a, "for a".to_string()), 1);
        assert_eq!(rx_a.recv().await.unwrap(), "for a");
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let router: EventRouter<u32> = EventRouter::new(8);
        assert_eq!(router.publish(&OriginId::new("nobody"), 1), 0);
        assert_eq!(router.channel_count(), 0);
    }

    #[tokio::test]
    async fn close_ends_open_streams() {
        let router: EventRouter<u32> = EventRouter::new(8);
        let origin = OriginId::new("tab-a");
        let mut rx = router.subscribe(&origin);
        assert_eq!(router.subscriber_count(&origin), 1);
        assert!(router.close(&origin));
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert!(!router.close(&origin));
    }
}
