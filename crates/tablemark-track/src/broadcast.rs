//! Push channel towards downstream consumers.

use crate::MarkersPayload;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fire-and-forget sink for per-frame payloads. `publish` must not block on
/// slow or absent subscribers.
pub trait Broadcast {
    fn publish(&self, payload: &MarkersPayload);
}

impl<B: Broadcast + ?Sized> Broadcast for &B {
    fn publish(&self, payload: &MarkersPayload) {
        (**self).publish(payload)
    }
}

impl<B: Broadcast + ?Sized> Broadcast for Arc<B> {
    fn publish(&self, payload: &MarkersPayload) {
        (**self).publish(payload)
    }
}

/// In-process fan-out over bounded queues, one per subscriber.
///
/// A full queue drops the message for that subscriber; a dropped
/// [`Subscription`] is removed on the next publish. Network transports
/// consume a subscription each.
#[derive(Clone, Debug, Default)]
pub struct FanoutBroadcaster {
    subscribers: Arc<Mutex<Vec<Sender<Arc<str>>>>>,
}

impl FanoutBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber holding at most `capacity` pending messages.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Broadcast for FanoutBroadcaster {
    fn publish(&self, payload: &MarkersPayload) {
        let message: Arc<str> = match payload.to_json() {
            Ok(json) => json.into(),
            Err(err) => {
                warn!("failed to serialize payload: {err}");
                return;
            }
        };

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(Arc::clone(&message)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("subscriber queue full, dropping payload");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("subscriber disconnected");
                false
            }
        });
    }
}

/// Receiving end of a [`FanoutBroadcaster`]; yields JSON text.
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<Arc<str>>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// `None` on timeout or once the broadcaster is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<str>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Blocking iterator ending when every broadcaster handle is dropped.
    pub fn iter(&self) -> impl Iterator<Item = Arc<str>> + '_ {
        self.rx.iter()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkerMessage, MessageType, Position};

    fn payload(id: u32) -> MarkersPayload {
        MarkersPayload {
            markers: vec![MarkerMessage {
                id,
                message_type: MessageType::ControlHover,
                data: Position { x: 1.0, y: 2.0 },
            }],
        }
    }

    #[test]
    fn every_subscriber_gets_the_payload() {
        let hub = FanoutBroadcaster::new();
        let a = hub.subscribe(4);
        let b = hub.subscribe(4);
        hub.publish(&payload(7));

        let expected = payload(7).to_json().unwrap();
        assert_eq!(a.try_recv().as_deref(), Some(expected.as_str()));
        assert_eq!(b.try_recv().as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn full_subscriber_does_not_block() {
        let hub = FanoutBroadcaster::new();
        let slow = hub.subscribe(1);
        for id in 0..5 {
            hub.publish(&payload(id));
        }
        assert_eq!(slow.pending(), 1);
        let first: MarkersPayload = serde_json::from_str(&slow.try_recv().unwrap()).unwrap();
        assert_eq!(first.markers[0].id, 0);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let hub = FanoutBroadcaster::new();
        let keep = hub.subscribe(2);
        drop(hub.subscribe(2));
        assert_eq!(hub.subscriber_count(), 2);
        hub.publish(&payload(1));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(keep.try_recv().is_some());
    }

    #[test]
    fn no_subscribers_is_fine() {
        FanoutBroadcaster::new().publish(&payload(1));
    }
}
