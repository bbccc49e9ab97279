use std::{fmt, sync::Arc};

use crewlink_model::{RoomEvent, RoomKey};
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};

pub const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Keyed set of broadcast rooms.
///
/// Publishing never waits on subscribers: a slow receiver lags and is told
/// how many events it skipped. Rooms are created on first subscribe and
/// dropped when their last subscription goes away.
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<DashMap<RoomKey, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl fmt::Debug for RoomHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHub")
            .field("room_count", &self.rooms.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, key: RoomKey) -> RoomSubscription {
        let receiver = self
            .rooms
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        RoomSubscription {
            key,
            receiver: Some(receiver),
            rooms: Arc::clone(&self.rooms),
        }
    }

    /// Deliver an event to every current subscriber of `key`, returning how
    /// many receivers it reached.
    pub fn publish(&self, key: RoomKey, event: RoomEvent) -> usize {
        let Some(sender) = self.rooms.get(&key).map(|tx| tx.clone()) else {
            return 0;
        };
        sender.send(event).unwrap_or(0)
    }

    /// Publish one event to several rooms.
    pub fn publish_all(&self, keys: &[RoomKey], event: &RoomEvent) -> usize {
        let delivered = keys
            .iter()
            .map(|key| self.publish(*key, event.clone()))
            .sum();
        tracing::debug!(event = event.name(), rooms = keys.len(), delivered, "room fan-out");
        delivered
    }

    pub fn receiver_count(&self, key: &RoomKey) -> usize {
        self.rooms
            .get(key)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop rooms nobody listens to. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
        before.saturating_sub(self.rooms.len())
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

/// A live membership in one room. Dropping it leaves the room.
pub struct RoomSubscription {
    key: RoomKey,
    /// Always `Some` until drop.
    receiver: Option<broadcast::Receiver<RoomEvent>>,
    rooms: Arc<DashMap<RoomKey, broadcast::Sender<RoomEvent>>>,
}

impl fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("key", &self.key)
            .field("pending", &self.receiver.as_ref().map_or(0, |rx| rx.len()))
            .finish()
    }
}

impl RoomSubscription {
    pub fn key(&self) -> RoomKey {
        self.key
    }

    /// Wait for the next event. `RecvError::Lagged` reports a gap; the
    /// subscription stays usable afterwards.
    pub async fn recv(&mut self) -> Result<RoomEvent, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.receiver.as_mut()?.try_recv().ok()
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        // Release our receiver first so concurrent drops all see the
        // final count.
        drop(self.receiver.take());
        self.rooms
            .remove_if(&self.key, |_, tx| tx.receiver_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_model::{JobId, UserId};
    use uuid::Uuid;

    fn job_key(n: u128) -> RoomKey {
        RoomKey::Job(JobId(Uuid::from_u128(n)))
    }

    fn started(n: u128) -> RoomEvent {
        RoomEvent::JobStarted {
            job_id: JobId(Uuid::from_u128(n)),
        }
    }

    #[tokio::test]
    async fn publish_reaches_only_the_addressed_room() {
        let hub = RoomHub::new(8);
        let mut first = hub.subscribe(job_key(1));
        let mut second = hub.subscribe(job_key(2));

        assert_eq!(hub.publish(job_key(1), started(1)), 1);

        assert_eq!(first.recv().await.unwrap(), started(1));
        assert!(second.try_recv().is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = RoomHub::new(8);
        assert_eq!(hub.publish(job_key(3), started(3)), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn dropping_last_subscription_removes_room() {
        let hub = RoomHub::new(8);
        let a = hub.subscribe(job_key(4));
        let b = hub.subscribe(job_key(4));
        assert_eq!(hub.receiver_count(&job_key(4)), 2);

        drop(a);
        assert_eq!(hub.room_count(), 1);
        drop(b);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn concurrent_last_drops_leave_no_room_behind() {
        let hub = RoomHub::new(8);
        for round in 0..50 {
            let subs: Vec<_> = (0..4).map(|_| hub.subscribe(job_key(round))).collect();
            std::thread::scope(|scope| {
                for sub in subs {
                    scope.spawn(move || drop(sub));
                }
            });
        }
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn prune_removes_rooms_without_receivers() {
        let hub = RoomHub::new(8);
        let _kept = hub.subscribe(job_key(5));
        // a room whose sender outlived its receivers
        hub.rooms.insert(job_key(6), broadcast::channel(8).0);
        assert_eq!(hub.room_count(), 2);

        assert_eq!(hub.prune_idle(), 1);
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.receiver_count(&job_key(5)), 1);
    }

    #[tokio::test]
    async fn slow_receivers_observe_a_gap() {
        let hub = RoomHub::new(2);
        let actor = RoomKey::Actor(UserId(Uuid::from_u128(9)));
        let mut sub = hub.subscribe(actor);

        for n in 0..5 {
            hub.publish(actor, started(n));
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }
}
