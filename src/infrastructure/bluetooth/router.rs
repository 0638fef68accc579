//! Notification Router
//!
//! Fans notifications from every connected camera back out to the listener
//! registered for each (device, characteristic) pair.
//!
//! ```text
//!  session A ─┐                        ┌─> listener (A, BatteryLevel)
//!  session B ─┼─> NotificationEnvelope ┼─> listener (A, CameraPower)
//!  inbound  ──┘                        └─> listener (B, State)
//! ```
//!
//! Each key owns its own slot lock. The table lock is only held long enough
//! to find or swap a slot, so a slow listener on one key never stalls
//! another key.

use crate::domain::models::{DeviceId, PeripheralError};
use crate::error::ThetaBleError;
use crate::infrastructure::bluetooth::protocol::Characteristic;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A notification as it comes off the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEnvelope {
    pub device_id: DeviceId,
    pub characteristic: Characteristic,
    /// Error reported by the camera instead of a value.
    pub error: Option<PeripheralError>,
    pub params: Option<Vec<u8>>,
}

impl NotificationEnvelope {
    pub fn value(device_id: DeviceId, characteristic: Characteristic, params: Vec<u8>) -> Self {
        Self {
            device_id,
            characteristic,
            error: None,
            params: Some(params),
        }
    }

    pub fn failure(
        device_id: DeviceId,
        characteristic: Characteristic,
        error: PeripheralError,
    ) -> Self {
        Self {
            device_id,
            characteristic,
            error: Some(error),
            params: None,
        }
    }
}

/// Typed listener for one characteristic.
pub type Listener<T> = Box<dyn Fn(Result<T, ThetaBleError>) + Send + Sync>;

/// Payload decoder captured at registration time.
pub type Decoder<T> = fn(&[u8]) -> Result<T, crate::error::ProtocolError>;

type Handler = Box<dyn Fn(&NotificationEnvelope) + Send + Sync>;
type Slot = Arc<Mutex<Option<Handler>>>;
type Key = (DeviceId, Characteristic);

#[derive(Default)]
pub struct NotificationRouter {
    slots: RwLock<HashMap<Key, Slot>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for a key, replacing any previous one.
    pub fn register<T: 'static>(
        &self,
        device_id: DeviceId,
        characteristic: Characteristic,
        decode: Decoder<T>,
        listener: Listener<T>,
    ) {
        let handler: Handler = Box::new(move |envelope: &NotificationEnvelope| {
            let result = match (&envelope.error, &envelope.params) {
                (Some(error), _) => Err(ThetaBleError::Peripheral(error.clone())),
                (None, Some(params)) => decode(params).map_err(ThetaBleError::from),
                (None, None) => decode(&[]).map_err(ThetaBleError::from),
            };
            listener(result);
        });

        // The slot is filled before it becomes visible, so a racing
        // unregister either removes this handler or runs before it exists.
        let slot: Slot = Arc::new(Mutex::new(Some(handler)));
        let previous = self
            .slots
            .write()
            .insert((device_id, characteristic), slot);
        if previous.is_some_and(|previous| previous.lock().take().is_some()) {
            debug!(
                "Replaced listener for {} on device {}",
                characteristic, device_id
            );
        }
    }

    /// Remove the listener for a key. Once this returns the listener is
    /// never called again, even if a dispatch was in flight.
    ///
    /// Must not be called from inside that same listener.
    pub fn unregister(&self, device_id: DeviceId, characteristic: Characteristic) -> bool {
        let slot = self.slots.write().remove(&(device_id, characteristic));
        match slot {
            Some(slot) => slot.lock().take().is_some(),
            None => false,
        }
    }

    /// Remove every listener of a device. Returns how many were removed.
    pub fn unregister_device(&self, device_id: DeviceId) -> usize {
        let removed: Vec<Slot> = {
            let mut slots = self.slots.write();
            let keys: Vec<Key> = slots
                .keys()
                .filter(|(id, _)| *id == device_id)
                .copied()
                .collect();
            keys.iter().filter_map(|key| slots.remove(key)).collect()
        };
        removed
            .iter()
            .filter(|slot| slot.lock().take().is_some())
            .count()
    }

    /// Deliver one envelope. Returns `false` when nobody listens.
    pub fn dispatch(&self, envelope: &NotificationEnvelope) -> bool {
        let slot = self
            .slots
            .read()
            .get(&(envelope.device_id, envelope.characteristic))
            .cloned();
        let Some(slot) = slot else {
            trace!(
                "Dropping {} notification for device {}: no listener",
                envelope.characteristic,
                envelope.device_id
            );
            return false;
        };

        let guard = slot.lock();
        match guard.as_ref() {
            Some(handler) => {
                handler(envelope);
                true
            }
            None => false,
        }
    }

    /// Drain a single inbound channel of envelopes until every sender is
    /// gone, for platforms that deliver all notifications through one
    /// event stream.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<NotificationEnvelope>) {
        while let Some(envelope) = inbound.recv().await {
            self.dispatch(&envelope);
        }
        debug!("Notification inbound channel closed");
    }

    pub fn is_registered(&self, device_id: DeviceId, characteristic: Characteristic) -> bool {
        self.slots
            .read()
            .get(&(device_id, characteristic))
            .map(|slot| slot.lock().is_some())
            .unwrap_or(false)
    }

    pub fn listener_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::values::decode_u8;
    use crate::error::ProtocolError;

    fn battery(bytes: &[u8]) -> Result<u8, ProtocolError> {
        decode_u8("battery level", bytes)
    }

    type Received = Arc<Mutex<Vec<Result<u8, ThetaBleError>>>>;

    fn recorder() -> (Received, Listener<u8>) {
        let received: Received = Arc::default();
        let sink = received.clone();
        (received, Box::new(move |r| sink.lock().push(r)))
    }

    const A: DeviceId = DeviceId(1);
    const B: DeviceId = DeviceId(2);

    #[test]
    fn test_dispatch_reaches_matching_listener_only() {
        let router = NotificationRouter::new();
        let (received_a, listener_a) = recorder();
        let (received_b, listener_b) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener_a);
        router.register(B, Characteristic::BatteryLevel, battery, listener_b);

        assert!(router.dispatch(&NotificationEnvelope::value(
            A,
            Characteristic::BatteryLevel,
            vec![80]
        )));
        assert!(!router.dispatch(&NotificationEnvelope::value(
            A,
            Characteristic::CameraPower,
            vec![1]
        )));

        assert_eq!(*received_a.lock(), vec![Ok(80)]);
        assert!(received_b.lock().is_empty());
    }

    #[test]
    fn test_peripheral_error_and_decode_error() {
        let router = NotificationRouter::new();
        let (received, listener) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener);

        let soft = PeripheralError::new("0x02", "battery low");
        router.dispatch(&NotificationEnvelope::failure(
            A,
            Characteristic::BatteryLevel,
            soft.clone(),
        ));
        router.dispatch(&NotificationEnvelope::value(
            A,
            Characteristic::BatteryLevel,
            vec![],
        ));

        let received = received.lock();
        assert_eq!(received[0], Err(ThetaBleError::Peripheral(soft)));
        assert_eq!(
            received[1],
            Err(ThetaBleError::Protocol(ProtocolError::Empty {
                what: "battery level"
            }))
        );
    }

    #[test]
    fn test_register_replaces_previous_listener() {
        let router = NotificationRouter::new();
        let (old, listener) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener);
        let (new, listener) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener);

        router.dispatch(&NotificationEnvelope::value(
            A,
            Characteristic::BatteryLevel,
            vec![10],
        ));
        assert!(old.lock().is_empty());
        assert_eq!(*new.lock(), vec![Ok(10)]);
        assert_eq!(router.listener_count(), 1);
    }

    #[test]
    fn test_unregister_device_stops_delivery() {
        let router = NotificationRouter::new();
        let (received, listener) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener);
        let (_, listener) = recorder();
        router.register(A, Characteristic::CameraPower, battery, listener);
        let (other, listener) = recorder();
        router.register(B, Characteristic::BatteryLevel, battery, listener);

        assert_eq!(router.unregister_device(A), 2);
        assert!(!router.is_registered(A, Characteristic::BatteryLevel));

        router.dispatch(&NotificationEnvelope::value(
            A,
            Characteristic::BatteryLevel,
            vec![1],
        ));
        router.dispatch(&NotificationEnvelope::value(
            B,
            Characteristic::BatteryLevel,
            vec![2],
        ));
        assert!(received.lock().is_empty());
        assert_eq!(*other.lock(), vec![Ok(2)]);
        assert!(!router.unregister(A, Characteristic::BatteryLevel));
    }

    #[tokio::test]
    async fn test_unregister_waits_for_in_flight_delivery() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let router = Arc::new(NotificationRouter::new());
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        router.register(
            A,
            Characteristic::BatteryLevel,
            battery,
            Box::new(move |_| {
                std::thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::SeqCst);
            }),
        );

        let dispatcher = router.clone();
        let delivery = tokio::task::spawn_blocking(move || {
            dispatcher.dispatch(&NotificationEnvelope::value(
                A,
                Characteristic::BatteryLevel,
                vec![5],
            ))
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let unregistering = router.clone();
        tokio::task::spawn_blocking(move || {
            unregistering.unregister(A, Characteristic::BatteryLevel)
        })
        .await
        .unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(delivery.await.unwrap());
    }

    #[test]
    fn test_register_racing_unregister_never_loses_listener() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..200 {
            let router = Arc::new(NotificationRouter::new());
            let barrier = Arc::new(Barrier::new(2));

            let registering = {
                let router = router.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let (_, listener) = recorder();
                    barrier.wait();
                    router.register(A, Characteristic::BatteryLevel, battery, listener);
                })
            };
            let unregistering = {
                let router = router.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    router.unregister(A, Characteristic::BatteryLevel)
                })
            };
            registering.join().unwrap();
            let removed = unregistering.join().unwrap();

            // Either the unregister removed the listener or it ran first
            // and the listener is live
            assert!(
                removed || router.is_registered(A, Characteristic::BatteryLevel),
                "listener lost"
            );
            assert_eq!(router.listener_count(), usize::from(!removed));
        }
    }

    #[tokio::test]
    async fn test_run_drains_inbound_channel_in_order() {
        let router = Arc::new(NotificationRouter::new());
        let (received, listener) = recorder();
        router.register(A, Characteristic::BatteryLevel, battery, listener);

        let (tx, rx) = mpsc::unbounded_channel();
        for level in [30, 20, 10] {
            tx.send(NotificationEnvelope::value(
                A,
                Characteristic::BatteryLevel,
                vec![level],
            ))
            .unwrap();
        }
        drop(tx);
        router.clone().run(rx).await;

        assert_eq!(*received.lock(), vec![Ok(30), Ok(20), Ok(10)]);
    }
}
