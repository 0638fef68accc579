//! Simulated BLE stack
//!
//! An in-process [`BlePlatform`] / [`Peripheral`] pair with scripted
//! advertisements, stored characteristic values, a write log, push
//! notifications and per-operation failure injection. Used by the tests and
//! handy for exercising a host application without a camera nearby.

use crate::domain::models::{Advertisement, PeripheralError};
use crate::infrastructure::bluetooth::protocol::{Characteristic, ServiceKind};
use crate::infrastructure::bluetooth::transport::{
    AdvertisementStream, BlePlatform, NotificationStream, Peripheral,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct PlatformState {
    advertisements: Vec<Advertisement>,
    keep_scanning: bool,
    fail_scan: bool,
    peripherals: HashMap<String, Arc<MockPeripheral>>,
}

/// Scripted platform. Clones share state.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertisements replayed by every scan, in order.
    pub fn with_advertisements(self, advertisements: Vec<Advertisement>) -> Self {
        self.state.lock().advertisements = advertisements;
        self
    }

    /// Keep the scan stream open after the scripted advertisements, like a
    /// real radio would.
    pub fn keep_scanning(self) -> Self {
        self.state.lock().keep_scanning = true;
        self
    }

    pub fn fail_scan(self) -> Self {
        self.state.lock().fail_scan = true;
        self
    }

    pub fn with_peripheral(self, name: &str, peripheral: Arc<MockPeripheral>) -> Self {
        self.add_peripheral(name, peripheral);
        self
    }

    pub fn add_peripheral(&self, name: &str, peripheral: Arc<MockPeripheral>) {
        self.state
            .lock()
            .peripherals
            .insert(name.to_string(), peripheral);
    }

    pub fn mock_peripheral(&self, name: &str) -> Option<Arc<MockPeripheral>> {
        self.state.lock().peripherals.get(name).cloned()
    }
}

#[async_trait]
impl BlePlatform for MockPlatform {
    async fn start_scan(&self) -> Result<AdvertisementStream> {
        let state = self.state.lock();
        if state.fail_scan {
            bail!("bluetooth adapter is powered off");
        }
        let scripted = stream::iter(state.advertisements.clone());
        if state.keep_scanning {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    fn peripheral(&self, name: &str) -> Result<Arc<dyn Peripheral>> {
        let peripheral = self
            .mock_peripheral(name)
            .ok_or_else(|| anyhow!("no peripheral named {name}"))?;
        Ok(peripheral as Arc<dyn Peripheral>)
    }
}

/// Transport operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Connect,
    Disconnect,
    Read,
    Write,
    RequestMtu,
    Observe,
    Unobserve,
}

type Subscriber = mpsc::UnboundedSender<Result<Vec<u8>, PeripheralError>>;

struct PeripheralState {
    connected: bool,
    services: HashSet<Uuid>,
    characteristics: HashSet<Uuid>,
    values: HashMap<Uuid, Vec<u8>>,
    writes: Vec<(Uuid, Vec<u8>)>,
    failing: HashSet<MockOperation>,
    connect_delay: Option<Duration>,
    mtu: u16,
    subscribers: HashMap<Uuid, Subscriber>,
    unobserved: Vec<Uuid>,
}

/// Scripted camera.
pub struct MockPeripheral {
    state: Mutex<PeripheralState>,
}

impl Default for MockPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPeripheral {
    /// A peripheral exposing nothing.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PeripheralState {
                connected: false,
                services: HashSet::new(),
                characteristics: HashSet::new(),
                values: HashMap::new(),
                writes: Vec::new(),
                failing: HashSet::new(),
                connect_delay: None,
                mtu: 247,
                subscribers: HashMap::new(),
                unobserved: Vec::new(),
            }),
        }
    }

    /// A peripheral exposing the whole THETA profile.
    pub fn theta() -> Self {
        Self::new().with_services(&ServiceKind::ALL)
    }

    pub fn with_services(self, services: &[ServiceKind]) -> Self {
        {
            let mut state = self.state.lock();
            for service in services {
                state.services.insert(service.uuid());
                state
                    .characteristics
                    .extend(service.characteristics().map(Characteristic::uuid));
            }
        }
        self
    }

    pub fn without_characteristic(self, characteristic: Characteristic) -> Self {
        self.state
            .lock()
            .characteristics
            .remove(&characteristic.uuid());
        self
    }

    pub fn with_value(self, characteristic: Characteristic, value: &[u8]) -> Self {
        self.set_value(characteristic, value);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.state.lock().connect_delay = Some(delay);
        self
    }

    /// Largest MTU the peripheral accepts.
    pub fn with_mtu(self, mtu: u16) -> Self {
        self.state.lock().mtu = mtu;
        self
    }

    pub fn failing(self, operation: MockOperation) -> Self {
        self.set_failing(operation, true);
        self
    }

    pub fn set_failing(&self, operation: MockOperation, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(operation);
        } else {
            state.failing.remove(&operation);
        }
    }

    pub fn set_value(&self, characteristic: Characteristic, value: &[u8]) {
        self.state
            .lock()
            .values
            .insert(characteristic.uuid(), value.to_vec());
    }

    pub fn value(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
        self.state.lock().values.get(&characteristic.uuid()).cloned()
    }

    /// Payloads written to one characteristic, oldest first.
    pub fn writes(&self, characteristic: Characteristic) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic.uuid())
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_observed(&self, characteristic: Characteristic) -> bool {
        self.state
            .lock()
            .subscribers
            .contains_key(&characteristic.uuid())
    }

    /// Characteristics the client asked to stop observing, in order.
    pub fn unobserved(&self) -> Vec<Characteristic> {
        self.state
            .lock()
            .unobserved
            .iter()
            .filter_map(|uuid| Characteristic::from_uuid(*uuid))
            .collect()
    }

    /// Push a value notification. Returns `false` when nobody observes.
    pub fn notify(&self, characteristic: Characteristic, value: &[u8]) -> bool {
        self.push(characteristic, Ok(value.to_vec()))
    }

    /// Push an error the camera reports out of band.
    pub fn notify_error(&self, characteristic: Characteristic, error: PeripheralError) -> bool {
        self.push(characteristic, Err(error))
    }

    fn push(
        &self,
        characteristic: Characteristic,
        item: Result<Vec<u8>, PeripheralError>,
    ) -> bool {
        let state = self.state.lock();
        match state.subscribers.get(&characteristic.uuid()) {
            Some(sender) => sender.unbounded_send(item).is_ok(),
            None => false,
        }
    }

    fn check(&self, operation: MockOperation) -> Result<()> {
        let state = self.state.lock();
        if state.failing.contains(&operation) {
            bail!("simulated {:?} failure", operation);
        }
        if operation != MockOperation::Connect && !state.connected {
            bail!("peripheral is not connected");
        }
        Ok(())
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    async fn connect(&self) -> Result<()> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(MockOperation::Connect)?;
        self.state.lock().connected = true;
        debug!("Mock peripheral connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscribers.clear();
        if state.failing.contains(&MockOperation::Disconnect) {
            bail!("simulated Disconnect failure");
        }
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check(MockOperation::Read)?;
        Ok(self
            .state
            .lock()
            .values
            .get(&characteristic)
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.check(MockOperation::Write)?;
        let mut state = self.state.lock();
        state.writes.push((characteristic, data.to_vec()));
        state.values.insert(characteristic, data.to_vec());
        Ok(())
    }

    async fn request_mtu(&self, size: u16) -> Result<u16> {
        self.check(MockOperation::RequestMtu)?;
        Ok(size.min(self.state.lock().mtu))
    }

    async fn observe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.check(MockOperation::Observe)?;
        let (sender, receiver) = mpsc::unbounded();
        self.state.lock().subscribers.insert(characteristic, sender);
        Ok(receiver.boxed())
    }

    async fn unobserve(&self, characteristic: Uuid) -> Result<()> {
        self.check(MockOperation::Unobserve)?;
        let mut state = self.state.lock();
        state.unobserved.push(characteristic);
        state.subscribers.remove(&characteristic);
        Ok(())
    }

    fn contains_characteristic(&self, characteristic: Uuid) -> bool {
        self.state.lock().characteristics.contains(&characteristic)
    }

    fn contains_service(&self, service: Uuid) -> bool {
        self.state.lock().services.contains(&service)
    }
}
