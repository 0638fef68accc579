//! BLE Connection Module
//!
//! A [`Session`] owns the link to one camera: connection lifecycle, pairing
//! bootstrap, and characteristic level read / write / observe.
//!
//! ```text
//! Disconnected ──connect──> Connecting ──ok──> Connected
//!      ^                        │                  │
//!      └───────error/timeout────┘            disconnect
//!      ^                                           │
//!      └──────────────── Disconnecting <───────────┘
//! ```

use crate::codec::values::encode_text;
use crate::domain::models::{ConnectionState, DeviceHandle, DeviceId};
use crate::domain::registry::DeviceRegistry;
use crate::domain::settings::ClientSettings;
use crate::error::{Result, ThetaBleError};
use crate::infrastructure::bluetooth::protocol::{Characteristic, ServiceKind};
use crate::infrastructure::bluetooth::router::{
    Decoder, Listener, NotificationEnvelope, NotificationRouter,
};
use crate::infrastructure::bluetooth::transport::{BlePlatform, NotificationStream, Peripheral};
use anyhow::{anyhow, Context};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for link setup, MTU negotiation and pairing bootstrap
    pub connect_timeout: Duration,
    /// MTU requested once the link is up
    pub mtu: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for SessionConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            mtu: settings.mtu,
        }
    }
}

struct Link {
    state: ConnectionState,
    peripheral: Option<Arc<dyn Peripheral>>,
    mtu: Option<u16>,
    auth_uuid: Option<String>,
    /// Forwarding task per observed characteristic
    observations: HashMap<Characteristic, JoinHandle<()>>,
    released: bool,
}

/// Connection to one camera.
pub struct Session {
    handle: DeviceHandle,
    platform: Arc<dyn BlePlatform>,
    registry: Arc<DeviceRegistry>,
    router: Arc<NotificationRouter>,
    config: SessionConfig,
    link: Mutex<Link>,
}

impl Session {
    pub fn new(
        handle: DeviceHandle,
        platform: Arc<dyn BlePlatform>,
        registry: Arc<DeviceRegistry>,
        router: Arc<NotificationRouter>,
        config: SessionConfig,
    ) -> Self {
        let auth_uuid = handle.auth_uuid.clone();
        Self {
            handle,
            platform,
            registry,
            router,
            config,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                peripheral: None,
                mtu: None,
                auth_uuid,
                observations: HashMap::new(),
                released: false,
            }),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.handle.id
    }

    /// Current view of the handle, including the auth uuid of the last
    /// successful connect.
    pub fn handle(&self) -> DeviceHandle {
        let mut handle = self.handle.clone();
        handle.auth_uuid = self.link.lock().auth_uuid.clone();
        handle
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_released(&self) -> bool {
        self.link.lock().released
    }

    /// MTU negotiated at connect time, if the peripheral agreed to one.
    pub fn mtu(&self) -> Option<u16> {
        self.link.lock().mtu
    }

    /// Connect using the configured timeout.
    ///
    /// When `auth_uuid` is given it is written to the Bluetooth Control
    /// auth characteristic once the link is up, which is what makes the
    /// camera remember this client.
    pub async fn connect(&self, auth_uuid: Option<&str>) -> Result<()> {
        self.connect_with_timeout(auth_uuid, self.config.connect_timeout)
            .await
    }

    pub async fn connect_with_timeout(
        &self,
        auth_uuid: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        if auth_uuid == Some("") {
            return Err(ThetaBleError::InvalidArgument(
                "auth uuid must not be empty".to_string(),
            ));
        }

        {
            let mut link = self.link.lock();
            if link.released {
                return Err(ThetaBleError::InvalidState(format!(
                    "session for {} has been released",
                    self.handle.name
                )));
            }
            if link.state != ConnectionState::Disconnected {
                return Err(ThetaBleError::InvalidState(format!(
                    "cannot connect while {}",
                    link.state
                )));
            }
            link.state = ConnectionState::Connecting;
        }

        info!("Connecting to {} ({})", self.handle.name, self.handle.id);

        let (peripheral, mtu) = match self.establish(auth_uuid, timeout).await {
            Ok(established) => established,
            Err(e) => {
                self.link.lock().state = ConnectionState::Disconnected;
                warn!("Connection to {} failed: {:#}", self.handle.name, e);
                return Err(ThetaBleError::transport("connect", e));
            }
        };

        let released = {
            let mut link = self.link.lock();
            if link.released {
                link.state = ConnectionState::Disconnected;
                true
            } else {
                link.state = ConnectionState::Connected;
                link.peripheral = Some(peripheral.clone());
                link.mtu = mtu;
                if let Some(uuid) = auth_uuid {
                    link.auth_uuid = Some(uuid.to_string());
                }
                false
            }
        };

        if released {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect after release failed: {:#}", e);
            }
            return Err(ThetaBleError::InvalidState(format!(
                "session for {} was released while connecting",
                self.handle.name
            )));
        }

        if let Some(uuid) = auth_uuid {
            self.registry
                .set_auth_uuid(self.handle.id, Some(uuid.to_string()));
        }
        info!("Connected to {} (mtu: {:?})", self.handle.name, mtu);
        Ok(())
    }

    /// Link setup under `timeout`. On failure the peripheral is
    /// disconnected best-effort before the error is returned.
    async fn establish(
        &self,
        auth_uuid: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<(Arc<dyn Peripheral>, Option<u16>)> {
        let peripheral = self
            .platform
            .peripheral(&self.handle.name)
            .context("peripheral unavailable")?;

        let handshake = async {
            peripheral.connect().await.context("link setup failed")?;

            let mtu = match peripheral.request_mtu(self.config.mtu).await {
                Ok(mtu) => Some(mtu),
                Err(e) => {
                    warn!("MTU request failed, keeping default: {:#}", e);
                    None
                }
            };

            if let Some(uuid) = auth_uuid {
                debug!("Writing auth uuid to {}", self.handle.name);
                peripheral
                    .write(
                        Characteristic::AuthBluetoothDevice.uuid(),
                        &encode_text(uuid),
                    )
                    .await
                    .context("auth uuid write failed")?;
            }
            anyhow::Ok(mtu)
        };

        let outcome = match tokio::time::timeout(timeout, handshake).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!("timed out after {:?}", timeout)),
        };

        match outcome {
            Ok(mtu) => Ok((peripheral, mtu)),
            Err(e) => {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    debug!("Cleanup disconnect failed: {:#}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    /// Tear the link down. The session always ends up `Disconnected`, even
    /// when the transport reports an error.
    pub async fn disconnect(&self) -> Result<()> {
        let peripheral = {
            let mut link = self.link.lock();
            if link.state != ConnectionState::Connected {
                return Err(ThetaBleError::NotConnected {
                    operation: "disconnect",
                });
            }
            link.state = ConnectionState::Disconnecting;
            link.peripheral.take()
        };

        info!("Disconnecting from {}", self.handle.name);
        self.cancel_observations(peripheral.as_ref()).await;

        let result = match &peripheral {
            Some(peripheral) => peripheral.disconnect().await,
            None => Ok(()),
        };

        {
            let mut link = self.link.lock();
            link.state = ConnectionState::Disconnected;
            link.mtu = None;
        }

        result.map_err(|e| ThetaBleError::transport("disconnect", e))
    }

    pub async fn read(&self, characteristic: Characteristic) -> Result<Vec<u8>> {
        let peripheral = self.connected_peripheral("read")?;
        self.ensure_exposed(peripheral.as_ref(), characteristic)?;
        let bytes = peripheral
            .read(characteristic.uuid())
            .await
            .map_err(|e| ThetaBleError::transport("read", e))?;
        trace!("Read {} ({} bytes)", characteristic, bytes.len());
        Ok(bytes)
    }

    pub async fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<()> {
        let peripheral = self.connected_peripheral("write")?;
        self.ensure_exposed(peripheral.as_ref(), characteristic)?;
        trace!("Write {} ({} bytes)", characteristic, data.len());
        peripheral
            .write(characteristic.uuid(), data)
            .await
            .map_err(|e| ThetaBleError::transport("write", e))
    }

    /// Deliver every notification of `characteristic` to `listener`,
    /// decoded with `decode`. Replaces an existing observation.
    pub async fn observe<T: 'static>(
        &self,
        characteristic: Characteristic,
        decode: Decoder<T>,
        listener: Listener<T>,
    ) -> Result<()> {
        let peripheral = self.connected_peripheral("observe")?;
        self.ensure_exposed(peripheral.as_ref(), characteristic)?;

        if let Some(previous) = self.link.lock().observations.remove(&characteristic) {
            previous.abort();
        }

        let id = self.handle.id;
        self.router.register(id, characteristic, decode, listener);

        let stream = match peripheral.observe(characteristic.uuid()).await {
            Ok(stream) => stream,
            Err(e) => {
                self.router.unregister(id, characteristic);
                return Err(ThetaBleError::transport("observe", e));
            }
        };

        let task = tokio::spawn(forward(self.router.clone(), id, characteristic, stream));

        let mut link = self.link.lock();
        if link.state != ConnectionState::Connected {
            drop(link);
            task.abort();
            self.router.unregister(id, characteristic);
            return Err(ThetaBleError::NotConnected {
                operation: "observe",
            });
        }
        if let Some(previous) = link.observations.insert(characteristic, task) {
            previous.abort();
        }
        debug!("Observing {} on {}", characteristic, self.handle.name);
        Ok(())
    }

    /// Stop observing. No notification reaches the listener once this
    /// returns; a failing transport unsubscribe is only logged.
    pub async fn unobserve(&self, characteristic: Characteristic) -> Result<()> {
        let peripheral = self.connected_peripheral("unobserve")?;

        self.router.unregister(self.handle.id, characteristic);
        let task = self.link.lock().observations.remove(&characteristic);
        if let Some(task) = task {
            task.abort();
        }

        if let Err(e) = peripheral.unobserve(characteristic.uuid()).await {
            warn!("Unsubscribe from {} failed: {:#}", characteristic, e);
        }
        Ok(())
    }

    pub fn supports_service(&self, service: ServiceKind) -> Result<bool> {
        let peripheral = self.connected_peripheral("supports_service")?;
        Ok(peripheral.contains_service(service.uuid()))
    }

    pub fn supports_characteristic(&self, characteristic: Characteristic) -> Result<bool> {
        let peripheral = self.connected_peripheral("supports_characteristic")?;
        Ok(peripheral.contains_characteristic(characteristic.uuid()))
    }

    /// Drop every listener, disconnect if needed and forget the handle.
    /// Calling it again does nothing.
    pub async fn release(&self) {
        let connected = {
            let mut link = self.link.lock();
            if link.released {
                return;
            }
            link.released = true;
            link.state == ConnectionState::Connected
        };

        let removed = self.router.unregister_device(self.handle.id);
        if connected {
            if let Err(e) = self.disconnect().await {
                warn!("Disconnect during release failed: {}", e);
            }
        } else {
            self.cancel_observations(None).await;
        }
        self.registry.release(self.handle.id);
        info!(
            "Released {} ({} listener(s) removed)",
            self.handle.name, removed
        );
    }

    fn connected_peripheral(&self, operation: &'static str) -> Result<Arc<dyn Peripheral>> {
        let link = self.link.lock();
        match (&link.state, &link.peripheral) {
            (ConnectionState::Connected, Some(peripheral)) => Ok(peripheral.clone()),
            _ => Err(ThetaBleError::NotConnected { operation }),
        }
    }

    fn ensure_exposed(&self, peripheral: &dyn Peripheral, characteristic: Characteristic) -> Result<()> {
        if peripheral.contains_characteristic(characteristic.uuid()) {
            Ok(())
        } else {
            Err(ThetaBleError::Unsupported(format!(
                "{} does not expose {}",
                self.handle.name, characteristic
            )))
        }
    }

    /// Unregister and stop every observation. `peripheral` is asked to
    /// unsubscribe when given.
    async fn cancel_observations(&self, peripheral: Option<&Arc<dyn Peripheral>>) {
        let observations: Vec<_> = self.link.lock().observations.drain().collect();
        for (characteristic, task) in observations {
            self.router.unregister(self.handle.id, characteristic);
            task.abort();
            if let Some(peripheral) = peripheral {
                if let Err(e) = peripheral.unobserve(characteristic.uuid()).await {
                    debug!("Unsubscribe from {} failed: {:#}", characteristic, e);
                }
            }
        }
    }
}

/// A session dropped without `release` still drops its listeners and
/// closes the link, so the next session for the handle starts clean. The
/// handle itself stays registered.
impl Drop for Session {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        for (_, task) in link.observations.drain() {
            task.abort();
        }
        if link.released {
            return;
        }

        let removed = self.router.unregister_device(self.handle.id);
        if removed > 0 {
            debug!(
                "Dropped session for {} removed {} listener(s)",
                self.handle.name, removed
            );
        }

        let Some(peripheral) = link.peripheral.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let name = self.handle.name.clone();
                runtime.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!("Disconnect of dropped session for {} failed: {:#}", name, e);
                    }
                });
            }
            Err(_) => warn!(
                "Session for {} dropped outside a runtime; link left open",
                self.handle.name
            ),
        }
    }
}

/// Pump one notification stream into the router until it ends or the task
/// is aborted.
async fn forward(
    router: Arc<NotificationRouter>,
    device_id: DeviceId,
    characteristic: Characteristic,
    mut stream: NotificationStream,
) {
    while let Some(item) = stream.next().await {
        let envelope = match item {
            Ok(params) => NotificationEnvelope::value(device_id, characteristic, params),
            Err(error) => NotificationEnvelope::failure(device_id, characteristic, error),
        };
        router.dispatch(&envelope);
    }
    debug!(
        "Notification stream for {} on {} ended",
        characteristic, device_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::values::decode_u8;
    use crate::domain::models::PeripheralError;
    use crate::error::{ErrorKind, ProtocolError};
    use crate::infrastructure::bluetooth::mock::{MockOperation, MockPeripheral, MockPlatform};

    const NAME: &str = "AB12345678";

    struct Fixture {
        session: Session,
        peripheral: Arc<MockPeripheral>,
        registry: Arc<DeviceRegistry>,
        router: Arc<NotificationRouter>,
    }

    fn fixture(peripheral: MockPeripheral) -> Fixture {
        let peripheral = Arc::new(peripheral);
        let platform = MockPlatform::new().with_peripheral(NAME, peripheral.clone());
        let registry = Arc::new(DeviceRegistry::new());
        let router = Arc::new(NotificationRouter::new());
        let handle = registry.register(NAME, None);
        let session = Session::new(
            handle,
            Arc::new(platform),
            registry.clone(),
            router.clone(),
            SessionConfig {
                connect_timeout: Duration::from_millis(100),
                mtu: 512,
            },
        );
        Fixture {
            session,
            peripheral,
            registry,
            router,
        }
    }

    fn battery(bytes: &[u8]) -> std::result::Result<u8, ProtocolError> {
        decode_u8("battery level", bytes)
    }

    type Received = Arc<Mutex<Vec<Result<u8>>>>;

    fn recorder() -> (Received, Listener<u8>) {
        let received: Received = Arc::default();
        let sink = received.clone();
        (received, Box::new(move |r| sink.lock().push(r)))
    }

    /// Let the forwarding tasks drain their channels.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let f = fixture(MockPeripheral::theta());
        assert_eq!(
            f.session.read(Characteristic::BatteryLevel).await,
            Err(ThetaBleError::NotConnected { operation: "read" })
        );
        assert_eq!(
            f.session.write(Characteristic::CameraPower, &[1]).await,
            Err(ThetaBleError::NotConnected { operation: "write" })
        );
        let (_, listener) = recorder();
        let err = f
            .session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CallerMisuse);
        assert!(f.session.disconnect().await.is_err());
        assert_eq!(f.router.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_operations_after_disconnect_are_caller_misuse() {
        let f = fixture(MockPeripheral::theta().with_value(Characteristic::BatteryLevel, &[0x50]));
        f.session.connect(None).await.unwrap();
        f.session.read(Characteristic::BatteryLevel).await.unwrap();
        f.session.disconnect().await.unwrap();

        let read = f.session.read(Characteristic::BatteryLevel).await.unwrap_err();
        let write = f
            .session
            .write(Characteristic::CameraPower, &[0x01])
            .await
            .unwrap_err();
        let (received, listener) = recorder();
        let observe = f
            .session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap_err();

        assert_eq!(read, ThetaBleError::NotConnected { operation: "read" });
        assert_eq!(write, ThetaBleError::NotConnected { operation: "write" });
        assert_eq!(
            observe,
            ThetaBleError::NotConnected {
                operation: "observe"
            }
        );
        for err in [&read, &write, &observe] {
            assert_eq!(err.kind(), ErrorKind::CallerMisuse);
            assert!(!matches!(err, ThetaBleError::Transport { .. }));
        }

        // Nothing reached the transport after the disconnect
        assert!(f.peripheral.writes(Characteristic::CameraPower).is_empty());
        assert!(!f.peripheral.is_observed(Characteristic::BatteryLevel));
        assert_eq!(f.router.listener_count(), 0);
        f.peripheral.notify(Characteristic::BatteryLevel, &[10]);
        settle().await;
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_connect_negotiates_mtu_and_writes_auth_uuid() {
        let f = fixture(MockPeripheral::theta().with_mtu(185));
        f.session.connect(Some("00112233-4455")).await.unwrap();

        assert!(f.session.is_connected());
        assert_eq!(f.session.mtu(), Some(185));
        assert_eq!(
            f.peripheral.writes(Characteristic::AuthBluetoothDevice),
            vec![b"00112233-4455".to_vec()]
        );
        assert_eq!(
            f.session.handle().auth_uuid.as_deref(),
            Some("00112233-4455")
        );
        assert_eq!(
            f.registry.get(f.session.id()).unwrap().auth_uuid.as_deref(),
            Some("00112233-4455")
        );

        let err = f.session.connect(None).await.unwrap_err();
        assert!(matches!(err, ThetaBleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_mtu_failure_is_not_fatal() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::RequestMtu));
        f.session.connect(None).await.unwrap();
        assert!(f.session.is_connected());
        assert_eq!(f.session.mtu(), None);
    }

    #[tokio::test]
    async fn test_empty_auth_uuid_is_rejected() {
        let f = fixture(MockPeripheral::theta());
        let err = f.session.connect(Some("")).await.unwrap_err();
        assert!(matches!(err, ThetaBleError::InvalidArgument(_)));
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_reverts_to_disconnected() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::Connect));
        let err = f.session.connect(None).await.unwrap_err();
        assert!(matches!(
            err,
            ThetaBleError::Transport {
                operation: "connect",
                ..
            }
        ));
        assert_eq!(f.session.state(), ConnectionState::Disconnected);

        f.peripheral.set_failing(MockOperation::Connect, false);
        f.session.connect(None).await.unwrap();
        assert!(f.session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_timeout_leaves_disconnected() {
        let f = fixture(MockPeripheral::theta().with_connect_delay(Duration::from_secs(30)));
        let err = f
            .session
            .connect_with_timeout(None, Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            ThetaBleError::Transport { operation, message } => {
                assert_eq!(operation, "connect");
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
        assert!(!f.peripheral.is_connected());
    }

    #[tokio::test]
    async fn test_failed_auth_write_disconnects() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::Write));
        let err = f.session.connect(Some("uuid")).await.unwrap_err();
        assert!(err.to_string().contains("auth uuid write failed"));
        assert!(!f.peripheral.is_connected());
        assert_eq!(f.session.handle().auth_uuid, None);
    }

    #[tokio::test]
    async fn test_read_write_and_transport_failures() {
        let f = fixture(MockPeripheral::theta().with_value(Characteristic::BatteryLevel, &[0x50]));
        f.session.connect(None).await.unwrap();

        assert_eq!(
            f.session.read(Characteristic::BatteryLevel).await,
            Ok(vec![0x50])
        );
        // Empty reads are handed to the codec unchanged
        assert_eq!(f.session.read(Characteristic::ModelNumber).await, Ok(vec![]));

        f.session
            .write(Characteristic::CameraPower, &[0x01])
            .await
            .unwrap();
        assert_eq!(
            f.peripheral.writes(Characteristic::CameraPower),
            vec![vec![0x01]]
        );

        f.peripheral.set_failing(MockOperation::Write, true);
        let err = f
            .session
            .write(Characteristic::CameraPower, &[0x00])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ThetaBleError::Transport {
                operation: "write",
                ..
            }
        ));
        assert!(f.session.is_connected());
    }

    #[tokio::test]
    async fn test_missing_characteristic_is_unsupported() {
        let f = fixture(
            MockPeripheral::new()
                .with_services(&[ServiceKind::CameraInformation])
                .without_characteristic(Characteristic::WlanMacAddress),
        );
        f.session.connect(None).await.unwrap();

        let err = f
            .session
            .read(Characteristic::WlanMacAddress)
            .await
            .unwrap_err();
        assert!(matches!(err, ThetaBleError::Unsupported(_)));
        assert_eq!(f.session.supports_service(ServiceKind::CameraInformation), Ok(true));
        assert_eq!(
            f.session.supports_service(ServiceKind::ShootingControlCommand),
            Ok(false)
        );
        assert_eq!(
            f.session
                .supports_characteristic(Characteristic::SerialNumber),
            Ok(true)
        );
    }

    #[tokio::test]
    async fn test_observe_delivers_values_and_soft_errors_in_order() {
        let f = fixture(MockPeripheral::theta());
        f.session.connect(None).await.unwrap();
        let (received, listener) = recorder();
        f.session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap();

        let soft = PeripheralError::new("0x02", "battery low");
        f.peripheral.notify(Characteristic::BatteryLevel, &[90]);
        f.peripheral.notify(Characteristic::BatteryLevel, &[80]);
        f.peripheral
            .notify_error(Characteristic::BatteryLevel, soft.clone());
        f.peripheral.notify(Characteristic::BatteryLevel, &[]);
        settle().await;

        let received = received.lock();
        assert_eq!(received.len(), 4);
        assert_eq!(received[0], Ok(90));
        assert_eq!(received[1], Ok(80));
        assert_eq!(received[2], Err(ThetaBleError::Peripheral(soft)));
        assert_eq!(received[3].as_ref().unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_observe_again_replaces_listener() {
        let f = fixture(MockPeripheral::theta());
        f.session.connect(None).await.unwrap();
        let (old, listener) = recorder();
        f.session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap();
        let (new, listener) = recorder();
        f.session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap();

        f.peripheral.notify(Characteristic::BatteryLevel, &[42]);
        settle().await;
        assert!(old.lock().is_empty());
        assert_eq!(*new.lock(), vec![Ok(42)]);
        assert_eq!(f.router.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_observe_failure_unregisters_listener() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::Observe));
        f.session.connect(None).await.unwrap();
        let (_, listener) = recorder();
        let err = f
            .session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ThetaBleError::Transport {
                operation: "observe",
                ..
            }
        ));
        assert_eq!(f.router.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unobserve_stops_delivery_even_if_transport_fails() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::Unobserve));
        f.session.connect(None).await.unwrap();
        let (received, listener) = recorder();
        f.session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap();

        f.session
            .unobserve(Characteristic::BatteryLevel)
            .await
            .unwrap();
        // The transport subscription is still open, but nothing arrives
        assert!(f.peripheral.is_observed(Characteristic::BatteryLevel));
        f.peripheral.notify(Characteristic::BatteryLevel, &[10]);
        settle().await;
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_observations() {
        let f = fixture(MockPeripheral::theta());
        f.session.connect(None).await.unwrap();
        let (_, listener) = recorder();
        f.session
            .observe(Characteristic::CameraPower, battery, listener)
            .await
            .unwrap();

        f.session.disconnect().await.unwrap();
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
        assert_eq!(f.router.listener_count(), 0);
        assert_eq!(f.peripheral.unobserved(), vec![Characteristic::CameraPower]);
        assert_eq!(f.session.mtu(), None);
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_resets_state() {
        let f = fixture(MockPeripheral::theta().failing(MockOperation::Disconnect));
        f.session.connect(None).await.unwrap();
        let err = f.session.disconnect().await.unwrap_err();
        assert!(matches!(
            err,
            ThetaBleError::Transport {
                operation: "disconnect",
                ..
            }
        ));
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_release_stops_listeners_and_forgets_handle() {
        let f = fixture(MockPeripheral::theta());
        f.session.connect(None).await.unwrap();
        let (received, listener) = recorder();
        f.session
            .observe(Characteristic::BatteryLevel, battery, listener)
            .await
            .unwrap();

        f.session.release().await;
        f.session.release().await;

        f.peripheral.notify(Characteristic::BatteryLevel, &[10]);
        f.router.dispatch(&NotificationEnvelope::value(
            f.session.id(),
            Characteristic::BatteryLevel,
            vec![10],
        ));
        settle().await;

        assert!(received.lock().is_empty());
        assert!(!f.peripheral.is_connected());
        assert!(!f.registry.contains(f.session.id()));
        assert!(matches!(
            f.session.connect(None).await,
            Err(ThetaBleError::InvalidState(_))
        ));
    }
}
