//! Bluetooth Service Module
//!
//! Client context that ties scanning, sessions and notification routing
//! together, plus the [`ThetaDevice`] facade for option level access.

use crate::codec::options::{OptionName, ThetaOptions, MAX_SHUTTER_VOLUME};
use crate::domain::models::{DeviceHandle, DeviceId};
use crate::domain::registry::DeviceRegistry;
use crate::domain::settings::ClientSettings;
use crate::error::{Result, ThetaBleError};
use crate::infrastructure::bluetooth::commands::{service_for, ThetaService};
use crate::infrastructure::bluetooth::connection::{Session, SessionConfig};
use crate::infrastructure::bluetooth::protocol::{Characteristic, ServiceKind};
use crate::infrastructure::bluetooth::router::NotificationRouter;
use crate::infrastructure::bluetooth::scanner::BleScanner;
use crate::infrastructure::bluetooth::transport::BlePlatform;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Main Bluetooth context coordinating all BLE operations
///
/// Owns the device table and the notification router; both live exactly as
/// long as the context.
pub struct ThetaBle {
    platform: Arc<dyn BlePlatform>,
    registry: Arc<DeviceRegistry>,
    router: Arc<NotificationRouter>,
    scanner: BleScanner,
    settings: ClientSettings,
    sessions: Mutex<HashMap<DeviceId, Weak<Session>>>,
}

impl ThetaBle {
    /// Create a new context on top of a platform BLE stack
    pub fn new(platform: Arc<dyn BlePlatform>, settings: ClientSettings) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        Self {
            scanner: BleScanner::new(platform.clone(), registry.clone()),
            platform,
            registry,
            router: Arc::new(NotificationRouter::new()),
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn router(&self) -> Arc<NotificationRouter> {
        self.router.clone()
    }

    /// Scan with the configured timeout
    pub async fn scan(&self, name_filter: Option<&str>) -> Result<Vec<DeviceHandle>> {
        self.scan_with_timeout(name_filter, self.settings.scan_timeout())
            .await
    }

    pub async fn scan_with_timeout(
        &self,
        name_filter: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<DeviceHandle>> {
        self.scanner.scan(name_filter, timeout).await
    }

    /// Handles that have not been released yet
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.registry.handles()
    }

    /// Session for a scanned handle. Asking twice for the same live handle
    /// returns the same session.
    pub fn session(&self, handle: &DeviceHandle) -> Result<Arc<Session>> {
        let registered = self.registry.get(handle.id).ok_or_else(|| {
            ThetaBleError::InvalidArgument(format!(
                "device {} ({}) is not registered",
                handle.id, handle.name
            ))
        })?;
        if registered.name != handle.name {
            return Err(ThetaBleError::InvalidArgument(format!(
                "device {} is {}, not {}",
                handle.id, registered.name, handle.name
            )));
        }

        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| session.strong_count() > 0);
        if let Some(session) = sessions.get(&handle.id).and_then(Weak::upgrade) {
            if !session.is_released() {
                return Ok(session);
            }
        }

        debug!("Creating session for {} ({})", registered.name, registered.id);
        let session = Arc::new(Session::new(
            registered,
            self.platform.clone(),
            self.registry.clone(),
            self.router.clone(),
            SessionConfig::from(&self.settings),
        ));
        sessions.insert(handle.id, Arc::downgrade(&session));
        Ok(session)
    }

    /// Option level facade for a scanned handle
    pub fn device(&self, handle: &DeviceHandle) -> Result<ThetaDevice> {
        Ok(ThetaDevice::new(self.session(handle)?))
    }
}

/// One camera, addressed by option name rather than by service.
#[derive(Clone)]
pub struct ThetaDevice {
    session: Arc<Session>,
}

impl ThetaDevice {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn connect(&self, auth_uuid: Option<&str>) -> Result<()> {
        self.session.connect(auth_uuid).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    pub async fn release(&self) {
        self.session.release().await
    }

    pub fn service(&self, kind: ServiceKind) -> Result<Option<ThetaService>> {
        service_for(&self.session, kind)
    }

    /// Read the named options, each from its own characteristic.
    pub async fn get_options(&self, names: &[OptionName]) -> Result<ThetaOptions> {
        let characteristics = names
            .iter()
            .map(|name| ble_characteristic(*name).map(|c| (*name, c)))
            .collect::<Result<Vec<_>>>()?;

        let mut options = ThetaOptions::default();
        for (name, characteristic) in characteristics {
            let bytes = self.session.read(characteristic).await?;
            options.set_ble_value(name, &bytes)?;
        }
        Ok(options)
    }

    /// Write every option that is set. Nothing is written when any of them
    /// can't be encoded.
    pub async fn set_options(&self, options: &ThetaOptions) -> Result<()> {
        let names = options.names();
        if names.is_empty() {
            return Err(ThetaBleError::InvalidArgument(
                "no options to set".to_string(),
            ));
        }
        if options
            .shutter_volume
            .is_some_and(|volume| volume > MAX_SHUTTER_VOLUME)
        {
            return Err(ThetaBleError::InvalidArgument(format!(
                "shutter volume exceeds {MAX_SHUTTER_VOLUME}"
            )));
        }
        if options.date_time_zone.as_deref() == Some("") {
            return Err(ThetaBleError::InvalidArgument(
                "date time zone must not be empty".to_string(),
            ));
        }

        let encoded = options.to_ble();
        if let Some(name) = names.iter().find(|name| !encoded.contains_key(*name)) {
            return Err(ThetaBleError::InvalidArgument(format!(
                "option {} holds an unknown value",
                name.http_key()
            )));
        }
        let writes = encoded
            .iter()
            .map(|(name, bytes)| ble_characteristic(*name).map(|c| (c, bytes)))
            .collect::<Result<Vec<_>>>()?;

        for (characteristic, bytes) in writes {
            self.session.write(characteristic, bytes).await?;
        }
        info!(
            "Set {} option(s) on {}",
            encoded.len(),
            self.session.handle().name
        );
        Ok(())
    }
}

fn ble_characteristic(name: OptionName) -> Result<Characteristic> {
    name.characteristic().ok_or_else(|| {
        ThetaBleError::Unsupported(format!(
            "option {} has no BLE characteristic",
            name.http_key()
        ))
    })
}
