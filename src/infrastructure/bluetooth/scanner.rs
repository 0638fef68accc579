//! BLE Scanner Module
//!
//! Handles Bluetooth LE discovery of THETA cameras. THETA cameras advertise
//! their serial number as the local name: two uppercase letters followed by
//! eight digits, or eight digits on older models.

use crate::domain::models::{Advertisement, DeviceHandle};
use crate::domain::registry::DeviceRegistry;
use crate::error::{Result, ThetaBleError};
use crate::infrastructure::bluetooth::transport::BlePlatform;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// BLE Scanner for discovering THETA cameras
pub struct BleScanner {
    platform: Arc<dyn BlePlatform>,
    registry: Arc<DeviceRegistry>,
}

impl BleScanner {
    /// Create a new scanner
    pub fn new(platform: Arc<dyn BlePlatform>, registry: Arc<DeviceRegistry>) -> Self {
        Self { platform, registry }
    }

    /// Scan for cameras.
    ///
    /// # Arguments
    /// * `name_filter` - Exact advertised name to wait for. The scan returns
    ///   as soon as it is seen. `None` collects every THETA-looking name for
    ///   the whole window.
    /// * `timeout` - Upper bound of the scan. Expiry is not an error.
    pub async fn scan(
        &self,
        name_filter: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<DeviceHandle>> {
        if name_filter == Some("") {
            return Err(ThetaBleError::InvalidArgument(
                "scan name filter must not be empty".to_string(),
            ));
        }

        info!(
            "Starting BLE scan (filter: {:?}, timeout: {:?})",
            name_filter, timeout
        );

        let mut stream = self
            .platform
            .start_scan()
            .await
            .map_err(|e| ThetaBleError::transport("scan", e))?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let advertisements = match name_filter {
            Some(filter) => {
                let mut found = Vec::new();
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = stream.next() => match next {
                            Some(adv) => {
                                if usable_name(&adv) == Some(filter) {
                                    found.push(adv);
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
                found
            }
            None => {
                let mut collected = Collected::default();
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = stream.next() => match next {
                            Some(adv) => collected.push(adv),
                            None => break,
                        },
                    }
                }
                collected.into_advertisements()
            }
        };

        // Dropping the stream stops the platform scan
        drop(stream);

        let handles: Vec<DeviceHandle> = advertisements
            .iter()
            .filter_map(|adv| {
                let name = adv.name.as_deref()?;
                Some(self.registry.register(name, adv.rssi))
            })
            .collect();

        info!("BLE scan finished: {} device(s)", handles.len());
        Ok(handles)
    }
}

/// Name of an advertisement that carries both a name and service UUIDs.
fn usable_name(adv: &Advertisement) -> Option<&str> {
    let name = adv.name.as_deref().filter(|n| !n.is_empty())?;
    if adv.service_uuids.is_empty() {
        debug!("Ignoring advertisement without service UUIDs: {}", name);
        return None;
    }
    Some(name)
}

/// `AA12345678` or `12345678`
pub fn is_theta_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let digits = |s: &[u8]| s.len() == 8 && s.iter().all(u8::is_ascii_digit);
    match bytes.len() {
        8 => digits(bytes),
        10 => bytes[..2].iter().all(u8::is_ascii_uppercase) && digits(&bytes[2..]),
        _ => false,
    }
}

/// Advertisements deduplicated by name, in first-seen order, keeping the
/// latest record per name.
#[derive(Default)]
struct Collected {
    order: Vec<String>,
    latest: HashMap<String, Advertisement>,
}

impl Collected {
    fn push(&mut self, adv: Advertisement) {
        let Some(name) = usable_name(&adv).map(str::to_string) else {
            return;
        };
        if !is_theta_name(&name) {
            debug!("Ignoring non-THETA advertisement: {}", name);
            return;
        }
        if self.latest.insert(name.clone(), adv).is_none() {
            self.order.push(name);
        }
    }

    fn into_advertisements(mut self) -> Vec<Advertisement> {
        self.order
            .iter()
            .filter_map(|name| self.latest.remove(name))
            .collect()
    }
}
