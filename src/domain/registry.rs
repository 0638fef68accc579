use crate::domain::models::{DeviceHandle, DeviceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Live device handles of one client context.
///
/// Ids come from a counter and are never reused, so a stale handle can't
/// alias a newer device.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    next_id: AtomicU32,
    devices: Mutex<HashMap<DeviceId, DeviceHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, rssi: Option<i16>) -> DeviceHandle {
        let id = DeviceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handle = DeviceHandle {
            id,
            name: name.to_string(),
            rssi,
            auth_uuid: None,
        };
        self.devices.lock().insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.lock().contains_key(&id)
    }

    pub fn set_auth_uuid(&self, id: DeviceId, auth_uuid: Option<String>) {
        if let Some(handle) = self.devices.lock().get_mut(&id) {
            handle.auth_uuid = auth_uuid;
        }
    }

    /// Returns the handle if it was still registered.
    pub fn release(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.lock().remove(&id)
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        let mut handles: Vec<_> = self.devices.lock().values().cloned().collect();
        handles.sort_by_key(|h| h.id);
        handles
    }
}
