//! Transport Capability
//!
//! The platform BLE stack is supplied from outside the crate. Sessions and
//! the scanner only talk to these traits; adapter errors are plain
//! `anyhow::Error`s and get classified by the caller.

use crate::domain::models::{Advertisement, PeripheralError};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

/// Values pushed by the peripheral for one characteristic. An `Err` item
/// is an error the camera reported out of band; the stream keeps going.
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, PeripheralError>>;

/// Advertisements seen while scanning. Dropping the stream stops the scan.
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// One remote camera as exposed by the platform stack.
#[async_trait]
pub trait Peripheral: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;
    /// Returns the MTU actually negotiated.
    async fn request_mtu(&self, size: u16) -> Result<u16>;
    async fn observe(&self, characteristic: Uuid) -> Result<NotificationStream>;
    async fn unobserve(&self, characteristic: Uuid) -> Result<()>;
    fn contains_characteristic(&self, characteristic: Uuid) -> bool;
    fn contains_service(&self, service: Uuid) -> bool;
}

/// Entry point into the platform BLE stack.
#[async_trait]
pub trait BlePlatform: Send + Sync {
    async fn start_scan(&self) -> Result<AdvertisementStream>;
    /// Peripheral for a previously advertised name.
    fn peripheral(&self, name: &str) -> Result<Arc<dyn Peripheral>>;
}
