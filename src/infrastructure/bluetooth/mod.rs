//! Bluetooth Module
//!
//! BLE client side of the THETA vendor GATT profile.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        ThetaBle                          │
//! │   (context: device table, router, settings, sessions)    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌────────────┐
//! │  Scanner  │  │  Session   │  │  Router    │
//! │           │  │            │  │            │
//! │ - adverts │  │ - connect  │◄─┤ - per key  │
//! │ - names   │  │ - read     │  │   listener │
//! │           │  │ - observe ─┼─►│ - dispatch │
//! └───────────┘  └─────┬──────┘  └────────────┘
//!                      │
//!                      ▼
//!          Command objects / ThetaDevice
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Capability traits implemented by the platform BLE stack
//! - [`protocol`] - Services, characteristics and their UUIDs
//! - [`scanner`] - Camera discovery
//! - [`connection`] - Per-camera session and connection lifecycle
//! - [`router`] - Notification demultiplexing
//! - [`commands`] - Typed per-service command objects
//! - [`service`] - Client context and option level facade
//! - [`mock`] - Simulated platform

pub mod commands;
pub mod connection;
pub mod mock;
pub mod protocol;
pub mod router;
pub mod scanner;
pub mod service;
pub mod transport;

pub use connection::Session;
pub use service::{ThetaBle, ThetaDevice};
