//! Client library for RICOH THETA cameras over Bluetooth LE.
//!
//! ```text
//! ThetaBle::scan ─> DeviceHandle ─> ThetaBle::session ─> Session::connect
//!                                                           │
//!            command objects / ThetaDevice ─> read/write/observe
//!                                                           │
//!                              NotificationRouter ─> listener(Result<T>)
//! ```
//!
//! The platform BLE stack is plugged in through
//! [`BlePlatform`](infrastructure::bluetooth::transport::BlePlatform).

pub mod codec;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use codec::{OptionName, ThetaOptions};
pub use domain::models::{Advertisement, ConnectionState, DeviceHandle, DeviceId, PeripheralError};
pub use domain::settings::{ClientSettings, LogFile, LogSettings, SettingsService};
pub use error::{ErrorKind, ProtocolError, Result, ThetaBleError};
pub use infrastructure::bluetooth::commands::{
    service_for, BluetoothControlCommand, CameraInformation, CameraStatusCommand,
    ShootingControlCommand, ThetaService,
};
pub use infrastructure::bluetooth::protocol::{Characteristic, ServiceKind};
pub use infrastructure::bluetooth::router::{NotificationEnvelope, NotificationRouter};
pub use infrastructure::bluetooth::transport::{BlePlatform, Peripheral};
pub use infrastructure::bluetooth::{Session, ThetaBle, ThetaDevice};
pub use infrastructure::logging::init_logger;
