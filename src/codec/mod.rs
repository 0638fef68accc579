//! Codecs between characteristic payloads and typed values.
//!
//! Decoding returns [`ProtocolError`](crate::error::ProtocolError) for
//! malformed payloads. Encoding never fails for values built from known
//! enumeration members.

pub mod enums;
pub mod options;
pub mod plugin;
pub mod values;

pub use enums::{
    BluetoothPower, ByteEnum, CameraPower, CaptureMode, ChargingState, CommandErrorDescription,
    NetworkType, PluginPowerStatus, UnknownPolicy, WlanFrequency,
};
pub use options::{OptionName, ThetaOptions};
pub use plugin::{PluginControl, PluginList, PluginOrders};
