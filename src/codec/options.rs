//! Camera option bag
//!
//! `ThetaOptions` is sparse: a `None` field means "unspecified" and is left
//! out of both the BLE and the HTTP representation. Each option converts on
//! its own, and the BLE byte form and the HTTP JSON form are deliberately
//! not the same text (e.g. network type `0x01` is `"CL"` over HTTP).
//!
//! Both directions apply the same range and emptiness rules, so anything
//! that decodes from one side encodes to the other and back unchanged.

use super::enums::{
    decode_enum, encode_enum, BluetoothPower, ByteEnum, CaptureMode, NetworkType, WlanFrequency,
};
use super::values::{decode_text, decode_u16, decode_u8, encode_text, encode_u16};
use crate::error::ProtocolError;
use crate::infrastructure::bluetooth::protocol::Characteristic;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Highest shutter volume the camera accepts.
pub const MAX_SHUTTER_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionName {
    CaptureMode,
    DateTimeZone,
    SleepDelay,
    OffDelay,
    ShutterVolume,
    WlanFrequency,
    NetworkType,
    BluetoothPower,
}

impl OptionName {
    pub const ALL: [OptionName; 8] = [
        OptionName::CaptureMode,
        OptionName::DateTimeZone,
        OptionName::SleepDelay,
        OptionName::OffDelay,
        OptionName::ShutterVolume,
        OptionName::WlanFrequency,
        OptionName::NetworkType,
        OptionName::BluetoothPower,
    ];

    /// Field name on the legacy HTTP channel.
    pub fn http_key(self) -> &'static str {
        match self {
            OptionName::CaptureMode => "captureMode",
            OptionName::DateTimeZone => "dateTimeZone",
            OptionName::SleepDelay => "sleepDelay",
            OptionName::OffDelay => "offDelay",
            OptionName::ShutterVolume => "_shutterVolume",
            OptionName::WlanFrequency => "_wlanFrequency",
            OptionName::NetworkType => "_networkType",
            OptionName::BluetoothPower => "_bluetoothPower",
        }
    }

    /// Characteristic that carries this option over BLE. The other options
    /// only have a byte form here and are exchanged through the HTTP side.
    pub fn characteristic(self) -> Option<Characteristic> {
        match self {
            OptionName::CaptureMode => Some(Characteristic::CaptureMode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThetaOptions {
    pub capture_mode: Option<CaptureMode>,
    /// `YYYY:MM:DD hh:mm:ss+(-)hh:mm`
    pub date_time_zone: Option<String>,
    /// Seconds; 65535 disables auto sleep.
    pub sleep_delay: Option<u16>,
    /// Seconds; 65535 disables auto power off.
    pub off_delay: Option<u16>,
    /// 0–100
    pub shutter_volume: Option<u8>,
    pub wlan_frequency: Option<WlanFrequency>,
    pub network_type: Option<NetworkType>,
    pub bluetooth_power: Option<BluetoothPower>,
}

impl ThetaOptions {
    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    /// Names of the options that are set.
    pub fn names(&self) -> Vec<OptionName> {
        OptionName::ALL
            .into_iter()
            .filter(|name| self.is_set(*name))
            .collect()
    }

    fn is_set(&self, name: OptionName) -> bool {
        match name {
            OptionName::CaptureMode => self.capture_mode.is_some(),
            OptionName::DateTimeZone => self.date_time_zone.is_some(),
            OptionName::SleepDelay => self.sleep_delay.is_some(),
            OptionName::OffDelay => self.off_delay.is_some(),
            OptionName::ShutterVolume => self.shutter_volume.is_some(),
            OptionName::WlanFrequency => self.wlan_frequency.is_some(),
            OptionName::NetworkType => self.network_type.is_some(),
            OptionName::BluetoothPower => self.bluetooth_power.is_some(),
        }
    }

    /// BLE payload of a single option, `None` when unset or `Unknown`.
    pub fn ble_value(&self, name: OptionName) -> Option<Vec<u8>> {
        let bytes = match name {
            OptionName::CaptureMode => self.capture_mode.and_then(encode_enum),
            OptionName::DateTimeZone => self.date_time_zone.as_deref().map(encode_text),
            OptionName::SleepDelay => self.sleep_delay.map(encode_u16),
            OptionName::OffDelay => self.off_delay.map(encode_u16),
            OptionName::ShutterVolume => self.shutter_volume.map(|v| vec![v]),
            OptionName::WlanFrequency => self.wlan_frequency.and_then(encode_enum),
            OptionName::NetworkType => self.network_type.and_then(encode_enum),
            OptionName::BluetoothPower => self.bluetooth_power.and_then(encode_enum),
        };
        if bytes.is_none() && self.is_set(name) {
            debug!("Option {:?} holds an unknown value; not encoded", name);
        }
        bytes
    }

    /// Decode one option's BLE payload into this bag.
    pub fn set_ble_value(&mut self, name: OptionName, bytes: &[u8]) -> Result<(), ProtocolError> {
        match name {
            OptionName::CaptureMode => self.capture_mode = Some(decode_enum(bytes)?),
            OptionName::DateTimeZone => {
                self.date_time_zone = Some(decode_text("date time zone", bytes, true)?)
            }
            OptionName::SleepDelay => self.sleep_delay = Some(decode_u16("sleep delay", bytes)?),
            OptionName::OffDelay => self.off_delay = Some(decode_u16("off delay", bytes)?),
            OptionName::ShutterVolume => {
                let volume = decode_u8("shutter volume", bytes)?;
                if volume > MAX_SHUTTER_VOLUME {
                    return Err(ProtocolError::InvalidOptionValue {
                        name: name.http_key(),
                        value: volume.to_string(),
                    });
                }
                self.shutter_volume = Some(volume)
            }
            OptionName::WlanFrequency => self.wlan_frequency = Some(decode_enum(bytes)?),
            OptionName::NetworkType => self.network_type = Some(decode_enum(bytes)?),
            OptionName::BluetoothPower => self.bluetooth_power = Some(decode_enum(bytes)?),
        }
        Ok(())
    }

    pub fn to_ble(&self) -> BTreeMap<OptionName, Vec<u8>> {
        OptionName::ALL
            .into_iter()
            .filter_map(|name| self.ble_value(name).map(|bytes| (name, bytes)))
            .collect()
    }

    pub fn from_ble(values: &BTreeMap<OptionName, Vec<u8>>) -> Result<Self, ProtocolError> {
        let mut options = Self::default();
        for (name, bytes) in values {
            options.set_ble_value(*name, bytes)?;
        }
        Ok(options)
    }

    pub fn to_http(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for name in OptionName::ALL {
            if let Some(value) = self.http_value(name) {
                map.insert(name.http_key().to_string(), value);
            } else if self.is_set(name) {
                debug!("Option {:?} holds an unknown value; not encoded", name);
            }
        }
        map
    }

    /// Parse the HTTP option object. Keys this bag does not model are
    /// ignored.
    pub fn from_http(map: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let mut options = Self::default();
        for name in OptionName::ALL {
            if let Some(value) = map.get(name.http_key()) {
                options.set_http_value(name, value)?;
            }
        }
        Ok(options)
    }

    fn http_value(&self, name: OptionName) -> Option<Value> {
        match name {
            OptionName::CaptureMode => self
                .capture_mode
                .and_then(capture_mode_to_http)
                .map(|s| Value::String(s.to_string())),
            OptionName::DateTimeZone => self.date_time_zone.clone().map(Value::String),
            OptionName::SleepDelay => self.sleep_delay.map(Value::from),
            OptionName::OffDelay => self.off_delay.map(Value::from),
            OptionName::ShutterVolume => self.shutter_volume.map(Value::from),
            OptionName::WlanFrequency => self
                .wlan_frequency
                .and_then(wlan_frequency_to_http)
                .and_then(Number::from_f64)
                .map(Value::Number),
            OptionName::NetworkType => self
                .network_type
                .and_then(network_type_to_http)
                .map(|s| Value::String(s.to_string())),
            OptionName::BluetoothPower => self
                .bluetooth_power
                .and_then(bluetooth_power_to_http)
                .map(|s| Value::String(s.to_string())),
        }
    }

    fn set_http_value(&mut self, name: OptionName, value: &Value) -> Result<(), ProtocolError> {
        let invalid = || ProtocolError::InvalidOptionValue {
            name: name.http_key(),
            value: value.to_string(),
        };
        match name {
            OptionName::CaptureMode => {
                let mode = value
                    .as_str()
                    .and_then(capture_mode_from_http)
                    .ok_or_else(invalid)?;
                self.capture_mode = Some(mode);
            }
            OptionName::DateTimeZone => {
                let text = value
                    .as_str()
                    .filter(|text| !text.is_empty())
                    .ok_or_else(invalid)?;
                self.date_time_zone = Some(text.to_string());
            }
            OptionName::SleepDelay => {
                self.sleep_delay = Some(http_u16(value).ok_or_else(invalid)?);
            }
            OptionName::OffDelay => {
                self.off_delay = Some(http_u16(value).ok_or_else(invalid)?);
            }
            OptionName::ShutterVolume => {
                let volume = value
                    .as_u64()
                    .filter(|v| *v <= u64::from(MAX_SHUTTER_VOLUME))
                    .ok_or_else(invalid)?;
                self.shutter_volume = Some(volume as u8);
            }
            OptionName::WlanFrequency => {
                let ghz = value.as_f64().ok_or_else(invalid)?;
                self.wlan_frequency = Some(wlan_frequency_from_http(ghz));
            }
            OptionName::NetworkType => {
                let network = value
                    .as_str()
                    .and_then(network_type_from_http)
                    .ok_or_else(invalid)?;
                self.network_type = Some(network);
            }
            OptionName::BluetoothPower => {
                let power = value
                    .as_str()
                    .and_then(bluetooth_power_from_http)
                    .ok_or_else(invalid)?;
                self.bluetooth_power = Some(power);
            }
        }
        Ok(())
    }
}

fn http_u16(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|v| u16::try_from(v).ok())
}

fn capture_mode_to_http(mode: CaptureMode) -> Option<&'static str> {
    match mode {
        CaptureMode::Image => Some("image"),
        CaptureMode::Video => Some("video"),
        CaptureMode::LiveStreaming => Some("_liveStreaming"),
        CaptureMode::Unknown => None,
    }
}

fn capture_mode_from_http(value: &str) -> Option<CaptureMode> {
    match value {
        "image" => Some(CaptureMode::Image),
        "video" => Some(CaptureMode::Video),
        "_liveStreaming" => Some(CaptureMode::LiveStreaming),
        _ => None,
    }
}

fn network_type_to_http(network: NetworkType) -> Option<&'static str> {
    match network {
        NetworkType::Direct => Some("AP"),
        NetworkType::Client => Some("CL"),
        NetworkType::Ethernet => Some("ET"),
        NetworkType::Off => Some("OFF"),
        NetworkType::Unknown => None,
    }
}

fn network_type_from_http(value: &str) -> Option<NetworkType> {
    match value {
        "AP" => Some(NetworkType::Direct),
        "CL" => Some(NetworkType::Client),
        "ET" => Some(NetworkType::Ethernet),
        "OFF" => Some(NetworkType::Off),
        _ => None,
    }
}

fn bluetooth_power_to_http(power: BluetoothPower) -> Option<&'static str> {
    match power {
        BluetoothPower::On => Some("ON"),
        BluetoothPower::Off => Some("OFF"),
        BluetoothPower::Unknown => None,
    }
}

fn bluetooth_power_from_http(value: &str) -> Option<BluetoothPower> {
    match value {
        "ON" => Some(BluetoothPower::On),
        "OFF" => Some(BluetoothPower::Off),
        _ => None,
    }
}

/// Frequency in GHz as the HTTP channel reports it.
fn wlan_frequency_to_http(frequency: WlanFrequency) -> Option<f64> {
    match frequency {
        WlanFrequency::Ghz2_4 => Some(2.4),
        WlanFrequency::Ghz5 => Some(5.0),
        WlanFrequency::Ghz5_2 => Some(5.2),
        WlanFrequency::Ghz5_8 => Some(5.8),
        WlanFrequency::Unknown => None,
    }
}

/// HTTP values are narrowed to one decimal place before matching, so
/// `2.412` reads as the 2.4 GHz band. Unmatched bands follow the
/// tolerant policy of the BLE side.
fn wlan_frequency_from_http(ghz: f64) -> WlanFrequency {
    let tenths = (ghz * 10.0).round() as i64;
    match tenths {
        24 => WlanFrequency::Ghz2_4,
        50 => WlanFrequency::Ghz5,
        52 => WlanFrequency::Ghz5_2,
        58 => WlanFrequency::Ghz5_8,
        _ => {
            debug!("wlan frequency: tolerating unknown value {}", ghz);
            WlanFrequency::UNKNOWN
        }
    }
}
