//! Enumerated byte values
//!
//! Every enumeration maps a closed set of bytes onto named constants plus an
//! `Unknown` sentinel. Whether an unrecognized byte decodes to `Unknown` or
//! fails is decided per enumeration by its [`UnknownPolicy`].

use crate::error::ProtocolError;

/// What decoding does with a byte outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// Fail with [`ProtocolError::UnknownValue`].
    Reject,
    /// Decode to the `Unknown` sentinel.
    Tolerate,
}

pub trait ByteEnum: Sized + Copy + PartialEq + 'static {
    const NAME: &'static str;
    const POLICY: UnknownPolicy;
    const UNKNOWN: Self;
    const TABLE: &'static [(Self, u8)];

    fn from_byte(byte: u8) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, b)| *b == byte)
            .map(|(value, _)| *value)
    }

    /// Wire byte, or `None` for the `Unknown` sentinel.
    fn to_byte(self) -> Option<u8> {
        Self::TABLE
            .iter()
            .find(|(value, _)| *value == self)
            .map(|(_, b)| *b)
    }

    fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

/// Decode a single-byte enumeration, honouring its unknown-value policy.
pub fn decode_enum<E: ByteEnum>(bytes: &[u8]) -> Result<E, ProtocolError> {
    let byte = *bytes.first().ok_or(ProtocolError::Empty { what: E::NAME })?;
    match E::from_byte(byte) {
        Some(value) => Ok(value),
        None => match E::POLICY {
            UnknownPolicy::Tolerate => {
                tracing::debug!("{}: tolerating unknown value {:#04x}", E::NAME, byte);
                Ok(E::UNKNOWN)
            }
            UnknownPolicy::Reject => Err(ProtocolError::UnknownValue {
                what: E::NAME,
                value: byte,
            }),
        },
    }
}

macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, $policy:ident {
            $($variant:ident = $byte:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown,
        }

        impl ByteEnum for $name {
            const NAME: &'static str = $label;
            const POLICY: UnknownPolicy = UnknownPolicy::$policy;
            const UNKNOWN: Self = $name::Unknown;
            const TABLE: &'static [(Self, u8)] = &[$(($name::$variant, $byte)),+];
        }
    };
}

byte_enum! {
    /// Camera power state, Camera Status / Camera Control services.
    CameraPower, "camera power", Reject {
        Off = 0x00,
        On = 0x01,
        Sleep = 0x02,
    }
}

byte_enum! {
    /// Battery charging state.
    ChargingState, "charging state", Tolerate {
        Charging = 0x00,
        Completed = 0x01,
        NotCharging = 0x02,
    }
}

byte_enum! {
    CaptureMode, "capture mode", Reject {
        Image = 0x00,
        Video = 0x01,
        LiveStreaming = 0x02,
    }
}

byte_enum! {
    NetworkType, "network type", Reject {
        Direct = 0x00,
        Client = 0x01,
        Ethernet = 0x02,
        Off = 0x03,
    }
}

byte_enum! {
    /// Access point frequency. Newer firmware adds bands, so unknown
    /// bytes are tolerated here.
    WlanFrequency, "wlan frequency", Tolerate {
        Ghz2_4 = 0x00,
        Ghz5 = 0x01,
        Ghz5_2 = 0x02,
        Ghz5_8 = 0x03,
    }
}

byte_enum! {
    BluetoothPower, "bluetooth power", Reject {
        Off = 0x00,
        On = 0x01,
    }
}

byte_enum! {
    /// Action byte of a plugin control record.
    PluginPowerStatus, "plugin power status", Reject {
        Stop = 0x00,
        Running = 0x01,
    }
}

byte_enum! {
    /// Error the camera reports for the last rejected command.
    CommandErrorDescription, "command error description", Tolerate {
        NoError = 0x00,
        DisabledWhileRecording = 0x01,
        BatteryLow = 0x02,
        StorageFull = 0x03,
        Busy = 0x04,
    }
}

/// Encode an enumerated value, or `None` for the `Unknown` sentinel.
pub fn encode_enum<E: ByteEnum>(value: E) -> Option<Vec<u8>> {
    value.to_byte().map(|b| vec![b])
}
