//! THETA GATT Profile
//!
//! Vendor services and characteristics exposed by THETA cameras. Every
//! characteristic belongs to exactly one service.

use std::fmt;
use uuid::Uuid;

/// Vendor services of the THETA GATT profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    CameraInformation,
    CameraStatusCommand,
    ShootingControlCommand,
    BluetoothControlCommand,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::CameraInformation,
        ServiceKind::CameraStatusCommand,
        ServiceKind::ShootingControlCommand,
        ServiceKind::BluetoothControlCommand,
    ];

    pub const fn uuid(self) -> Uuid {
        match self {
            ServiceKind::CameraInformation => {
                Uuid::from_u128(0x9a5ed1c5_74cc_4c50_b5b6_66a48e7ccff1)
            }
            ServiceKind::CameraStatusCommand => {
                Uuid::from_u128(0x8af24e1c_e8d6_47b1_bbd4_4a7c8d0c9ef5)
            }
            ServiceKind::ShootingControlCommand => {
                Uuid::from_u128(0x1ea36a3e_6d49_4d1a_a3a2_6b6e1a1f5e01)
            }
            ServiceKind::BluetoothControlCommand => {
                Uuid::from_u128(0x0f291746_0c80_4726_87a7_3c501fd3b4b6)
            }
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.uuid() == uuid)
    }

    pub fn characteristics(self) -> impl Iterator<Item = Characteristic> {
        Characteristic::ALL
            .into_iter()
            .filter(move |c| c.service() == self)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceKind::CameraInformation => "Camera Information",
            ServiceKind::CameraStatusCommand => "Camera Status Command",
            ServiceKind::ShootingControlCommand => "Shooting Control Command",
            ServiceKind::BluetoothControlCommand => "Bluetooth Control Command",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Characteristic {
    // Camera Information
    FirmwareRevision,
    ManufacturerName,
    ModelNumber,
    SerialNumber,
    WlanMacAddress,
    BluetoothMacAddress,

    // Camera Status Command
    BatteryLevel,
    BatteryStatus,
    CameraPower,
    CommandErrorDescription,

    // Shooting Control Command
    CaptureMode,
    TakePicture,

    // Bluetooth Control Command
    AuthBluetoothDevice,
}

impl Characteristic {
    pub const ALL: [Characteristic; 13] = [
        Characteristic::FirmwareRevision,
        Characteristic::ManufacturerName,
        Characteristic::ModelNumber,
        Characteristic::SerialNumber,
        Characteristic::WlanMacAddress,
        Characteristic::BluetoothMacAddress,
        Characteristic::BatteryLevel,
        Characteristic::BatteryStatus,
        Characteristic::CameraPower,
        Characteristic::CommandErrorDescription,
        Characteristic::CaptureMode,
        Characteristic::TakePicture,
        Characteristic::AuthBluetoothDevice,
    ];

    pub const fn service(self) -> ServiceKind {
        use Characteristic::*;
        match self {
            FirmwareRevision | ManufacturerName | ModelNumber | SerialNumber | WlanMacAddress
            | BluetoothMacAddress => ServiceKind::CameraInformation,
            BatteryLevel | BatteryStatus | CameraPower | CommandErrorDescription => {
                ServiceKind::CameraStatusCommand
            }
            CaptureMode | TakePicture => ServiceKind::ShootingControlCommand,
            AuthBluetoothDevice => ServiceKind::BluetoothControlCommand,
        }
    }

    pub const fn uuid(self) -> Uuid {
        use Characteristic::*;
        let value: u128 = match self {
            FirmwareRevision => 0xb4eb8905_7411_40a6_a367_2834c2157ea7,
            ManufacturerName => 0xf5666a48_6a74_40ae_a817_3c9b3efb59a6,
            ModelNumber => 0x35fe6272_6aa5_44d9_88e1_f09427f51a71,
            SerialNumber => 0x0d2fc4d5_5cb3_4cde_b519_445e599957d8,
            WlanMacAddress => 0x1c5c6f8d_b8a5_4f3c_a1b7_4a51d1d9e4d1,
            BluetoothMacAddress => 0x97e34da2_2e1a_405b_b80d_f8f0aa9cc51c,
            BatteryLevel => 0x875fc41d_4980_434c_a653_fd4a4d4410c4,
            BatteryStatus => 0x5de1ab3a_9b8c_4a2f_b83e_1f4a0a3c9d11,
            CameraPower => 0xb58ce84c_0666_4de9_bec8_2d27b27b3211,
            CommandErrorDescription => 0xa9ac8e1b_4c3f_4a7e_9a2d_7b6c5e4d3f20,
            CaptureMode => 0x78009238_ac3d_4370_9b6f_c9ce2f4e3ca8,
            TakePicture => 0xfec1805c_8905_4477_b862_ba5e447528a5,
            AuthBluetoothDevice => 0xebafb2f0_0e0f_40a2_a84f_e2f098dc13c3,
        };
        Uuid::from_u128(value)
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Value written to the take picture characteristic.
pub const TAKE_PICTURE_TRIGGER: &[u8] = &[0x01];
