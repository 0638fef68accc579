//! Command Surface
//!
//! One command object per THETA service. Each wraps a shared [`Session`]
//! and turns characteristic bytes into typed values through the codec
//! layer.

use crate::codec::enums::{
    decode_enum, ByteEnum, CameraPower, CaptureMode, ChargingState, CommandErrorDescription,
};
use crate::codec::values::{decode_text, decode_u8, encode_text};
use crate::error::{ProtocolError, Result, ThetaBleError};
use crate::infrastructure::bluetooth::connection::Session;
use crate::infrastructure::bluetooth::protocol::{
    Characteristic, ServiceKind, TAKE_PICTURE_TRIGGER,
};
use crate::infrastructure::bluetooth::router::Decoder;
use std::sync::Arc;

async fn read_as<T>(session: &Session, characteristic: Characteristic, decode: Decoder<T>) -> Result<T> {
    let bytes = session.read(characteristic).await?;
    Ok(decode(&bytes)?)
}

async fn observe_as<T: 'static>(
    session: &Session,
    characteristic: Characteristic,
    decode: Decoder<T>,
    listener: impl Fn(Result<T>) + Send + Sync + 'static,
) -> Result<()> {
    session
        .observe(characteristic, decode, Box::new(listener))
        .await
}

/// Stop observing a characteristic, which has to belong to `service`.
async fn unobserve_in(
    session: &Session,
    service: ServiceKind,
    characteristic: Characteristic,
) -> Result<()> {
    if characteristic.service() != service {
        return Err(ThetaBleError::InvalidArgument(format!(
            "{} is not part of {}",
            characteristic, service
        )));
    }
    session.unobserve(characteristic).await
}

/// Wire byte of an enumerated value. The `Unknown` sentinel has none.
fn known_byte<E: ByteEnum>(value: E) -> Result<Vec<u8>> {
    value.to_byte().map(|b| vec![b]).ok_or_else(|| {
        ThetaBleError::InvalidArgument(format!("cannot write unknown {}", E::NAME))
    })
}

fn non_empty<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(ThetaBleError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(value)
}

fn text(what: &'static str, bytes: &[u8]) -> std::result::Result<String, ProtocolError> {
    decode_text(what, bytes, false)
}

/// Static identity of the camera.
#[derive(Clone)]
pub struct CameraInformation {
    session: Arc<Session>,
}

impl CameraInformation {
    pub const SERVICE: ServiceKind = ServiceKind::CameraInformation;

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn firmware_revision(&self) -> Result<String> {
        read_as(&self.session, Characteristic::FirmwareRevision, |b| {
            text("firmware revision", b)
        })
        .await
    }

    pub async fn manufacturer_name(&self) -> Result<String> {
        read_as(&self.session, Characteristic::ManufacturerName, |b| {
            text("manufacturer name", b)
        })
        .await
    }

    pub async fn model_number(&self) -> Result<String> {
        read_as(&self.session, Characteristic::ModelNumber, |b| {
            text("model number", b)
        })
        .await
    }

    /// Fails with a protocol error when the camera returns no serial.
    pub async fn serial_number(&self) -> Result<String> {
        read_as(&self.session, Characteristic::SerialNumber, |b| {
            decode_text("serial number", b, true)
        })
        .await
    }

    pub async fn wlan_mac_address(&self) -> Result<String> {
        read_as(&self.session, Characteristic::WlanMacAddress, |b| {
            text("wlan mac address", b)
        })
        .await
    }

    pub async fn bluetooth_mac_address(&self) -> Result<String> {
        read_as(&self.session, Characteristic::BluetoothMacAddress, |b| {
            text("bluetooth mac address", b)
        })
        .await
    }
}

/// Battery, power and last command error.
#[derive(Clone)]
pub struct CameraStatusCommand {
    session: Arc<Session>,
}

impl CameraStatusCommand {
    pub const SERVICE: ServiceKind = ServiceKind::CameraStatusCommand;

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Battery level in percent.
    pub async fn battery_level(&self) -> Result<u8> {
        read_as(&self.session, Characteristic::BatteryLevel, |b| {
            decode_u8("battery level", b)
        })
        .await
    }

    pub async fn battery_status(&self) -> Result<ChargingState> {
        read_as(&self.session, Characteristic::BatteryStatus, decode_enum).await
    }

    pub async fn camera_power(&self) -> Result<CameraPower> {
        read_as(&self.session, Characteristic::CameraPower, decode_enum).await
    }

    pub async fn set_camera_power(&self, power: CameraPower) -> Result<()> {
        self.session
            .write(Characteristic::CameraPower, &known_byte(power)?)
            .await
    }

    pub async fn command_error_description(&self) -> Result<CommandErrorDescription> {
        read_as(
            &self.session,
            Characteristic::CommandErrorDescription,
            decode_enum,
        )
        .await
    }

    pub async fn observe_battery_level(
        &self,
        listener: impl Fn(Result<u8>) + Send + Sync + 'static,
    ) -> Result<()> {
        observe_as(
            &self.session,
            Characteristic::BatteryLevel,
            |b| decode_u8("battery level", b),
            listener,
        )
        .await
    }

    pub async fn observe_battery_status(
        &self,
        listener: impl Fn(Result<ChargingState>) + Send + Sync + 'static,
    ) -> Result<()> {
        observe_as(
            &self.session,
            Characteristic::BatteryStatus,
            decode_enum,
            listener,
        )
        .await
    }

    pub async fn observe_camera_power(
        &self,
        listener: impl Fn(Result<CameraPower>) + Send + Sync + 'static,
    ) -> Result<()> {
        observe_as(&self.session, Characteristic::CameraPower, decode_enum, listener).await
    }

    pub async fn observe_command_error_description(
        &self,
        listener: impl Fn(Result<CommandErrorDescription>) + Send + Sync + 'static,
    ) -> Result<()> {
        observe_as(
            &self.session,
            Characteristic::CommandErrorDescription,
            decode_enum,
            listener,
        )
        .await
    }

    pub async fn unobserve(&self, characteristic: Characteristic) -> Result<()> {
        unobserve_in(&self.session, Self::SERVICE, characteristic).await
    }
}

#[derive(Clone)]
pub struct ShootingControlCommand {
    session: Arc<Session>,
}

impl ShootingControlCommand {
    pub const SERVICE: ServiceKind = ServiceKind::ShootingControlCommand;

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn capture_mode(&self) -> Result<CaptureMode> {
        read_as(&self.session, Characteristic::CaptureMode, decode_enum).await
    }

    pub async fn set_capture_mode(&self, mode: CaptureMode) -> Result<()> {
        self.session
            .write(Characteristic::CaptureMode, &known_byte(mode)?)
            .await
    }

    pub async fn take_picture(&self) -> Result<()> {
        self.session
            .write(Characteristic::TakePicture, TAKE_PICTURE_TRIGGER)
            .await
    }

    pub async fn observe_capture_mode(
        &self,
        listener: impl Fn(Result<CaptureMode>) + Send + Sync + 'static,
    ) -> Result<()> {
        observe_as(&self.session, Characteristic::CaptureMode, decode_enum, listener).await
    }

    pub async fn unobserve(&self, characteristic: Characteristic) -> Result<()> {
        unobserve_in(&self.session, Self::SERVICE, characteristic).await
    }
}

#[derive(Clone)]
pub struct BluetoothControlCommand {
    session: Arc<Session>,
}

impl BluetoothControlCommand {
    pub const SERVICE: ServiceKind = ServiceKind::BluetoothControlCommand;

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Register `auth_uuid` as a trusted client.
    pub async fn set_auth_bluetooth_device(&self, auth_uuid: &str) -> Result<()> {
        let auth_uuid = non_empty("auth uuid", auth_uuid)?;
        self.session
            .write(Characteristic::AuthBluetoothDevice, &encode_text(auth_uuid))
            .await
    }
}

/// Command object of whichever service was asked for.
#[derive(Clone)]
pub enum ThetaService {
    CameraInformation(CameraInformation),
    CameraStatusCommand(CameraStatusCommand),
    ShootingControlCommand(ShootingControlCommand),
    BluetoothControlCommand(BluetoothControlCommand),
}

impl ThetaService {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ThetaService::CameraInformation(_) => ServiceKind::CameraInformation,
            ThetaService::CameraStatusCommand(_) => ServiceKind::CameraStatusCommand,
            ThetaService::ShootingControlCommand(_) => ServiceKind::ShootingControlCommand,
            ThetaService::BluetoothControlCommand(_) => ServiceKind::BluetoothControlCommand,
        }
    }
}

/// Command object for `kind`, or `None` when the connected camera does not
/// expose that service.
pub fn service_for(session: &Arc<Session>, kind: ServiceKind) -> Result<Option<ThetaService>> {
    if !session.supports_service(kind)? {
        return Ok(None);
    }
    let session = session.clone();
    let service = match kind {
        ServiceKind::CameraInformation => {
            ThetaService::CameraInformation(CameraInformation::new(session))
        }
        ServiceKind::CameraStatusCommand => {
            ThetaService::CameraStatusCommand(CameraStatusCommand::new(session))
        }
        ServiceKind::ShootingControlCommand => {
            ThetaService::ShootingControlCommand(ShootingControlCommand::new(session))
        }
        ServiceKind::BluetoothControlCommand => {
            ThetaService::BluetoothControlCommand(BluetoothControlCommand::new(session))
        }
    };
    Ok(Some(service))
}
