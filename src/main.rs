use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use theta_ble::codec::enums::{CaptureMode, ChargingState};
use theta_ble::infrastructure::bluetooth::mock::{MockPeripheral, MockPlatform};
use theta_ble::{
    init_logger, Advertisement, CameraInformation, CameraStatusCommand, Characteristic,
    OptionName, ServiceKind, SettingsService, ThetaBle, ThetaOptions,
};
use tracing::{info, warn};

const CAMERA: &str = "AB10012345";

/// Simulated THETA Z1 so the client can be tried without hardware.
fn simulated_platform() -> (MockPlatform, Arc<MockPeripheral>) {
    let camera = Arc::new(
        MockPeripheral::theta()
            .with_value(Characteristic::ManufacturerName, b"RICOH")
            .with_value(Characteristic::ModelNumber, b"RICOH THETA Z1")
            .with_value(Characteristic::SerialNumber, b"10012345")
            .with_value(Characteristic::FirmwareRevision, b"3.10.1")
            .with_value(Characteristic::BatteryLevel, &[87])
            .with_value(Characteristic::BatteryStatus, &[0x00])
            .with_value(Characteristic::CaptureMode, &[0x00]),
    );
    let platform = MockPlatform::new()
        .with_advertisements(vec![
            Advertisement::new("headphones", vec![]),
            Advertisement::new(CAMERA, vec![ServiceKind::CameraInformation.uuid()]),
        ])
        .with_peripheral(CAMERA, camera.clone());
    (platform, camera)
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = SettingsService::new()?;
    let _guard = init_logger(&settings.get().log_settings)?;
    info!("Settings loaded from {}", settings.path().display());

    let (platform, camera) = simulated_platform();
    let ble = ThetaBle::new(Arc::new(platform), settings.get().clone());

    let handles = ble
        .scan_with_timeout(None, Duration::from_millis(200))
        .await?;
    let Some(handle) = handles.first() else {
        warn!("No THETA found");
        return Ok(());
    };

    let device = ble.device(handle)?;
    device.connect(Some("4a1c2f3e-0000-4000-8000-00805f9b34fb")).await?;

    let information = CameraInformation::new(device.session().clone());
    let manufacturer = information.manufacturer_name().await?;
    let model = information.model_number().await?;
    let serial = information.serial_number().await?;
    let firmware = information.firmware_revision().await?;
    info!(
        "{} {} (serial {}, firmware {})",
        manufacturer, model, serial, firmware
    );

    let status = CameraStatusCommand::new(device.session().clone());
    let battery = status.battery_level().await?;
    let charging = status.battery_status().await?;
    info!(
        "Battery {}%{}",
        battery,
        if charging == ChargingState::Charging {
            " (charging)"
        } else {
            ""
        }
    );

    status
        .observe_battery_level(|level| match level {
            Ok(level) => info!("Battery level changed: {}%", level),
            Err(e) => warn!("Battery notification: {}", e),
        })
        .await?;
    camera.notify(Characteristic::BatteryLevel, &[86]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    device
        .set_options(&ThetaOptions {
            capture_mode: Some(CaptureMode::Video),
            ..Default::default()
        })
        .await?;
    let options = device.get_options(&[OptionName::CaptureMode]).await?;
    info!(
        "Options over HTTP: {}",
        serde_json::Value::Object(options.to_http())
    );

    device.release().await;
    Ok(())
}
