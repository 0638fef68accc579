use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log verbosity and sinks. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// EnvFilter directive, e.g. `info` or `theta_ble=debug`
    pub level: String,
    pub console: bool,
    /// Rolling file output; off when absent.
    pub file: Option<LogFile>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFile {
    pub dir: PathBuf,
    pub prefix: String,
    /// daily, hourly, minutely or never
    pub rotation: String,
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            prefix: "theta_ble".to_string(),
            rotation: "daily".to_string(),
        }
    }
}

/// Client-wide knobs shared by the scanner and every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// MTU requested right after the link comes up.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            scan_timeout_ms: default_scan_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            mtu: default_mtu(),
            log_settings: LogSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    15_000
}
fn default_mtu() -> u16 {
    512
}

pub struct SettingsService {
    settings: ClientSettings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from the platform config directory.
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from `path`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let settings_path = path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {:#}",
                    settings_path.display(),
                    e
                );
                ClientSettings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ThetaBle");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<ClientSettings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut ClientSettings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
