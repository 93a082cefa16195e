//! Settings for GATT identifiers, measurement defaults, and logging.
//!
//! Everything has a serde default so a missing or partial settings file
//! still produces a working configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Private UUID base `BAE8xxxx-4F05-4503-8E65-3AF1F7329D1F`: service 0x0001.
pub const RING_SERVICE_UUID: Uuid = Uuid::from_u128(0xBAE8_0001_4F05_4503_8E65_3AF1_F732_9D1F);
/// Command write characteristic 0x0010.
pub const RING_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0xBAE8_0010_4F05_4503_8E65_3AF1_F732_9D1F);
/// Data notify characteristic 0x0011.
pub const RING_NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0xBAE8_0011_4F05_4503_8E65_3AF1_F732_9D1F);

/// GATT identifiers for the ring's vendor service. Fixed constants in
/// practice, overridable for firmware variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattConfig {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    #[serde(default = "default_write_char_uuid")]
    pub write_char_uuid: Uuid,
    #[serde(default = "default_notify_char_uuid")]
    pub notify_char_uuid: Uuid,
}

impl Default for GattConfig {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            write_char_uuid: default_write_char_uuid(),
            notify_char_uuid: default_notify_char_uuid(),
        }
    }
}

fn default_service_uuid() -> Uuid {
    RING_SERVICE_UUID
}
fn default_write_char_uuid() -> Uuid {
    RING_WRITE_CHAR_UUID
}
fn default_notify_char_uuid() -> Uuid {
    RING_NOTIFY_CHAR_UUID
}

/// Parameters for one heart-rate measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Acquisition duration in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u8,
    /// Sampling frequency code in Hz.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u8,
    #[serde(default = "default_enabled")]
    pub upload_waveform: bool,
    #[serde(default = "default_enabled")]
    pub upload_progress: bool,
    #[serde(default = "default_enabled")]
    pub upload_rr: bool,
    /// Wall-clock budget for acknowledging a device push, in milliseconds.
    #[serde(default = "default_ack_deadline_ms")]
    pub ack_deadline_ms: u64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            sample_rate_hz: default_sample_rate_hz(),
            upload_waveform: default_enabled(),
            upload_progress: default_enabled(),
            upload_rr: default_enabled(),
            ack_deadline_ms: default_ack_deadline_ms(),
        }
    }
}

impl MeasurementConfig {
    /// Start-measurement command payload:
    /// `[duration_s][sample_rate_hz][waveform][progress][rr]`.
    pub fn start_payload(&self) -> Vec<u8> {
        vec![
            self.duration_secs,
            self.sample_rate_hz,
            self.upload_waveform as u8,
            self.upload_progress as u8,
            self.upload_rr as u8,
        ]
    }

    pub fn acquisition_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }

    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }
}

fn default_duration_secs() -> u8 {
    30
}
fn default_sample_rate_hz() -> u8 {
    50
}
fn default_enabled() -> bool {
    true
}
fn default_ack_deadline_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// "trace", "debug", "info", "warn", or "error".
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default)]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    /// "daily", "hourly", "minutely", or "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: false,
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "smartring".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gatt: GattConfig,
    #[serde(default)]
    pub measurement: MeasurementConfig,
    #[serde(default)]
    pub log_settings: LogSettings,
    /// Identifier of the last ring the user paired, for auto-reconnect.
    #[serde(default)]
    pub last_paired_device: Option<String>,
}

/// Loads and persists [`Settings`] as JSON in the platform config dir.
pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("SmartRing");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_last_paired_device(&mut self, id: Option<String>) -> anyhow::Result<()> {
        self.settings.last_paired_device = id;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_start_payload_matches_protocol_reference() {
        // Reference frame from the protocol doc: 00 09 31 00 1e 32 01 01 01
        // (30 s, 50 Hz, waveform + progress + RR uploads on).
        let payload = MeasurementConfig::default().start_payload();
        assert_eq!(payload, vec![0x1e, 0x32, 0x01, 0x01, 0x01]);
    }

    #[test]
    fn settings_survive_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.gatt.service_uuid, RING_SERVICE_UUID);
        assert_eq!(settings.measurement.duration_secs, 30);
        assert_eq!(settings.measurement.ack_deadline_ms, 2000);
        assert!(settings.last_paired_device.is_none());
    }

    #[test]
    fn settings_round_trip_json() {
        let mut settings = Settings::default();
        settings.measurement.duration_secs = 60;
        settings.last_paired_device = Some("AA:BB".to_string());

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.measurement.duration_secs, 60);
        assert_eq!(back.last_paired_device.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn uuid_constants_share_private_base() {
        for uuid in [RING_SERVICE_UUID, RING_WRITE_CHAR_UUID, RING_NOTIFY_CHAR_UUID] {
            let s = uuid.to_string();
            assert!(s.starts_with("bae8"), "{s}");
            assert!(s.ends_with("4f05-4503-8e65-3af1f7329d1f"), "{s}");
        }
    }
}
