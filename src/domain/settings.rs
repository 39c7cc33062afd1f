use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
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
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "hollow_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_audio_uuid")]
    pub ble_audio_char_uuid: String,
    #[serde(default = "default_text_uuid")]
    pub ble_text_char_uuid: String,
    #[serde(default = "default_name_prefix")]
    pub device_name_prefix: String,

    // Reconnection Settings
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    // Outbound Text Settings
    #[serde(default = "default_text_chunk_size")]
    pub text_chunk_size: usize,
    #[serde(default = "default_text_chunk_delay_ms")]
    pub text_chunk_delay_ms: u64,

    // Pipeline Settings
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub audio_sample_rate: u32,

    // Persisted State
    #[serde(default)]
    pub last_connected_device: Option<String>,
    #[serde(default)]
    pub active_persona: Option<String>,
    #[serde(default)]
    pub active_rules: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),

            ble_service_uuid: default_service_uuid(),
            ble_audio_char_uuid: default_audio_uuid(),
            ble_text_char_uuid: default_text_uuid(),
            device_name_prefix: default_name_prefix(),

            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),

            text_chunk_size: default_text_chunk_size(),
            text_chunk_delay_ms: default_text_chunk_delay_ms(),

            processing_timeout_ms: default_processing_timeout_ms(),
            audio_sample_rate: default_sample_rate(),

            last_connected_device: None,
            active_persona: None,
            active_rules: None,
        }
    }
}

impl Settings {
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }
}

fn default_service_uuid() -> String {
    "4fafc201-1fb5-459e-8fcc-c5c9c331914b".to_string()
}
fn default_audio_uuid() -> String {
    "beb5483e-36e1-4688-b7f5-ea07361b26a8".to_string()
}
fn default_text_uuid() -> String {
    "0a3d547e-6967-4660-a744-8ace08191266".to_string()
}
fn default_name_prefix() -> String {
    "Hollow".to_string()
}
fn default_reconnect_max_attempts() -> u32 {
    5
}
fn default_reconnect_base_delay_ms() -> u64 {
    1000
}
fn default_text_chunk_size() -> usize {
    180
}
fn default_text_chunk_delay_ms() -> u64 {
    20
}
fn default_processing_timeout_ms() -> u64 {
    120_000
}
fn default_sample_rate() -> u32 {
    16_000
}

/// File-backed settings store. Also the settings collaborator the session
/// engine reads persona/rules from and writes pushed personas to.
pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit location, falling back to defaults.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                if settings_path.exists() {
                    warn!("Ignoring unreadable settings file: {}", e);
                }
                Settings::default()
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
        path.push("HollowLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
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

    pub fn active_persona(&self) -> Option<String> {
        self.settings.active_persona.clone()
    }

    pub fn active_rules(&self) -> Option<String> {
        self.settings.active_rules.clone()
    }

    /// Store a persona payload pushed by the watch, verbatim.
    pub fn apply_persona(&mut self, payload: &str) -> anyhow::Result<()> {
        info!("Persona updated from watch ({} bytes)", payload.len());
        self.settings.active_persona = Some(payload.to_string());
        self.save()
    }

    pub fn set_last_connected(&mut self, device_id: Option<String>) -> anyhow::Result<()> {
        if self.settings.last_connected_device == device_id {
            return Ok(());
        }
        self.settings.last_connected_device = device_id;
        self.save()
    }
}

#[cfg(test)]
pub(crate) fn temp_settings_path(tag: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join(format!("hollow_link_{}_{}_{}", tag, std::process::id(), n))
        .join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "reconnect_max_attempts": 2 }"#).unwrap();
        assert_eq!(settings.reconnect_max_attempts, 2);
        assert_eq!(settings.reconnect_base_delay_ms, 1000);
        assert_eq!(settings.text_chunk_size, 180);
        assert_eq!(settings.device_name_prefix, "Hollow");
        assert_eq!(settings.log_settings.level, "info");
        assert!(settings.active_persona.is_none());
    }

    #[test]
    fn test_persona_round_trips_through_file() {
        let path = temp_settings_path("persona");
        let mut service = SettingsService::with_path(path.clone());
        service.apply_persona(r#"{"name":"Ada"}"#).unwrap();
        service.set_last_connected(Some("AA:BB".to_string())).unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.active_persona().as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(
            reloaded.get().last_connected_device.as_deref(),
            Some("AA:BB")
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let path = temp_settings_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().reconnect_max_attempts, 5);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
