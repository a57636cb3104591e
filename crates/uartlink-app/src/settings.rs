use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uartlink_core::{LinkConfig, Markers, TextEncoding};

const DEFAULT_MAX_BACKLOG: usize = 16 * 1024 * 1024;

/// Persisted operator settings, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub send_port: String,
    pub receive_port: String,
    pub baud_rate: u32,
    pub markers: Markers,
    pub max_backlog: Option<usize>,
    pub encoding: String,
    pub image_path: PathBuf,
    pub history_size: usize,
    pub idle_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            send_port: "/dev/ttyACM0".to_string(),
            receive_port: "/dev/ttyACM1".to_string(),
            baud_rate: 115_200,
            markers: Markers::default(),
            max_backlog: Some(DEFAULT_MAX_BACKLOG),
            encoding: TextEncoding::Auto.to_string(),
            image_path: PathBuf::from("received_image.png"),
            history_size: 1000,
            idle_delay_ms: 10,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("uartlink").join("settings.json"))
    }

    /// Missing files yield the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing settings in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating settings directory {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing settings to {}", path.display()))
    }

    pub fn text_encoding(&self) -> Result<TextEncoding> {
        Ok(self.encoding.parse()?)
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            markers: self.markers.clone(),
            max_backlog: self.max_backlog,
            idle_delay: Duration::from_millis(self.idle_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("uartlink-settings-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = scratch_dir("missing").join("settings.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = scratch_dir("save");
        let path = dir.join("nested").join("settings.json");
        let settings = Settings {
            send_port: "/dev/ttyUSB0".into(),
            receive_port: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
            markers: Markers::new(b"<img>", b"</img>").unwrap(),
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"baud_rate": 57600}"#).unwrap();
        assert_eq!(settings.baud_rate, 57600);
        assert_eq!(settings.send_port, "/dev/ttyACM0");
        assert_eq!(settings.markers, Markers::default());
    }

    #[test]
    fn test_invalid_markers_rejected() {
        let raw = r#"{"markers": {"image_start": "SAME", "image_end": "SAME"}}"#;
        assert!(serde_json::from_str::<Settings>(raw).is_err());
    }

    #[test]
    fn test_link_config() {
        let settings = Settings::default();
        let config = settings.link_config();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.max_backlog, Some(DEFAULT_MAX_BACKLOG));
        assert_eq!(settings.text_encoding().unwrap(), TextEncoding::Auto);
    }
}
