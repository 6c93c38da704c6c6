//! Persisted device configuration
//!
//! The record is stored as a small JSON document grouped into a `NETWORK`
//! and a `CAMERA` section. Every field is optional on disk and falls back to
//! its default, so a partially written or older file still loads.
//!
//! String fields have fixed capacities inherited from the device's storage
//! layout. Longer values are truncated, never rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Maximum SSID length in bytes
pub const SSID_CAPACITY: usize = 32;
/// Maximum password length in bytes
pub const PASSWORD_CAPACITY: usize = 64;
/// Maximum upload URL length in bytes
pub const UPLOAD_URL_CAPACITY: usize = 128;

/// Default capture interval in milliseconds
pub const DEFAULT_CAPTURE_INTERVAL_MS: u32 = 300;

/// Configuration store errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist configuration: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Camera frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Resolution {
    /// 320 x 240
    Qvga,
    /// 640 x 480
    #[default]
    Vga,
    /// 800 x 600
    Svga,
    /// 1280 x 1024
    Sxga,
    /// 1600 x 1200
    Uxga,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::Qvga,
        Resolution::Vga,
        Resolution::Svga,
        Resolution::Sxga,
        Resolution::Uxga,
    ];

    /// Parse a tag case-insensitively
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.tag().eq_ignore_ascii_case(tag.trim()))
    }

    /// Parse a tag, falling back to VGA for anything unknown
    pub fn from_tag_or_default(tag: &str) -> Self {
        Self::from_tag(tag).unwrap_or_else(|| {
            log::warn!("Resolution '{}' is not supported, using VGA", tag);
            Resolution::Vga
        })
    }

    /// Lower-case tag used on the form and on disk
    pub fn tag(&self) -> &'static str {
        match self {
            Resolution::Qvga => "qvga",
            Resolution::Vga => "vga",
            Resolution::Svga => "svga",
            Resolution::Sxga => "sxga",
            Resolution::Uxga => "uxga",
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Qvga => (320, 240),
            Resolution::Vga => (640, 480),
            Resolution::Svga => (800, 600),
            Resolution::Sxga => (1280, 1024),
            Resolution::Uxga => (1600, 1200),
        }
    }
}

impl From<String> for Resolution {
    fn from(tag: String) -> Self {
        Resolution::from_tag_or_default(&tag)
    }
}

impl From<Resolution> for String {
    fn from(res: Resolution) -> Self {
        res.tag().to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{} - {} x {}", self.tag().to_uppercase(), w, h)
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub ssid: String,
    pub password: String,
    pub upload_url: String,
    pub resolution: Resolution,
    pub capture_interval_ms: u32,
    pub vertical_flip: i32,
    pub brightness: i32,
    pub saturation: i32,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        ConfigRecord {
            ssid: String::new(),
            password: String::new(),
            upload_url: String::new(),
            resolution: Resolution::Vga,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            vertical_flip: 0,
            brightness: 0,
            saturation: 0,
        }
    }
}

impl ConfigRecord {
    /// Clamp string fields to their storage capacities
    pub fn truncated(mut self) -> Self {
        truncate_to(&mut self.ssid, SSID_CAPACITY);
        truncate_to(&mut self.password, PASSWORD_CAPACITY);
        truncate_to(&mut self.upload_url, UPLOAD_URL_CAPACITY);
        self
    }

    /// Parse the on-disk JSON layout
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_json::from_str(text)?;
        Ok(ConfigRecord::from(doc).truncated())
    }

    /// Render the on-disk JSON layout
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&ConfigDocument::from(self))?)
    }
}

/// Cut `s` to at most `capacity` bytes without splitting a character
fn truncate_to(s: &mut String, capacity: usize) {
    if s.len() <= capacity {
        return;
    }
    let mut end = capacity;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

// On-disk layout

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "NETWORK", default)]
    network: NetworkSection,
    #[serde(rename = "CAMERA", default)]
    camera: CameraSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
struct NetworkSection {
    ssid: String,
    password: String,
    upload_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
struct CameraSection {
    #[serde(rename = "CAPTURE_INTERVAL_IN_MS")]
    capture_interval_ms: u32,
    resolution: Resolution,
    vertical_flip: i32,
    brightness: i32,
    saturation: i32,
}

impl Default for CameraSection {
    fn default() -> Self {
        let record = ConfigRecord::default();
        CameraSection {
            capture_interval_ms: record.capture_interval_ms,
            resolution: record.resolution,
            vertical_flip: record.vertical_flip,
            brightness: record.brightness,
            saturation: record.saturation,
        }
    }
}

impl From<ConfigDocument> for ConfigRecord {
    fn from(doc: ConfigDocument) -> Self {
        ConfigRecord {
            ssid: doc.network.ssid,
            password: doc.network.password,
            upload_url: doc.network.upload_url,
            resolution: doc.camera.resolution,
            capture_interval_ms: doc.camera.capture_interval_ms,
            vertical_flip: doc.camera.vertical_flip,
            brightness: doc.camera.brightness,
            saturation: doc.camera.saturation,
        }
    }
}

impl From<&ConfigRecord> for ConfigDocument {
    fn from(record: &ConfigRecord) -> Self {
        ConfigDocument {
            network: NetworkSection {
                ssid: record.ssid.clone(),
                password: record.password.clone(),
                upload_url: record.upload_url.clone(),
            },
            camera: CameraSection {
                capture_interval_ms: record.capture_interval_ms,
                resolution: record.resolution,
                vertical_flip: record.vertical_flip,
                brightness: record.brightness,
                saturation: record.saturation,
            },
        }
    }
}

/// Configuration storage collaborator
pub trait ConfigStore {
    /// Load the record, applying defaults for anything missing
    fn load(&self) -> Result<ConfigRecord, ConfigError>;

    /// Replace the stored record
    fn save(&mut self, record: &ConfigRecord) -> Result<(), ConfigError>;
}

/// JSON file store with atomic replacement
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<ConfigRecord, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => ConfigRecord::from_json(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("{} not found, using defaults", self.path.display());
                Ok(ConfigRecord::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, record: &ConfigRecord) -> Result<(), ConfigError> {
        let json = record.to_json()?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        // Write next to the target so the rename stays on one filesystem
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        log::info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}
