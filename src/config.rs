use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    mapping::{ConfigError, Mapping, MappingTable},
    pad::DecodePolicy,
};

/// Microsoft.
pub const DEFAULT_VENDOR_ID: u16 = 0x045E;
/// HID Generic Desktop page, Game Pad usage.
pub const GENERIC_DESKTOP_PAGE: u16 = 0x01;
pub const GAMEPAD_USAGE: u16 = 0x05;

/// Which HID interfaces count as "the pad".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub usage_page: u16,
    pub usage: u16,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            usage_page: GENERIC_DESKTOP_PAGE,
            usage: GAMEPAD_USAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    pub enabled: bool,
    pub deadzone: f32,
    pub smoothing: f32,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            deadzone: 0.15,
            smoothing: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Output name hint. Unset picks the first available output at startup;
    /// an empty hint disables output.
    pub midi_output: Option<String>,
    pub device: DeviceFilter,
    pub scan_interval_ms: u64,
    pub refresh_hz: u32,
    pub strict_protocol: bool,
    pub analog: AnalogConfig,
    /// Relative paths resolve against the config file's directory.
    pub mappings_file: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            midi_output: None,
            device: DeviceFilter::default(),
            scan_interval_ms: 2000,
            refresh_hz: 60,
            strict_protocol: false,
            analog: AnalogConfig::default(),
            mappings_file: PathBuf::from("mappings.yml"),
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, or return the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = read(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write(path, &serde_yaml::to_string(self)?)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(100))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.clamp(1, 240)))
    }

    pub fn decode_policy(&self) -> DecodePolicy {
        if self.strict_protocol {
            DecodePolicy::Strict
        } else {
            DecodePolicy::Permissive
        }
    }

    pub fn mappings_path(&self, config_path: &Path) -> PathBuf {
        if self.mappings_file.is_absolute() {
            return self.mappings_file.clone();
        }
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.mappings_file)
    }
}

/// Load the mapping table from `path`, seeding the defaults if the file does
/// not exist. Invalid entries are dropped with a warning, as are axis
/// mappings when `analog` is false.
pub fn load_mappings(path: &Path, analog: bool) -> Result<MappingTable, ConfigError> {
    if !path.exists() {
        log::info!("No mappings at {}, using defaults", path.display());
        return Ok(MappingTable::default());
    }

    let text = read(path)?;
    let raw: Vec<Mapping> = serde_yaml::from_str(&text)?;
    let (mut table, rejected) = MappingTable::from_mappings(raw);
    for (mapping, err) in rejected {
        log::warn!("Ignoring mapping {} ({}): {err}", mapping.id, mapping.label);
    }
    if !analog {
        let dropped = table.retain_buttons();
        if dropped > 0 {
            log::warn!("Ignoring {dropped} axis mapping(s): analog input is disabled");
        }
    }
    Ok(table)
}

pub fn save_mappings(path: &Path, table: &MappingTable) -> Result<(), ConfigError> {
    write(path, &serde_yaml::to_string(table)?)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn write(path: &Path, text: &str) -> Result<(), ConfigError> {
    fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
