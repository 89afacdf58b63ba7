//! Configuration loader and validator
//!
//! Loads the driver configuration from a TOML file (configs/default.toml by
//! default): global settings, evdev code tables and one section per slot.

use crate::backend::codes::{parse_abs, parse_key};
use crate::controller::constants::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_SCAN_INTERVAL_MS, DEFAULT_TICK_MS};
use crate::controller::evdev::EvdevMaps;
use crate::controller::{Axis, Button};
use crate::mapping::button_map::{AxisEvent, AxisEventTable, ButtonEvent, ButtonRemapTable};
use crate::modifier::{ModifierChain, ModifierSpec};
use crate::slot::{MatchRule, SlotConfig};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    /// Overrides for the evdev raw code tables
    #[serde(default)]
    pub evdev: EvdevSection,

    #[serde(default)]
    pub slots: Vec<SlotSection>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// How long a slot worker waits for a frame per iteration
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u32,

    /// Period of the hot-plug scan
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,

    /// Period of the manager loop (repeat timers, reaping)
    #[serde(default = "default_tick")]
    pub tick_ms: u64,

    /// Name prefix of the virtual devices
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Grab evdev devices exclusively
    #[serde(default = "default_true")]
    pub evdev_grab: bool,

    /// Record raw USB frames into this directory
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub scan_evdev: bool,

    /// Talk to supported USB pads directly (needs the `usb` feature)
    #[serde(default)]
    pub scan_usb: bool,

    /// Capture files served as if they were plugged-in pads
    #[serde(default)]
    pub replay: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout(),
            scan_interval_ms: default_scan_interval(),
            tick_ms: default_tick(),
            device_name: default_device_name(),
            evdev_grab: true,
            capture_dir: None,
            scan_evdev: true,
            scan_usb: false,
            replay: Vec::new(),
        }
    }
}

fn default_read_timeout() -> u32 { DEFAULT_READ_TIMEOUT_MS }
fn default_scan_interval() -> u64 { DEFAULT_SCAN_INTERVAL_MS }
fn default_tick() -> u64 { DEFAULT_TICK_MS }
fn default_device_name() -> String { "padrelay".to_string() }
fn default_true() -> bool { true }

/// Raw evdev code name -> logical name overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvdevSection {
    #[serde(default)]
    pub keys: BTreeMap<String, String>,

    #[serde(default)]
    pub abs: BTreeMap<String, String>,
}

/// One `[[slots]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSection {
    #[serde(default)]
    pub led: Option<u8>,

    /// Output device group; slots sharing a group share virtual devices
    #[serde(default)]
    pub output_group: Option<u16>,

    /// Start from the standard gamepad layout
    #[serde(default = "default_true")]
    pub default_bindings: bool,

    #[serde(default, rename = "match")]
    pub rules: Vec<MatchRule>,

    /// `"A" = "BTN_X"` or, shifted, `"LB+A" = "KEY_SPACE"`
    #[serde(default)]
    pub buttons: BTreeMap<String, String>,

    #[serde(default)]
    pub axes: BTreeMap<String, String>,

    #[serde(default)]
    pub modifiers: Vec<ModifierSpec>,
}

impl Default for SlotSection {
    fn default() -> Self {
        Self {
            led: None,
            output_group: None,
            default_bindings: true,
            rules: Vec::new(),
            buttons: BTreeMap::new(),
            axes: BTreeMap::new(),
            modifiers: Vec::new(),
        }
    }
}

impl SlotSection {
    /// Build the button table, defaults first, then the configured bindings
    pub fn button_table(&self) -> Result<ButtonRemapTable, String> {
        let mut table = if self.default_bindings {
            ButtonRemapTable::with_defaults()
        } else {
            ButtonRemapTable::new()
        };
        for (key, value) in &self.buttons {
            let event: ButtonEvent = value.parse()?;
            match key.split_once('+') {
                Some((shift, code)) => {
                    let shift: Button = shift.trim().parse()?;
                    let code: Button = code.trim().parse()?;
                    if shift == code {
                        return Err(format!("'{}' uses {} as its own shift", key, code));
                    }
                    table.bind_shifted(shift, code, event);
                }
                None => table.bind(key.trim().parse()?, event),
            }
        }
        Ok(table)
    }

    pub fn axis_table(&self) -> Result<AxisEventTable, String> {
        let mut table = if self.default_bindings {
            AxisEventTable::with_defaults()
        } else {
            AxisEventTable::new()
        };
        for (key, value) in &self.axes {
            let axis: Axis = key.trim().parse()?;
            let event: AxisEvent = value.parse()?;
            table.bind(axis, event);
        }
        Ok(table)
    }

    /// Runtime configuration for the slot at `index`
    pub fn slot_config(&self, index: usize) -> Result<SlotConfig, String> {
        // build once to check every modifier parameter
        ModifierChain::from_specs(&self.modifiers)?;
        Ok(SlotConfig {
            buttons: self.button_table()?,
            axes: self.axis_table()?,
            modifiers: self.modifiers.clone(),
            group: self.output_group.unwrap_or(index as u16),
            led: self.led,
            rules: self.rules.clone(),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::from_toml(&content)?;
        info!("✓ Config validation passed");
        Ok(config)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        debug!("  - Slots: {}", config.slots.len());
        debug!("  - Scan: evdev={} usb={}", config.settings.scan_evdev, config.settings.scan_usb);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.settings;
        if s.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be positive".into()));
        }
        if s.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid("scan_interval_ms must be positive".into()));
        }
        if s.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if s.device_name.trim().is_empty() {
            return Err(ConfigError::Invalid("device_name must not be empty".into()));
        }

        if self.slots.is_empty() {
            return Err(ConfigError::Invalid("At least one slot is required".into()));
        }

        self.evdev_maps()?;
        self.slot_configs()?;
        Ok(())
    }

    /// evdev code tables: the standard layout plus the configured overrides
    pub fn evdev_maps(&self) -> Result<EvdevMaps, ConfigError> {
        let mut maps = EvdevMaps::with_defaults();
        for (raw, logical) in &self.evdev.keys {
            let code = parse_key(raw)
                .ok_or_else(|| ConfigError::Invalid(format!("evdev.keys: unknown key '{}'", raw)))?;
            let button: Button = logical
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("evdev.keys.{}: {}", raw, e)))?;
            maps.bind_key(code, button);
        }
        for (raw, logical) in &self.evdev.abs {
            let code = parse_abs(raw)
                .ok_or_else(|| ConfigError::Invalid(format!("evdev.abs: unknown axis '{}'", raw)))?;
            let axis: Axis = logical
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("evdev.abs.{}: {}", raw, e)))?;
            maps.bind_abs(code, axis);
        }
        Ok(maps)
    }

    /// Runtime slot configurations, in slot order
    pub fn slot_configs(&self) -> Result<Vec<SlotConfig>, ConfigError> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.slot_config(index)
                    .map_err(|e| ConfigError::Invalid(format!("slot {}: {}", index, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DEVICE_KEYBOARD, DEVICE_MOUSE};
    use evdev::KeyCode;

    fn one_slot() -> Config {
        Config {
            slots: vec![SlotSection::default()],
            ..Config::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.read_timeout_ms, 20);
        assert_eq!(settings.scan_interval_ms, 1000);
        assert_eq!(settings.tick_ms, 10);
        assert_eq!(settings.device_name, "padrelay");
        assert!(settings.evdev_grab);
        assert!(settings.scan_evdev);
        assert!(!settings.scan_usb);
    }

    #[test]
    fn test_valid_config_minimal() {
        assert!(one_slot().validate().is_ok());
    }

    #[test]
    fn test_no_slots() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_invalid_timeouts() {
        let mut config = one_slot();
        config.settings.read_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = one_slot();
        config.settings.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_config_from_toml() {
        let text = r#"
            [settings]
            read_timeout_ms = 15
            device_name = "Test Pad"

            [evdev.keys]
            BTN_TRIGGER = "A"

            [evdev.abs]
            ABS_THROTTLE = "RT"

            [[slots]]
            led = 3
            output_group = 4
            match = [{ type = "usbid", vendor = 0x045e, product = 0x028e }]

            [slots.buttons]
            A = "BTN_X"
            "LB+A" = "KEY_SPACE"
            Back = "void"

            [slots.axes]
            X2 = "mouse:REL_X:20:10"

            [[slots.modifiers]]
            type = "relative_axis"
            axis = "X1"
            speed = 32768

            [[slots]]
            default_bindings = false
        "#;
        let config = Config::from_toml(text).unwrap();
        assert_eq!(config.settings.read_timeout_ms, 15);
        assert_eq!(config.settings.tick_ms, 10);

        let maps = config.evdev_maps().unwrap();
        assert_eq!(maps.key(KeyCode::BTN_TRIGGER.code()), Some(Button::A));
        assert_eq!(maps.key(KeyCode::BTN_SOUTH.code()), Some(Button::A));

        let slots = config.slot_configs().unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].group, 4);
        assert_eq!(slots[1].group, 1);
        assert_eq!(slots[0].led, Some(3));
        assert_eq!(slots[0].rules.len(), 1);
        assert_eq!(
            slots[0].buttons.lookup_shifted(Button::LB, Button::A),
            ButtonEvent::Key { device: DEVICE_KEYBOARD, code: KeyCode::KEY_SPACE.code() }
        );
        assert!(slots[0].buttons.lookup(Button::Back).is_void());
        assert!(matches!(slots[0].axes.lookup(Axis::X2), AxisEvent::Rel { device: DEVICE_MOUSE, speed: 20, .. }));
        assert_eq!(slots[0].modifiers.len(), 1);

        assert_eq!(slots[1].buttons.events().count(), 0);
        assert!(slots[1].axes.lookup(Axis::X1).is_void());
    }

    #[test]
    fn test_invalid_bindings_are_rejected() {
        for (key, value) in [("A", "KEY_NOPE"), ("Q", "BTN_X"), ("A+A", "BTN_X"), ("LB+", "BTN_X")] {
            let mut config = one_slot();
            config.slots[0].buttons.insert(key.into(), value.into());
            assert!(config.validate().is_err(), "{} = {} should be invalid", key, value);
        }

        let mut config = one_slot();
        config.slots[0].axes.insert("X1".into(), "KEY_A".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_modifier_is_rejected() {
        let text = r#"
            [[slots]]
            [[slots.modifiers]]
            type = "autofire"
            button = "A"
            frequency = 0
        "#;
        assert!(matches!(Config::from_toml(text), Err(ConfigError::Invalid(_))));

        let text = r#"
            [[slots]]
            [[slots.modifiers]]
            type = "wobble"
        "#;
        assert!(matches!(Config::from_toml(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_evdev_override() {
        let mut config = one_slot();
        config.evdev.abs.insert("ABS_X".into(), "X9".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/default.toml");
        let config = Config::load(path).unwrap();
        assert!(!config.slots.is_empty());
    }
}
