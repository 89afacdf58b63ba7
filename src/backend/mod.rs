//! Backend abstraction for virtual input devices
//!
//! This module provides a unified interface for creating synthetic
//! joystick/mouse/keyboard devices and sending events to them. The real
//! backend goes through uinput; the mock backend records what would be sent.

pub mod codes;
pub mod mock;
pub mod multiplexer;
pub mod uinput;

pub use mock::{MockDeviceFactory, MockOutputLog};
pub use multiplexer::VirtualOutputMultiplexer;
pub use uinput::UinputDeviceFactory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No virtual device registered for {0}")]
    UnknownDevice(DeviceId),

    #[error("Virtual devices are already active; capabilities cannot change")]
    AlreadyFinished,

    #[error("Virtual devices have not been activated yet")]
    NotFinished,

    #[error("Backend operation failed: {0}")]
    Operation(String),
}

/// Device kind within a group
pub const DEVICE_JOYSTICK: u16 = 0;
pub const DEVICE_MOUSE: u16 = 1;
pub const DEVICE_KEYBOARD: u16 = 2;

/// Identifies one virtual device: a group (usually one per slot) and a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn new(group: u16, kind: u16) -> Self {
        Self(((group as u32) << 16) | kind as u32)
    }

    pub fn joystick(group: u16) -> Self {
        Self::new(group, DEVICE_JOYSTICK)
    }

    pub fn mouse(group: u16) -> Self {
        Self::new(group, DEVICE_MOUSE)
    }

    pub fn keyboard(group: u16) -> Self {
        Self::new(group, DEVICE_KEYBOARD)
    }

    pub fn group(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn kind(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            DEVICE_JOYSTICK => "joystick".to_string(),
            DEVICE_MOUSE => "mouse".to_string(),
            DEVICE_KEYBOARD => "keyboard".to_string(),
            n => format!("device{}", n),
        };
        write!(f, "{}.{}", self.group(), kind)
    }
}

/// Event type understood by the virtual devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Key,
    Rel,
    Abs,
}

/// One event queued for a virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl OutputEvent {
    pub fn new(kind: EventKind, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }
}

/// Range advertised for an absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsRange {
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

impl AbsRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max, fuzz: 0, flat: 0 }
    }

    /// Stick style range with a little fuzz and a center flat
    pub fn stick(min: i32, max: i32) -> Self {
        Self { min, max, fuzz: 16, flat: 128 }
    }
}

/// Capabilities and identity of a virtual device, fixed before activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub keys: BTreeSet<u16>,
    pub rels: BTreeSet<u16>,
    pub abs: BTreeMap<u16, AbsRange>,
}

impl DeviceSpec {
    /// Empty spec named after the device id
    pub fn for_device(prefix: &str, id: DeviceId) -> Self {
        let (vendor, product) = match id.kind() {
            DEVICE_JOYSTICK => (0x045e, 0x028e),
            _ => (0x0000, 0x0000),
        };
        Self {
            name: device_name(prefix, id),
            vendor,
            product,
            keys: BTreeSet::new(),
            rels: BTreeSet::new(),
            abs: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.rels.is_empty() && self.abs.is_empty()
    }
}

/// Human readable name of a virtual device
pub fn device_name(prefix: &str, id: DeviceId) -> String {
    let mut name = match id.kind() {
        DEVICE_JOYSTICK => prefix.to_string(),
        DEVICE_MOUSE => format!("{} - Mouse Emulation", prefix),
        DEVICE_KEYBOARD => format!("{} - Keyboard Emulation", prefix),
        n => format!("{} - {}", prefix, n + 1),
    };
    if id.group() > 0 {
        name.push_str(&format!(" #{}", id.group() + 1));
    }
    name
}

/// An activated virtual device
pub trait OutputDevice: Send {
    /// Write a batch of events followed by a sync report
    fn emit(&mut self, events: &[OutputEvent]) -> Result<(), BackendError>;
}

/// Creates activated virtual devices from their final capabilities
pub trait DeviceFactory: Send + Sync {
    fn create(&self, id: DeviceId, spec: &DeviceSpec) -> Result<Box<dyn OutputDevice>, BackendError>;
}
