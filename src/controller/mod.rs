//! Controller abstraction
//!
//! Every physical controller, whatever its transport, is driven through the
//! [`ControllerSource`] trait: a blocking-with-timeout `read` that fills a
//! [`GenericInputMessage`], plus best-effort LED and rumble control.
//!
//! Backends:
//! - [`evdev::EvdevController`]: any Linux input device
//! - [`usb::Xbox360Controller`] / [`usb::Xbox360WirelessController`]: raw HID pads
//! - [`mock::MockController`]: scripted frames for tests

pub mod capture;
pub mod constants;
pub mod discovery;
pub mod evdev;
pub mod mock;
pub mod types;
pub mod usb;

pub use discovery::{DefaultOpener, DeviceScanner, SourceOpener};
pub use mock::MockController;
pub use types::{Axis, Button, GenericInputMessage};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Failed to open device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to claim device {path}: {reason}")]
    Claim { path: String, reason: String },

    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported device: {0}")]
    Unsupported(String),
}

/// Transport a controller was discovered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    UsbWired,
    UsbWireless { port: u8 },
    Evdev,
    Replay,
    Mock,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::UsbWired => write!(f, "usb"),
            ControllerKind::UsbWireless { port } => write!(f, "usb-wireless:{}", port),
            ControllerKind::Evdev => write!(f, "evdev"),
            ControllerKind::Replay => write!(f, "replay"),
            ControllerKind::Mock => write!(f, "mock"),
        }
    }
}

/// Identity of a discovered or bound device
///
/// For USB devices `bus`/`address` are the USB bus and device numbers; for
/// evdev devices they are the input bus type and the event node number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub kind: ControllerKind,
    pub bus: u16,
    pub address: u16,
    pub vendor: u16,
    pub product: u16,
    pub path: String,
    pub name: String,
}

impl DeviceIdentity {
    /// Two identities refer to the same physical device (or receiver port)
    pub fn same_device(&self, other: &DeviceIdentity) -> bool {
        self.kind == other.kind
            && self.bus == other.bus
            && self.address == other.address
            && self.path == other.path
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:04x}:{:04x}] {} ({:03}:{:03} {})",
            self.name, self.vendor, self.product, self.kind, self.bus, self.address, self.path
        )
    }
}

/// One open controller session
///
/// The underlying handle is owned by the implementor and released when it is
/// dropped, which happens exactly once at the end of the slot worker.
pub trait ControllerSource: Send {
    /// Wait up to `timeout_ms` for a complete frame.
    ///
    /// Returns `Ok(true)` when `msg` was filled with a new frame, `Ok(false)`
    /// when no frame arrived (the message is left untouched) and `Err` when the
    /// device failed mid-session.
    fn read(&mut self, msg: &mut GenericInputMessage, timeout_ms: u32) -> Result<bool, ControllerError>;

    /// Set the LED status. Devices without LEDs ignore this.
    fn set_led(&mut self, _status: u8) {}

    /// Set rumble motor strength. Devices without motors ignore this.
    fn set_rumble(&mut self, _left: u8, _right: u8) {}

    fn identity(&self) -> &DeviceIdentity;
}
