//! padrelay: userspace game controller driver
//!
//! Reads physical pads (evdev nodes, raw Xbox 360 HID devices or recorded
//! captures), normalizes them into a [`GenericInputMessage`], runs them
//! through a modifier chain and a remap table, and emits the result on
//! virtual uinput joystick/mouse/keyboard devices.

pub mod backend;
pub mod controller;
pub mod manager;
pub mod mapping;
pub mod modifier;
pub mod slot;

// Re-export commonly used items
pub use backend::{DeviceId, VirtualOutputMultiplexer};
pub use controller::{Axis, Button, ControllerSource, DeviceIdentity, GenericInputMessage};
pub use manager::SlotManager;
pub use mapping::{Config, MappingExecutor};
pub use modifier::{Modifier, ModifierChain};
pub use slot::{ControllerSlot, SlotConfig, SlotState};
