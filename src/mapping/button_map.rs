//! Button and axis remap tables
//!
//! A [`ButtonRemapTable`] maps every logical button, optionally qualified by
//! a held shift button, to the output event it produces. An
//! [`AxisEventTable`] does the same for axes. Both are filled once during slot
//! configuration and then owned read-only by the slot worker.
//!
//! Events are written as `[device:]NAME[:value[:repeat_ms]]`, for example
//! `BTN_X`, `keyboard:KEY_SPACE`, `mouse:REL_WHEEL:1:200` or `ABS_HAT0X:-1`.

use crate::backend::codes::{
    abs_name, is_mouse_button, key_name, parse_abs, parse_key, parse_rel, rel_name,
};
use crate::backend::{
    AbsRange, BackendError, DeviceId, VirtualOutputMultiplexer, DEVICE_JOYSTICK, DEVICE_KEYBOARD,
    DEVICE_MOUSE,
};
use crate::controller::{Axis, Button};
use std::fmt;
use std::str::FromStr;

const DEFAULT_REL_BUTTON_VALUE: i32 = 3;
const DEFAULT_REL_BUTTON_REPEAT_MS: i32 = 100;
const DEFAULT_REL_AXIS_SPEED: i32 = 10;
const DEFAULT_REL_AXIS_REPEAT_MS: i32 = 10;

/// Output produced by a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonEvent {
    #[default]
    Void,
    Key {
        device: u16,
        code: u16,
    },
    /// Relative motion repeated every `repeat_ms` while held (`-1`: once per press)
    Rel {
        device: u16,
        code: u16,
        value: i32,
        repeat_ms: i32,
    },
    /// Absolute axis set to `value` while held, back to 0 on release
    Abs {
        device: u16,
        code: u16,
        value: i32,
    },
}

/// Output produced by an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisEvent {
    #[default]
    Void,
    Abs {
        device: u16,
        code: u16,
    },
    /// Relative motion proportional to the deflection, repeated while deflected
    Rel {
        device: u16,
        code: u16,
        speed: i32,
        repeat_ms: i32,
    },
}

fn device_label(device: u16) -> String {
    match device {
        DEVICE_JOYSTICK => "joystick".to_string(),
        DEVICE_MOUSE => "mouse".to_string(),
        DEVICE_KEYBOARD => "keyboard".to_string(),
        n => n.to_string(),
    }
}

fn parse_device(token: &str) -> Option<u16> {
    match token.to_ascii_lowercase().as_str() {
        "joystick" | "js" => Some(DEVICE_JOYSTICK),
        "mouse" => Some(DEVICE_MOUSE),
        "keyboard" | "kbd" => Some(DEVICE_KEYBOARD),
        other => other.parse().ok(),
    }
}

fn parse_number(token: Option<&&str>, default: i32, what: &str, text: &str) -> Result<i32, String> {
    match token {
        None => Ok(default),
        Some(t) => t
            .trim()
            .parse()
            .map_err(|_| format!("invalid {} '{}' in '{}'", what, t, text)),
    }
}

/// Split `[device:]NAME[:a[:b]]` into (device, NAME, parameters)
fn split_event(text: &str) -> Result<(Option<u16>, &str, Vec<&str>), String> {
    let tokens: Vec<&str> = text.trim().split(':').map(str::trim).collect();
    let (device, rest) = match tokens.split_first() {
        Some((first, rest)) if !rest.is_empty() => match parse_device(first) {
            Some(device) => (Some(device), rest),
            None => (None, tokens.as_slice()),
        },
        _ => (None, tokens.as_slice()),
    };
    let (name, params) = rest
        .split_first()
        .ok_or_else(|| format!("empty event '{}'", text))?;
    if name.is_empty() {
        return Err(format!("empty event '{}'", text));
    }
    Ok((device, *name, params.to_vec()))
}

fn is_void(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "void" | "none")
}

fn too_many(params: &[&str], allowed: usize, text: &str) -> Result<(), String> {
    if params.len() > allowed {
        Err(format!("too many parameters in '{}'", text))
    } else {
        Ok(())
    }
}

impl FromStr for ButtonEvent {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (device, name, params) = split_event(text)?;
        if is_void(name) {
            too_many(&params, 0, text)?;
            return Ok(ButtonEvent::Void);
        }

        let upper = name.to_ascii_uppercase();
        if upper.starts_with("REL_") {
            too_many(&params, 2, text)?;
            let code = parse_rel(name).ok_or_else(|| format!("unknown relative axis '{}'", name))?;
            return Ok(ButtonEvent::Rel {
                device: device.unwrap_or(DEVICE_MOUSE),
                code,
                value: parse_number(params.first(), DEFAULT_REL_BUTTON_VALUE, "value", text)?,
                repeat_ms: parse_number(params.get(1), DEFAULT_REL_BUTTON_REPEAT_MS, "repeat", text)?,
            });
        }
        if upper.starts_with("ABS_") {
            too_many(&params, 1, text)?;
            let code = parse_abs(name).ok_or_else(|| format!("unknown absolute axis '{}'", name))?;
            return Ok(ButtonEvent::Abs {
                device: device.unwrap_or(DEVICE_JOYSTICK),
                code,
                value: parse_number(params.first(), 1, "value", text)?,
            });
        }

        too_many(&params, 0, text)?;
        let code = parse_key(name).ok_or_else(|| format!("unknown key '{}'", name))?;
        let default_device = if upper.starts_with("KEY_") {
            DEVICE_KEYBOARD
        } else if is_mouse_button(code) {
            DEVICE_MOUSE
        } else {
            DEVICE_JOYSTICK
        };
        Ok(ButtonEvent::Key {
            device: device.unwrap_or(default_device),
            code,
        })
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonEvent::Void => write!(f, "void"),
            ButtonEvent::Key { device, code } => {
                write!(f, "{}:{}", device_label(*device), key_name(*code))
            }
            ButtonEvent::Rel { device, code, value, repeat_ms } => write!(
                f,
                "{}:{}:{}:{}",
                device_label(*device),
                rel_name(*code),
                value,
                repeat_ms
            ),
            ButtonEvent::Abs { device, code, value } => {
                write!(f, "{}:{}:{}", device_label(*device), abs_name(*code), value)
            }
        }
    }
}

impl ButtonEvent {
    pub fn is_void(&self) -> bool {
        matches!(self, ButtonEvent::Void)
    }

    /// Declare the capability this event needs on the slot's output group
    pub fn declare(&self, mux: &VirtualOutputMultiplexer, group: u16) -> Result<(), BackendError> {
        match *self {
            ButtonEvent::Void => Ok(()),
            ButtonEvent::Key { device, code } => mux.add_key(DeviceId::new(group, device), code),
            ButtonEvent::Rel { device, code, .. } => mux.add_rel(DeviceId::new(group, device), code),
            ButtonEvent::Abs { device, code, value } => {
                let reach = value.abs().max(1);
                mux.add_abs(DeviceId::new(group, device), code, AbsRange::new(-reach, reach))
            }
        }
    }
}

impl FromStr for AxisEvent {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (device, name, params) = split_event(text)?;
        if is_void(name) {
            too_many(&params, 0, text)?;
            return Ok(AxisEvent::Void);
        }

        let upper = name.to_ascii_uppercase();
        if upper.starts_with("REL_") {
            too_many(&params, 2, text)?;
            let code = parse_rel(name).ok_or_else(|| format!("unknown relative axis '{}'", name))?;
            return Ok(AxisEvent::Rel {
                device: device.unwrap_or(DEVICE_MOUSE),
                code,
                speed: parse_number(params.first(), DEFAULT_REL_AXIS_SPEED, "speed", text)?,
                repeat_ms: parse_number(params.get(1), DEFAULT_REL_AXIS_REPEAT_MS, "repeat", text)?,
            });
        }
        if upper.starts_with("ABS_") {
            too_many(&params, 0, text)?;
            let code = parse_abs(name).ok_or_else(|| format!("unknown absolute axis '{}'", name))?;
            return Ok(AxisEvent::Abs {
                device: device.unwrap_or(DEVICE_JOYSTICK),
                code,
            });
        }
        Err(format!("axis event must be void, ABS_* or REL_*, got '{}'", text))
    }
}

impl fmt::Display for AxisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisEvent::Void => write!(f, "void"),
            AxisEvent::Abs { device, code } => write!(f, "{}:{}", device_label(*device), abs_name(*code)),
            AxisEvent::Rel { device, code, speed, repeat_ms } => write!(
                f,
                "{}:{}:{}:{}",
                device_label(*device),
                rel_name(*code),
                speed,
                repeat_ms
            ),
        }
    }
}

impl AxisEvent {
    pub fn is_void(&self) -> bool {
        matches!(self, AxisEvent::Void)
    }

    /// Declare the capability this event needs, using `source`'s range for absolute output
    pub fn declare(&self, mux: &VirtualOutputMultiplexer, group: u16, source: Axis) -> Result<(), BackendError> {
        match *self {
            AxisEvent::Void => Ok(()),
            AxisEvent::Abs { device, code } => {
                let range = if source.is_stick() {
                    AbsRange::stick(source.min(), source.max())
                } else {
                    AbsRange::new(source.min(), source.max())
                };
                mux.add_abs(DeviceId::new(group, device), code, range)
            }
            AxisEvent::Rel { device, code, .. } => mux.add_rel(DeviceId::new(group, device), code),
        }
    }
}

/// Two-level button table: `[shift][button] -> event`
///
/// Row 0 holds the unshifted bindings, row `1 + shift.index()` the bindings
/// active while `shift` is held. Every cell starts out as `Void`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonRemapTable {
    table: [[ButtonEvent; Button::COUNT]; Button::COUNT + 1],
}

impl Default for ButtonRemapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonRemapTable {
    pub fn new() -> Self {
        Self {
            table: [[ButtonEvent::Void; Button::COUNT]; Button::COUNT + 1],
        }
    }

    /// Table carrying the standard gamepad layout
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        let defaults: [(Button, &str); 11] = [
            (Button::A, "BTN_A"),
            (Button::B, "BTN_B"),
            (Button::X, "BTN_X"),
            (Button::Y, "BTN_Y"),
            (Button::Start, "BTN_START"),
            (Button::Back, "BTN_SELECT"),
            (Button::Guide, "BTN_MODE"),
            (Button::LB, "BTN_TL"),
            (Button::RB, "BTN_TR"),
            (Button::ThumbL, "BTN_THUMBL"),
            (Button::ThumbR, "BTN_THUMBR"),
        ];
        for (button, name) in defaults {
            if let Some(code) = parse_key(name) {
                map.bind(button, ButtonEvent::Key { device: DEVICE_JOYSTICK, code });
            }
        }
        map
    }

    pub fn bind(&mut self, code: Button, event: ButtonEvent) {
        self.table[0][code.index()] = event;
    }

    pub fn bind_shifted(&mut self, shift: Button, code: Button, event: ButtonEvent) {
        self.table[1 + shift.index()][code.index()] = event;
    }

    pub fn lookup(&self, code: Button) -> ButtonEvent {
        self.table[0][code.index()]
    }

    pub fn lookup_shifted(&self, shift: Button, code: Button) -> ButtonEvent {
        self.table[1 + shift.index()][code.index()]
    }

    /// Reset every cell, shifted or not, to `Void`
    pub fn clear(&mut self) {
        for row in self.table.iter_mut() {
            row.fill(ButtonEvent::Void);
        }
    }

    /// Buttons that have at least one shifted binding
    pub fn shift_buttons(&self) -> Vec<Button> {
        Button::ALL
            .iter()
            .copied()
            .filter(|shift| self.table[1 + shift.index()].iter().any(|ev| !ev.is_void()))
            .collect()
    }

    /// Every non-void event in the table
    pub fn events(&self) -> impl Iterator<Item = &ButtonEvent> + '_ {
        self.table.iter().flatten().filter(|ev| !ev.is_void())
    }

    pub fn declare(&self, mux: &VirtualOutputMultiplexer, group: u16) -> Result<(), BackendError> {
        for event in self.events() {
            event.declare(mux, group)?;
        }
        Ok(())
    }
}

/// Per-axis output bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisEventTable {
    table: [AxisEvent; Axis::COUNT],
}

impl Default for AxisEventTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisEventTable {
    pub fn new() -> Self {
        Self {
            table: [AxisEvent::Void; Axis::COUNT],
        }
    }

    /// Sticks, triggers and dpad on their usual joystick axes
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        let defaults: [(Axis, &str); 8] = [
            (Axis::X1, "ABS_X"),
            (Axis::Y1, "ABS_Y"),
            (Axis::X2, "ABS_RX"),
            (Axis::Y2, "ABS_RY"),
            (Axis::LT, "ABS_Z"),
            (Axis::RT, "ABS_RZ"),
            (Axis::DpadX, "ABS_HAT0X"),
            (Axis::DpadY, "ABS_HAT0Y"),
        ];
        for (axis, name) in defaults {
            if let Some(code) = parse_abs(name) {
                map.bind(axis, AxisEvent::Abs { device: DEVICE_JOYSTICK, code });
            }
        }
        map
    }

    pub fn bind(&mut self, axis: Axis, event: AxisEvent) {
        self.table[axis.index()] = event;
    }

    pub fn lookup(&self, axis: Axis) -> AxisEvent {
        self.table[axis.index()]
    }

    pub fn clear(&mut self) {
        self.table.fill(AxisEvent::Void);
    }

    pub fn declare(&self, mux: &VirtualOutputMultiplexer, group: u16) -> Result<(), BackendError> {
        for axis in Axis::ALL {
            self.lookup(axis).declare(mux, group, axis)?;
        }
        Ok(())
    }
}
