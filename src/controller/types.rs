//! Controller type definitions
//!
//! This module defines the logical input state every controller backend
//! produces: a fixed set of named buttons and a fixed set of named axes.

use std::fmt;
use std::str::FromStr;

/// Logical button identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Start,
    Back,
    Guide,
    ThumbL,
    ThumbR,
    LB,
    RB,
    LT,
    RT,
    A,
    B,
    X,
    Y,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl Button {
    pub const COUNT: usize = 17;

    pub const ALL: [Button; Button::COUNT] = [
        Button::Start,
        Button::Back,
        Button::Guide,
        Button::ThumbL,
        Button::ThumbR,
        Button::LB,
        Button::RB,
        Button::LT,
        Button::RT,
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
    ];

    /// Position of this button in fixed-size tables
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Start => "Start",
            Button::Back => "Back",
            Button::Guide => "Guide",
            Button::ThumbL => "TL",
            Button::ThumbR => "TR",
            Button::LB => "LB",
            Button::RB => "RB",
            Button::LT => "LT",
            Button::RT => "RT",
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::DpadUp => "DU",
            Button::DpadDown => "DD",
            Button::DpadLeft => "DL",
            Button::DpadRight => "DR",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let button = match s.to_ascii_lowercase().as_str() {
            "start" => Button::Start,
            "back" | "select" => Button::Back,
            "guide" | "mode" => Button::Guide,
            "tl" | "thumbl" => Button::ThumbL,
            "tr" | "thumbr" => Button::ThumbR,
            "lb" | "l1" => Button::LB,
            "rb" | "r1" => Button::RB,
            "lt" | "l2" => Button::LT,
            "rt" | "r2" => Button::RT,
            "a" => Button::A,
            "b" => Button::B,
            "x" => Button::X,
            "y" => Button::Y,
            "du" | "up" | "dpadup" => Button::DpadUp,
            "dd" | "down" | "dpaddown" => Button::DpadDown,
            "dl" | "left" | "dpadleft" => Button::DpadLeft,
            "dr" | "right" | "dpadright" => Button::DpadRight,
            _ => return Err(format!("unknown button '{}'", s)),
        };
        Ok(button)
    }
}

/// Logical axis identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X1,
    Y1,
    X2,
    Y2,
    LT,
    RT,
    DpadX,
    DpadY,
    /// Combined trigger axis (RT - LT)
    Trigger,
}

impl Axis {
    pub const COUNT: usize = 9;

    pub const ALL: [Axis; Axis::COUNT] = [
        Axis::X1,
        Axis::Y1,
        Axis::X2,
        Axis::Y2,
        Axis::LT,
        Axis::RT,
        Axis::DpadX,
        Axis::DpadY,
        Axis::Trigger,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::X1 => "X1",
            Axis::Y1 => "Y1",
            Axis::X2 => "X2",
            Axis::Y2 => "Y2",
            Axis::LT => "LT",
            Axis::RT => "RT",
            Axis::DpadX => "DPAD_X",
            Axis::DpadY => "DPAD_Y",
            Axis::Trigger => "TRIGGER",
        }
    }

    /// Smallest value this axis can carry
    pub fn min(self) -> i32 {
        match self {
            Axis::X1 | Axis::Y1 | Axis::X2 | Axis::Y2 => -32768,
            Axis::LT | Axis::RT => 0,
            Axis::DpadX | Axis::DpadY => -1,
            Axis::Trigger => -255,
        }
    }

    /// Largest value this axis can carry
    pub fn max(self) -> i32 {
        match self {
            Axis::X1 | Axis::Y1 | Axis::X2 | Axis::Y2 => 32767,
            Axis::LT | Axis::RT => 255,
            Axis::DpadX | Axis::DpadY => 1,
            Axis::Trigger => 255,
        }
    }

    pub fn is_stick(self) -> bool {
        matches!(self, Axis::X1 | Axis::Y1 | Axis::X2 | Axis::Y2)
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, Axis::LT | Axis::RT)
    }

    /// Clamp a value into this axis' range
    pub fn clamp(self, value: i32) -> i16 {
        value.clamp(self.min(), self.max()) as i16
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let axis = match s.to_ascii_lowercase().as_str() {
            "x1" => Axis::X1,
            "y1" => Axis::Y1,
            "x2" => Axis::X2,
            "y2" => Axis::Y2,
            "lt" | "l2" => Axis::LT,
            "rt" | "r2" => Axis::RT,
            "dpad_x" | "dpadx" => Axis::DpadX,
            "dpad_y" | "dpady" => Axis::DpadY,
            "trigger" => Axis::Trigger,
            _ => return Err(format!("unknown axis '{}'", s)),
        };
        Ok(axis)
    }
}

/// Logical controller state for one point in time
///
/// Y axes follow the Linux input convention: positive values point down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenericInputMessage {
    buttons: [bool; Button::COUNT],
    axes: [i16; Axis::COUNT],
}

impl GenericInputMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_button(&self, button: Button) -> bool {
        self.buttons[button.index()]
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.buttons[button.index()] = pressed;
    }

    pub fn get_axis(&self, axis: Axis) -> i16 {
        self.axes[axis.index()]
    }

    /// Set an axis value, clamped into the axis' range
    pub fn set_axis(&mut self, axis: Axis, value: i32) {
        self.axes[axis.index()] = axis.clamp(value);
    }

    /// Axis value normalized to -1.0..=1.0 (0.0..=1.0 for triggers)
    pub fn get_axis_float(&self, axis: Axis) -> f32 {
        let value = self.get_axis(axis) as f32;
        if value < 0.0 {
            value / -(axis.min() as f32)
        } else if axis.max() == 0 {
            0.0
        } else {
            value / axis.max() as f32
        }
    }

    pub fn set_axis_float(&mut self, axis: Axis, value: f32) {
        let value = value.clamp(-1.0, 1.0);
        let raw = if value < 0.0 {
            value * -(axis.min() as f32)
        } else {
            value * axis.max() as f32
        };
        self.set_axis(axis, raw.round() as i32);
    }

    /// Set an analog trigger together with its digital button and the combined axis
    pub fn set_trigger(&mut self, axis: Axis, value: i32) {
        let button = match axis {
            Axis::LT => Button::LT,
            Axis::RT => Button::RT,
            _ => {
                self.set_axis(axis, value);
                return;
            }
        };
        self.set_axis(axis, value);
        self.set_button(button, self.get_axis(axis) > 0);
        let combined = self.get_axis(Axis::RT) as i32 - self.get_axis(Axis::LT) as i32;
        self.set_axis(Axis::Trigger, combined);
    }

    /// Set the dpad axes and mirror them onto the dpad buttons
    pub fn set_dpad_axis(&mut self, axis: Axis, value: i32) {
        self.set_axis(axis, value.signum());
        let value = self.get_axis(axis);
        match axis {
            Axis::DpadX => {
                self.set_button(Button::DpadLeft, value < 0);
                self.set_button(Button::DpadRight, value > 0);
            }
            Axis::DpadY => {
                self.set_button(Button::DpadUp, value < 0);
                self.set_button(Button::DpadDown, value > 0);
            }
            _ => {}
        }
    }

    /// Recompute the dpad axes from the dpad buttons
    pub fn sync_dpad_axes(&mut self) {
        let x = self.get_button(Button::DpadRight) as i32 - self.get_button(Button::DpadLeft) as i32;
        let y = self.get_button(Button::DpadDown) as i32 - self.get_button(Button::DpadUp) as i32;
        self.set_axis(Axis::DpadX, x);
        self.set_axis(Axis::DpadY, y);
    }

    /// Iterate over all pressed buttons
    pub fn pressed_buttons(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.iter().copied().filter(|b| self.get_button(*b))
    }
}
