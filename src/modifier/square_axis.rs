//! Square stick response
//!
//! Round stick gates only reach the corners at ~70% per axis. This stretches
//! the circle onto the square so full diagonals report full values on both
//! axes, keeping the stick direction.

use super::{Modifier, Stage};
use crate::controller::{Axis, GenericInputMessage};

#[derive(Debug, Default)]
pub struct SquareAxisModifier;

impl SquareAxisModifier {
    pub fn new() -> Self {
        Self
    }
}

fn normalize(value: i16) -> f32 {
    if value < 0 {
        value as f32 / 32768.0
    } else {
        value as f32 / 32767.0
    }
}

fn denormalize(value: f32) -> i32 {
    let value = value.clamp(-1.0, 1.0);
    if value < 0.0 {
        (value * 32768.0).round() as i32
    } else {
        (value * 32767.0).round() as i32
    }
}

/// Map a point of the unit circle onto the unit square along its ray
pub fn squarify(x: f32, y: f32) -> (f32, f32) {
    if x == 0.0 || y == 0.0 {
        return (x, y);
    }
    let length = (x * x + y * y).sqrt();
    let scale = if x.abs() > y.abs() {
        (length / x).abs()
    } else {
        (length / y).abs()
    };
    (x * scale, y * scale)
}

fn square_pair(msg: &mut GenericInputMessage, x_axis: Axis, y_axis: Axis) {
    let x = normalize(msg.get_axis(x_axis));
    let y = normalize(msg.get_axis(y_axis));
    let (x, y) = squarify(x, y);
    msg.set_axis(x_axis, denormalize(x));
    msg.set_axis(y_axis, denormalize(y));
}

impl Modifier for SquareAxisModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        square_pair(msg, Axis::X1, Axis::Y1);
        square_pair(msg, Axis::X2, Axis::Y2);
    }

    fn stage(&self) -> Stage {
        Stage::Shaping
    }

    fn describe(&self) -> String {
        "square-axis".to_string()
    }
}
