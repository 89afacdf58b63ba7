//! Axis sensitivity curve
//!
//! Positive values make the axis respond more strongly near the center,
//! negative values make it softer. 0 leaves the axis linear.

use super::{Modifier, Stage};
use crate::controller::{Axis, GenericInputMessage};

pub struct SensitivityModifier {
    axis: Axis,
    sensitivity: f32,
}

impl SensitivityModifier {
    pub fn new(axis: Axis, sensitivity: f32) -> Self {
        Self { axis, sensitivity }
    }

    /// Apply the curve to a normalized value
    pub fn curve(&self, pos: f32) -> f32 {
        let t = 2f32.powf(self.sensitivity);
        let shaped = |p: f32| (1.0 - (1.0 - p).powf(t)).powf(1.0 / t);
        if pos > 0.0 {
            shaped(pos)
        } else if pos < 0.0 {
            -shaped(-pos)
        } else {
            0.0
        }
    }
}

impl Modifier for SensitivityModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        let pos = msg.get_axis_float(self.axis);
        msg.set_axis_float(self.axis, self.curve(pos));
    }

    fn stage(&self) -> Stage {
        Stage::Shaping
    }

    fn describe(&self) -> String {
        format!("sensitivity {} {}", self.axis, self.sensitivity)
    }
}
