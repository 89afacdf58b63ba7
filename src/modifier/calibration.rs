//! Per-axis calibration
//!
//! Maps a worn or off-center axis reporting `min..center..max` back onto the
//! full logical range. Sticks re-center on 0, triggers rest on their minimum.

use super::{Modifier, Stage};
use crate::controller::{Axis, GenericInputMessage};

pub struct CalibrationModifier {
    axis: Axis,
    min: i32,
    center: i32,
    max: i32,
}

impl CalibrationModifier {
    /// Caller guarantees `min < center < max`
    pub fn new(axis: Axis, min: i32, center: i32, max: i32) -> Self {
        Self { axis, min, center, max }
    }

    fn target_center(&self) -> i64 {
        if self.axis.is_trigger() {
            self.axis.min() as i64
        } else {
            0
        }
    }

    pub fn apply(&self, value: i32) -> i32 {
        let value = value as i64;
        let (min, center, max) = (self.min as i64, self.center as i64, self.max as i64);
        let target = self.target_center();

        let out = if value < center {
            target - (center - value) * (target - self.axis.min() as i64) / (center - min)
        } else {
            target + (value - center) * (self.axis.max() as i64 - target) / (max - center)
        };
        out.clamp(self.axis.min() as i64, self.axis.max() as i64) as i32
    }
}

impl Modifier for CalibrationModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        let value = msg.get_axis(self.axis) as i32;
        msg.set_axis(self.axis, self.apply(value));
    }

    fn stage(&self) -> Stage {
        Stage::Calibration
    }

    fn describe(&self) -> String {
        format!("calibration {} {}:{}:{}", self.axis, self.min, self.center, self.max)
    }
}
