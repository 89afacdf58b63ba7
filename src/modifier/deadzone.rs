//! Axis deadzone

use super::{Modifier, Stage};
use crate::controller::{Axis, GenericInputMessage};

pub struct DeadzoneModifier {
    axis: Axis,
    threshold: i32,
    /// Rescale the remaining range so output starts at 0 right past the threshold
    smooth: bool,
}

impl DeadzoneModifier {
    pub fn new(axis: Axis, threshold: i32, smooth: bool) -> Self {
        Self { axis, threshold, smooth }
    }

    pub fn apply(&self, value: i32) -> i32 {
        let magnitude = value.abs();
        if magnitude < self.threshold {
            return 0;
        }
        if !self.smooth {
            return value;
        }

        let limit = (if value < 0 { -self.axis.min() } else { self.axis.max() }) as i64;
        let scaled = (magnitude - self.threshold) as i64 * limit / (limit - self.threshold as i64);
        (value.signum() as i64 * scaled) as i32
    }
}

impl Modifier for DeadzoneModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        let value = msg.get_axis(self.axis) as i32;
        msg.set_axis(self.axis, self.apply(value));
    }

    fn stage(&self) -> Stage {
        Stage::Deadzone
    }

    fn describe(&self) -> String {
        format!(
            "deadzone {} {}{}",
            self.axis,
            self.threshold,
            if self.smooth { " (smooth)" } else { "" }
        )
    }
}
