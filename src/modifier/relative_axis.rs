//! Relative-axis integrator
//!
//! Turns a spring-loaded stick into a position that stays where it was pushed:
//! the stick deflection is integrated over time into a per-axis accumulator.

use super::{Modifier, Stage};
use crate::controller::{Axis, GenericInputMessage};

/// Stick deflection the integrator ignores
pub const RELATIVE_AXIS_THRESHOLD: i32 = 4000;

/// Largest stick magnitude, used to normalize the deflection
const AXIS_MAGNITUDE: i64 = 32768;

pub struct RelativeAxisModifier {
    /// (axis, speed) per integrated axis
    mappings: Vec<(Axis, i32)>,
    state: Vec<i32>,
}

impl RelativeAxisModifier {
    pub fn new(mappings: Vec<(Axis, i32)>) -> Self {
        let state = vec![0; mappings.len()];
        Self { mappings, state }
    }

    /// Current accumulator of the `index`-th mapping
    pub fn accumulator(&self, index: usize) -> Option<i32> {
        self.state.get(index).copied()
    }
}

impl Modifier for RelativeAxisModifier {
    fn update(&mut self, msec_delta: u32, msg: &mut GenericInputMessage) {
        for ((axis, speed), acc) in self.mappings.iter().zip(self.state.iter_mut()) {
            let value = msg.get_axis(*axis) as i32;
            // below the threshold the accumulator holds its position
            if value.abs() > RELATIVE_AXIS_THRESHOLD {
                let delta = (*speed as i64 * value as i64) / AXIS_MAGNITUDE * msec_delta as i64 / 1000;
                *acc = (*acc as i64 + delta).clamp(-32768, 32767) as i32;
            }
            msg.set_axis(*axis, *acc);
        }
    }

    fn stage(&self) -> Stage {
        Stage::Integrator
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .mappings
            .iter()
            .map(|(axis, speed)| format!("{}:{}", axis, speed))
            .collect();
        format!("relative-axis {}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(modifier: &mut RelativeAxisModifier, value: i32, ms: u32) -> i16 {
        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, value);
        modifier.update(ms, &mut msg);
        msg.get_axis(Axis::X1)
    }

    #[test]
    fn test_half_deflection_for_one_second() {
        let mut m = RelativeAxisModifier::new(vec![(Axis::X1, 32768)]);
        assert_eq!(tick(&mut m, 16384, 1000), 16384);
        assert_eq!(m.accumulator(0), Some(16384));
    }

    #[test]
    fn test_holds_below_threshold() {
        let mut m = RelativeAxisModifier::new(vec![(Axis::X1, 32768)]);
        tick(&mut m, 16384, 500);
        let held = m.accumulator(0).unwrap();
        assert_eq!(held, 8192);

        for value in [0, 4000, -4000, 1234] {
            assert_eq!(tick(&mut m, value, 100) as i32, held);
        }
        assert_eq!(m.accumulator(0), Some(held));
    }

    #[test]
    fn test_monotonic_and_clamped() {
        let mut m = RelativeAxisModifier::new(vec![(Axis::X1, 32768)]);
        let mut last = 0;
        for _ in 0..20 {
            let value = tick(&mut m, 32767, 250) as i32;
            assert!(value >= last);
            assert!(value <= 32767);
            last = value;
        }
        assert_eq!(last, 32767);

        for _ in 0..40 {
            tick(&mut m, -32768, 250);
        }
        assert_eq!(m.accumulator(0), Some(-32768));
    }

    #[test]
    fn test_writes_accumulator_every_tick() {
        let mut m = RelativeAxisModifier::new(vec![(Axis::X1, 1000), (Axis::Y1, 1000)]);
        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, 32767);
        msg.set_axis(Axis::Y1, 100);
        m.update(1000, &mut msg);
        assert_eq!(msg.get_axis(Axis::X1), 999);
        assert_eq!(msg.get_axis(Axis::Y1), 0);
    }
}
