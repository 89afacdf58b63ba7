//! Dpad and stick direction restrictors

use super::{Modifier, Stage};
use crate::controller::{Axis, Button, GenericInputMessage};

/// Restrict sticks and dpad to the four cardinal directions
///
/// On a stick the weaker axis is zeroed. On the dpad a diagonal keeps the
/// direction that was already held, so sliding around the pad does not flicker.
#[derive(Debug, Default)]
pub struct FourWayRestrictorModifier {
    /// Dpad axis that won the last diagonal, true for vertical
    last_vertical: Option<bool>,
}

impl FourWayRestrictorModifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn restrict_stick(msg: &mut GenericInputMessage, x_axis: Axis, y_axis: Axis) {
        let x = msg.get_axis(x_axis) as i32;
        let y = msg.get_axis(y_axis) as i32;
        if x.abs() > y.abs() {
            msg.set_axis(y_axis, 0);
        } else {
            msg.set_axis(x_axis, 0);
        }
    }

    fn restrict_dpad(&mut self, msg: &mut GenericInputMessage) {
        let vertical = msg.get_button(Button::DpadUp) || msg.get_button(Button::DpadDown);
        let horizontal = msg.get_button(Button::DpadLeft) || msg.get_button(Button::DpadRight);

        let keep_vertical = match (vertical, horizontal) {
            (true, true) => self.last_vertical.unwrap_or(true),
            (true, false) => true,
            (false, true) => false,
            (false, false) => {
                self.last_vertical = None;
                return;
            }
        };
        self.last_vertical = Some(keep_vertical);

        if keep_vertical {
            msg.set_button(Button::DpadLeft, false);
            msg.set_button(Button::DpadRight, false);
        } else {
            msg.set_button(Button::DpadUp, false);
            msg.set_button(Button::DpadDown, false);
        }
        msg.sync_dpad_axes();
    }
}

impl Modifier for FourWayRestrictorModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        Self::restrict_stick(msg, Axis::X1, Axis::Y1);
        Self::restrict_stick(msg, Axis::X2, Axis::Y2);
        self.restrict_dpad(msg);
    }

    fn stage(&self) -> Stage {
        Stage::Shaping
    }

    fn describe(&self) -> String {
        "four-way restrictor".to_string()
    }
}

/// Dpad directions clockwise from up, as (up, down, left, right)
const DIRECTIONS: [(bool, bool, bool, bool); 8] = [
    (true, false, false, false),
    (true, false, false, true),
    (false, false, false, true),
    (false, true, false, true),
    (false, true, false, false),
    (false, true, true, false),
    (false, false, true, false),
    (true, false, true, false),
];

/// Rotate the dpad clockwise by a multiple of 45 degrees
pub struct DpadRotationModifier {
    steps: usize,
}

impl DpadRotationModifier {
    pub fn new(degrees: i32) -> Self {
        let steps = (degrees / 45).rem_euclid(8) as usize;
        Self { steps }
    }
}

fn dpad_state(msg: &GenericInputMessage) -> (bool, bool, bool, bool) {
    let up = msg.get_button(Button::DpadUp);
    let down = msg.get_button(Button::DpadDown);
    let left = msg.get_button(Button::DpadLeft);
    let right = msg.get_button(Button::DpadRight);
    // opposite directions cancel out
    (up && !down, down && !up, left && !right, right && !left)
}

impl Modifier for DpadRotationModifier {
    fn update(&mut self, _msec_delta: u32, msg: &mut GenericInputMessage) {
        if self.steps == 0 {
            return;
        }
        let state = dpad_state(msg);
        let Some(index) = DIRECTIONS.iter().position(|d| *d == state) else {
            return;
        };
        let (up, down, left, right) = DIRECTIONS[(index + self.steps) % 8];
        msg.set_button(Button::DpadUp, up);
        msg.set_button(Button::DpadDown, down);
        msg.set_button(Button::DpadLeft, left);
        msg.set_button(Button::DpadRight, right);
        msg.sync_dpad_axes();
    }

    fn stage(&self) -> Stage {
        Stage::Shaping
    }

    fn describe(&self) -> String {
        format!("dpad rotation {} degrees", self.steps * 45)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dpad(up: bool, down: bool, left: bool, right: bool) -> GenericInputMessage {
        let mut msg = GenericInputMessage::new();
        msg.set_button(Button::DpadUp, up);
        msg.set_button(Button::DpadDown, down);
        msg.set_button(Button::DpadLeft, left);
        msg.set_button(Button::DpadRight, right);
        msg.sync_dpad_axes();
        msg
    }

    #[test]
    fn test_four_way_zeroes_weaker_stick_axis() {
        let mut m = FourWayRestrictorModifier::new();
        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, 20000);
        msg.set_axis(Axis::Y1, -5000);
        msg.set_axis(Axis::X2, 100);
        msg.set_axis(Axis::Y2, 30000);
        m.update(10, &mut msg);
        assert_eq!(msg.get_axis(Axis::X1), 20000);
        assert_eq!(msg.get_axis(Axis::Y1), 0);
        assert_eq!(msg.get_axis(Axis::X2), 0);
        assert_eq!(msg.get_axis(Axis::Y2), 30000);
    }

    #[test]
    fn test_four_way_keeps_held_dpad_direction() {
        let mut m = FourWayRestrictorModifier::new();

        let mut msg = dpad(false, false, false, true);
        m.update(10, &mut msg);
        assert!(msg.get_button(Button::DpadRight));

        // sliding onto the diagonal keeps right
        let mut msg = dpad(true, false, false, true);
        m.update(10, &mut msg);
        assert!(msg.get_button(Button::DpadRight));
        assert!(!msg.get_button(Button::DpadUp));
        assert_eq!(msg.get_axis(Axis::DpadY), 0);
        assert_eq!(msg.get_axis(Axis::DpadX), 1);
    }

    #[test]
    fn test_rotation_by_90() {
        let mut m = DpadRotationModifier::new(90);
        let mut msg = dpad(true, false, false, false);
        m.update(10, &mut msg);
        assert!(msg.get_button(Button::DpadRight));
        assert!(!msg.get_button(Button::DpadUp));
        assert_eq!(msg.get_axis(Axis::DpadX), 1);
    }

    #[test]
    fn test_rotation_negative_and_diagonal() {
        let mut m = DpadRotationModifier::new(-45);
        let mut msg = dpad(true, false, false, false);
        m.update(10, &mut msg);
        assert!(msg.get_button(Button::DpadUp));
        assert!(msg.get_button(Button::DpadLeft));

        let mut idle = dpad(false, false, false, false);
        m.update(10, &mut idle);
        assert_eq!(idle, GenericInputMessage::new());
    }
}
