//! Autofire: a held button becomes a train of presses

use super::{Modifier, Stage};
use crate::controller::{Button, GenericInputMessage};

pub struct AutofireModifier {
    button: Button,
    frequency_ms: u32,
    /// Time the button has been held, 0 while released
    held_ms: u64,
}

impl AutofireModifier {
    pub fn new(button: Button, frequency_ms: u32) -> Self {
        Self {
            button,
            frequency_ms: frequency_ms.max(1),
            held_ms: 0,
        }
    }
}

impl Modifier for AutofireModifier {
    fn update(&mut self, msec_delta: u32, msg: &mut GenericInputMessage) {
        if !msg.get_button(self.button) {
            self.held_ms = 0;
            return;
        }

        let phase = self.held_ms / self.frequency_ms as u64;
        msg.set_button(self.button, phase % 2 == 0);
        self.held_ms += msec_delta as u64;
    }

    fn stage(&self) -> Stage {
        Stage::Buttons
    }

    fn describe(&self) -> String {
        format!("autofire {} every {}ms", self.button, self.frequency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(m: &mut AutofireModifier, held: bool, ms: u32) -> bool {
        let mut msg = GenericInputMessage::new();
        msg.set_button(Button::A, held);
        m.update(ms, &mut msg);
        msg.get_button(Button::A)
    }

    #[test]
    fn test_toggles_while_held() {
        let mut m = AutofireModifier::new(Button::A, 50);
        let outputs: Vec<bool> = (0..8).map(|_| tick(&mut m, true, 25)).collect();
        assert_eq!(outputs, vec![true, true, false, false, true, true, false, false]);
    }

    #[test]
    fn test_release_resets_phase() {
        let mut m = AutofireModifier::new(Button::A, 50);
        tick(&mut m, true, 50);
        assert!(!tick(&mut m, true, 50));
        assert!(!tick(&mut m, false, 50));
        // next press starts pressed again
        assert!(tick(&mut m, true, 50));
    }

    #[test]
    fn test_other_buttons_untouched() {
        let mut m = AutofireModifier::new(Button::A, 10);
        let mut msg = GenericInputMessage::new();
        msg.set_button(Button::A, true);
        msg.set_button(Button::B, true);
        for _ in 0..5 {
            m.update(10, &mut msg);
            msg.set_button(Button::A, true);
            assert!(msg.get_button(Button::B));
        }
    }
}
