//! Mapping executor - turns logical controller state into output events
//!
//! The executor compares each post-modifier message with the previous one
//! and, for every button or axis that changed, looks up its binding and
//! writes the matching events to the virtual output multiplexer as one
//! frame. Shift buttons select an alternative binding for the buttons pressed
//! while they are held.

use crate::backend::{BackendError, DeviceId, EventKind, OutputEvent, VirtualOutputMultiplexer};
use crate::controller::{Axis, Button, GenericInputMessage};
use crate::mapping::button_map::{AxisEvent, AxisEventTable, ButtonEvent, ButtonRemapTable};
use log::{debug, trace};

/// Per-slot mapping state
pub struct MappingExecutor {
    buttons: ButtonRemapTable,
    axes: AxisEventTable,
    group: u16,
    last: GenericInputMessage,
    /// Event each held button activated when it was pressed
    active: [ButtonEvent; Button::COUNT],
    /// Last relative value sent per axis, 0 while idle
    rel_axis: [i32; Axis::COUNT],
    /// Events of the frame being built
    frame: Vec<(DeviceId, OutputEvent)>,
}

impl MappingExecutor {
    pub fn new(buttons: ButtonRemapTable, axes: AxisEventTable, group: u16) -> Self {
        Self {
            buttons,
            axes,
            group,
            last: GenericInputMessage::new(),
            active: [ButtonEvent::Void; Button::COUNT],
            rel_axis: [0; Axis::COUNT],
            frame: Vec::new(),
        }
    }

    pub fn group(&self) -> u16 {
        self.group
    }

    /// Event the given button is currently holding down
    pub fn active_event(&self, button: Button) -> ButtonEvent {
        self.active[button.index()]
    }

    /// Emit everything that changed since the previous message as one frame
    pub fn process(&mut self, msg: &GenericInputMessage, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        let before = self.last;
        for button in Button::ALL {
            let pressed = msg.get_button(button);
            if pressed != before.get_button(button) {
                self.send_button(button, pressed, &before, msg, mux)?;
            }
        }

        for axis in Axis::ALL {
            if msg.get_axis(axis) != before.get_axis(axis) {
                self.send_axis(axis, msg, mux)?;
            }
        }

        self.last = *msg;
        self.flush(mux)
    }

    /// Release everything still held, center absolute outputs and stop every
    /// repeat this slot started
    pub fn reset(&mut self, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        for button in Button::ALL {
            if self.last.get_button(button) {
                let event = std::mem::take(&mut self.active[button.index()]);
                self.emit_button(event, false, mux)?;
            }
        }
        for axis in Axis::ALL {
            match self.axes.lookup(axis) {
                AxisEvent::Abs { device, code } if self.last.get_axis(axis) != 0 => {
                    self.push(DeviceId::new(self.group, device), EventKind::Abs, code, 0);
                }
                AxisEvent::Rel { device, code, .. } if self.rel_axis[axis.index()] != 0 => {
                    mux.send_rel_repetitive(DeviceId::new(self.group, device), code, 0, -1)?;
                    self.rel_axis[axis.index()] = 0;
                }
                _ => {}
            }
        }
        self.last = GenericInputMessage::new();
        self.flush(mux)
    }

    fn push(&mut self, id: DeviceId, kind: EventKind, code: u16, value: i32) {
        self.frame.push((id, OutputEvent::new(kind, code, value)));
    }

    fn flush(&mut self, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        let frame = std::mem::take(&mut self.frame);
        mux.send_frame(&frame)
    }

    /// `before` is the state at the start of the frame, `now` the incoming message
    fn send_button(
        &mut self,
        code: Button,
        pressed: bool,
        before: &GenericInputMessage,
        now: &GenericInputMessage,
        mux: &VirtualOutputMultiplexer,
    ) -> Result<(), BackendError> {
        // `code` acting as a shift: drop what buttons held under it were sending
        for held in Button::ALL {
            if held == code || !before.get_button(held) {
                continue;
            }
            if !self.buttons.lookup_shifted(code, held).is_void() {
                let event = std::mem::take(&mut self.active[held.index()]);
                trace!("Shift {} changed, releasing {} ({})", code, held, event);
                self.emit_button(event, false, mux)?;
            }
        }

        if pressed {
            let shifted = Button::ALL
                .iter()
                .filter(|shift| **shift != code && now.get_button(**shift))
                .map(|shift| self.buttons.lookup_shifted(*shift, code))
                .find(|event| !event.is_void());
            let event = shifted.unwrap_or_else(|| self.buttons.lookup(code));
            self.active[code.index()] = event;
            self.emit_button(event, true, mux)
        } else {
            let event = std::mem::take(&mut self.active[code.index()]);
            self.emit_button(event, false, mux)
        }
    }

    fn emit_button(&mut self, event: ButtonEvent, pressed: bool, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        match event {
            ButtonEvent::Void => {}
            ButtonEvent::Key { device, code } => {
                self.push(DeviceId::new(self.group, device), EventKind::Key, code, pressed as i32);
            }
            ButtonEvent::Rel { device, code, value, repeat_ms } => {
                let id = DeviceId::new(self.group, device);
                if pressed {
                    self.push(id, EventKind::Rel, code, value);
                    if repeat_ms >= 0 {
                        mux.send_rel_repetitive(id, code, value, repeat_ms)?;
                    }
                } else {
                    mux.send_rel_repetitive(id, code, 0, -1)?;
                }
            }
            ButtonEvent::Abs { device, code, value } => {
                let value = if pressed { value } else { 0 };
                self.push(DeviceId::new(self.group, device), EventKind::Abs, code, value);
            }
        }
        Ok(())
    }

    fn send_axis(&mut self, axis: Axis, msg: &GenericInputMessage, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        match self.axes.lookup(axis) {
            AxisEvent::Void => Ok(()),
            AxisEvent::Abs { device, code } => {
                self.push(DeviceId::new(self.group, device), EventKind::Abs, code, msg.get_axis(axis) as i32);
                Ok(())
            }
            AxisEvent::Rel { device, code, speed, repeat_ms } => {
                let id = DeviceId::new(self.group, device);
                let value = (speed as f32 * msg.get_axis_float(axis)).round() as i32;
                let previous = std::mem::replace(&mut self.rel_axis[axis.index()], value);

                if value == 0 {
                    if previous != 0 {
                        debug!("{} idle, stopping {} repeat", axis, id);
                    }
                    return mux.send_rel_repetitive(id, code, 0, -1);
                }
                if previous == 0 {
                    self.push(id, EventKind::Rel, code, value);
                }
                mux.send_rel_repetitive(id, code, value, repeat_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockDeviceFactory, MockOutputLog};
    use evdev::{AbsoluteAxisCode, KeyCode, RelativeAxisCode};
    use std::sync::Arc;

    fn setup(buttons: ButtonRemapTable, axes: AxisEventTable) -> (MappingExecutor, VirtualOutputMultiplexer, Arc<MockOutputLog>) {
        let log = MockOutputLog::new();
        let mux = VirtualOutputMultiplexer::new(Box::new(MockDeviceFactory::new(Arc::clone(&log))), "Test Pad");
        buttons.declare(&mux, 0).unwrap();
        axes.declare(&mux, 0).unwrap();
        mux.finish().unwrap();
        (MappingExecutor::new(buttons, axes, 0), mux, log)
    }

    fn press(buttons: &[Button]) -> GenericInputMessage {
        let mut msg = GenericInputMessage::new();
        for b in buttons {
            msg.set_button(*b, true);
        }
        msg
    }

    #[test]
    fn test_remapped_button_only_emits_target() {
        let mut buttons = ButtonRemapTable::new();
        buttons.bind(Button::A, "BTN_X".parse().unwrap());
        let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());

        exec.process(&press(&[Button::A]), &mux).unwrap();

        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, DeviceId::joystick(0));
        assert_eq!(events[0].1.kind, EventKind::Key);
        assert_eq!(events[0].1.code, KeyCode::BTN_NORTH.code());
        assert_eq!(events[0].1.value, 1);
    }

    #[test]
    fn test_only_changes_are_emitted() {
        let (mut exec, mux, log) = setup(ButtonRemapTable::with_defaults(), AxisEventTable::with_defaults());
        let msg = press(&[Button::B]);
        exec.process(&msg, &mux).unwrap();
        exec.process(&msg, &mux).unwrap();
        assert_eq!(log.events().len(), 1);

        exec.process(&GenericInputMessage::new(), &mux).unwrap();
        assert_eq!(log.events().len(), 2);
        assert_eq!(log.events()[1].1.value, 0);
    }

    #[test]
    fn test_shift_selects_alternate_binding() {
        let mut buttons = ButtonRemapTable::with_defaults();
        buttons.bind(Button::LB, ButtonEvent::Void);
        buttons.bind_shifted(Button::LB, Button::A, "KEY_SPACE".parse().unwrap());
        let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());

        exec.process(&press(&[Button::LB]), &mux).unwrap();
        exec.process(&press(&[Button::LB, Button::A]), &mux).unwrap();
        let space_code = KeyCode::KEY_SPACE.code();
        assert_eq!(log.count(DeviceId::keyboard(0), EventKind::Key, space_code), 1);
        assert_eq!(log.count(DeviceId::joystick(0), EventKind::Key, KeyCode::BTN_SOUTH.code()), 0);

        // dropping the shift releases what A sent under it
        exec.process(&press(&[Button::A]), &mux).unwrap();
        let space: Vec<i32> = log
            .events()
            .iter()
            .filter(|(_, ev)| ev.code == space_code)
            .map(|(_, ev)| ev.value)
            .collect();
        assert_eq!(space, vec![1, 0]);
        assert!(exec.active_event(Button::A).is_void());
    }

    #[test]
    fn test_shift_pressed_in_same_frame_as_target() {
        // Y comes after A in button order, LB before it
        for shift in [Button::LB, Button::Y] {
            let mut buttons = ButtonRemapTable::with_defaults();
            buttons.bind_shifted(shift, Button::A, "KEY_SPACE".parse().unwrap());
            let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());

            exec.process(&press(&[shift, Button::A]), &mux).unwrap();

            let space_code = KeyCode::KEY_SPACE.code();
            let south_code = KeyCode::BTN_SOUTH.code();
            assert_eq!(log.count(DeviceId::keyboard(0), EventKind::Key, space_code), 1, "shift {}", shift);
            assert_eq!(log.count(DeviceId::joystick(0), EventKind::Key, south_code), 0, "shift {}", shift);
            assert_eq!(
                exec.active_event(Button::A),
                ButtonEvent::Key { device: crate::backend::DEVICE_KEYBOARD, code: space_code }
            );

            exec.process(&GenericInputMessage::new(), &mux).unwrap();
            let space: Vec<i32> = log
                .events()
                .iter()
                .filter(|(_, ev)| ev.code == space_code)
                .map(|(_, ev)| ev.value)
                .collect();
            assert_eq!(space, vec![1, 0], "shift {}", shift);
        }
    }

    #[test]
    fn test_frame_is_written_as_one_batch() {
        let (mut exec, mux, log) = setup(ButtonRemapTable::with_defaults(), AxisEventTable::with_defaults());
        let mut msg = press(&[Button::A, Button::B]);
        msg.set_axis(Axis::X1, 1000);
        exec.process(&msg, &mux).unwrap();

        let batches = log.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].1.len(), 3);
    }

    #[test]
    fn test_reset_centers_absolute_axes() {
        let (mut exec, mux, log) = setup(ButtonRemapTable::with_defaults(), AxisEventTable::with_defaults());
        let abs_x = AbsoluteAxisCode::ABS_X.0;
        let abs_rz = AbsoluteAxisCode::ABS_RZ.0;
        let abs_y = AbsoluteAxisCode::ABS_Y.0;

        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, 32767);
        msg.set_axis(Axis::RT, 200);
        exec.process(&msg, &mux).unwrap();
        exec.reset(&mux).unwrap();

        let values = |code: u16| -> Vec<i32> {
            log.events()
                .iter()
                .filter(|(_, ev)| ev.kind == EventKind::Abs && ev.code == code)
                .map(|(_, ev)| ev.value)
                .collect()
        };
        assert_eq!(values(abs_x), vec![32767, 0]);
        assert_eq!(values(abs_rz), vec![200, 0]);
        // axes already centered are left alone
        assert!(values(abs_y).is_empty());

        // a centered frame afterwards changes nothing
        exec.process(&GenericInputMessage::new(), &mux).unwrap();
        assert_eq!(values(abs_x), vec![32767, 0]);
    }

    #[test]
    fn test_rel_button_sends_once_then_repeats() {
        let mut buttons = ButtonRemapTable::new();
        buttons.bind(Button::Y, "mouse:REL_WHEEL:1:50".parse().unwrap());
        let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());
        let wheel = RelativeAxisCode::REL_WHEEL.0;

        exec.process(&press(&[Button::Y]), &mux).unwrap();
        assert_eq!(log.count(DeviceId::mouse(0), EventKind::Rel, wheel), 1);
        assert_eq!(mux.active_repeats(), 1);

        mux.update(100).unwrap();
        assert_eq!(log.count(DeviceId::mouse(0), EventKind::Rel, wheel), 3);

        exec.process(&GenericInputMessage::new(), &mux).unwrap();
        assert_eq!(mux.active_repeats(), 0);
    }

    #[test]
    fn test_abs_button_returns_to_zero() {
        let mut buttons = ButtonRemapTable::new();
        buttons.bind(Button::DpadLeft, "ABS_HAT0X:-1".parse().unwrap());
        let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());

        exec.process(&press(&[Button::DpadLeft]), &mux).unwrap();
        exec.process(&GenericInputMessage::new(), &mux).unwrap();
        let values: Vec<i32> = log.events().iter().map(|(_, ev)| ev.value).collect();
        assert_eq!(values, vec![-1, 0]);
    }

    #[test]
    fn test_axis_to_abs_and_rel() {
        let mut axes = AxisEventTable::with_defaults();
        axes.bind(Axis::X2, "mouse:REL_X:20:10".parse().unwrap());
        let (mut exec, mux, log) = setup(ButtonRemapTable::new(), axes);

        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, -1200);
        msg.set_axis(Axis::X2, 32767);
        exec.process(&msg, &mux).unwrap();

        let abs_x = AbsoluteAxisCode::ABS_X.0;
        let rel_x = RelativeAxisCode::REL_X.0;
        assert_eq!(log.count(DeviceId::joystick(0), EventKind::Abs, abs_x), 1);
        assert_eq!(log.count(DeviceId::mouse(0), EventKind::Rel, rel_x), 1);
        assert_eq!(mux.active_repeats(), 1);

        mux.update(30).unwrap();
        assert_eq!(log.count(DeviceId::mouse(0), EventKind::Rel, rel_x), 4);

        msg.set_axis(Axis::X2, 0);
        exec.process(&msg, &mux).unwrap();
        assert_eq!(mux.active_repeats(), 0);
    }

    #[test]
    fn test_reset_releases_held_outputs() {
        let mut buttons = ButtonRemapTable::with_defaults();
        buttons.bind(Button::X, "mouse:REL_Y:-2:20".parse().unwrap());
        let (mut exec, mux, log) = setup(buttons, AxisEventTable::new());

        exec.process(&press(&[Button::A, Button::X]), &mux).unwrap();
        exec.reset(&mux).unwrap();

        assert_eq!(mux.active_repeats(), 0);
        let south: Vec<i32> = log
            .events()
            .iter()
            .filter(|(_, ev)| ev.kind == EventKind::Key && ev.code == KeyCode::BTN_SOUTH.code())
            .map(|(_, ev)| ev.value)
            .collect();
        assert_eq!(south, vec![1, 0]);
    }
}
