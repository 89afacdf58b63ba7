//! End-to-end tests: mock controller -> slot -> modifiers -> remap -> mock uinput

use evdev::{AbsoluteAxisCode, KeyCode};
use padrelay::backend::mock::{MockDeviceFactory, MockOutputLog};
use padrelay::backend::{DeviceId, EventKind, DEVICE_JOYSTICK};
use padrelay::controller::mock::{MockController, MockOpener, MockProbe, MockRead};
use padrelay::manager::{ManagerSettings, SlotManager};
use padrelay::mapping::ButtonEvent;
use padrelay::modifier::ModifierSpec;
use padrelay::{Axis, Button, GenericInputMessage, SlotConfig};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SETTINGS: ManagerSettings = ManagerSettings {
    read_timeout_ms: 5,
    scan_interval_ms: 10,
    tick_ms: 5,
};

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn key_values(log: &MockOutputLog, id: DeviceId, code: u16) -> Vec<i32> {
    log.events()
        .iter()
        .filter(|(dev, ev)| *dev == id && ev.kind == EventKind::Key && ev.code == code)
        .map(|(_, ev)| ev.value)
        .collect()
}

fn abs_values(log: &MockOutputLog, id: DeviceId, code: u16) -> Vec<i32> {
    log.events()
        .iter()
        .filter(|(dev, ev)| *dev == id && ev.kind == EventKind::Abs && ev.code == code)
        .map(|(_, ev)| ev.value)
        .collect()
}

#[test]
fn test_remapped_button_reaches_virtual_device() {
    let _ = env_logger::builder().is_test(true).try_init();

    // BTN_X / BTN_A
    let btn_x = KeyCode::BTN_NORTH.code();
    let btn_a = KeyCode::BTN_SOUTH.code();

    let mut config = SlotConfig::new(0);
    config.buttons.bind(
        Button::A,
        ButtonEvent::Key {
            device: DEVICE_JOYSTICK,
            code: btn_x,
        },
    );

    let mut pressed = GenericInputMessage::new();
    pressed.set_button(Button::A, true);
    let released = GenericInputMessage::new();

    let probe = Arc::new(MockProbe::default());
    let opener = MockOpener::new(Arc::clone(&probe));
    let mut script = vec![MockRead::Frame(pressed), MockRead::Idle, MockRead::Frame(released)];
    script.extend(std::iter::repeat(MockRead::Idle).take(500));
    opener.script("pad", script);

    let log = MockOutputLog::new();
    let factory = Box::new(MockDeviceFactory::new(Arc::clone(&log)));
    let mut manager = SlotManager::new(vec![config], factory, "Pipeline Test", Box::new(opener), SETTINGS).unwrap();

    assert_eq!(manager.assign(MockController::mock_identity("pad", 0x045e, 0x028e)), Some(0));

    let pad = DeviceId::joystick(0);
    assert!(wait_until(|| key_values(&log, pad, btn_x) == vec![1, 0]));
    assert!(key_values(&log, pad, btn_a).is_empty());

    manager.shutdown();
    assert_eq!(probe.releases(), 1);
    // nothing held, so shutdown emits nothing new
    assert_eq!(key_values(&log, pad, btn_x), vec![1, 0]);
}

#[test]
fn test_held_button_is_released_on_unplug() {
    // BTN_B
    let btn_b = KeyCode::BTN_EAST.code();

    let mut pressed = GenericInputMessage::new();
    pressed.set_button(Button::B, true);

    let probe = Arc::new(MockProbe::default());
    let opener = MockOpener::new(Arc::clone(&probe));
    opener.script("pad", vec![MockRead::Frame(pressed), MockRead::Idle, MockRead::Fail]);

    let log = MockOutputLog::new();
    let factory = Box::new(MockDeviceFactory::new(Arc::clone(&log)));
    let mut manager =
        SlotManager::new(vec![SlotConfig::new(0)], factory, "Pipeline Test", Box::new(opener), SETTINGS).unwrap();
    manager.assign(MockController::mock_identity("pad", 1, 1));

    let pad = DeviceId::joystick(0);
    assert!(wait_until(|| {
        manager.tick(1);
        manager.slot(0).and_then(|s| s.identity()).is_none()
    }));
    assert_eq!(key_values(&log, pad, btn_b), vec![1, 0]);
    assert_eq!(probe.releases(), 1);
}

#[test]
fn test_unplugged_stick_is_centered_for_the_next_pad() {
    let abs_x = AbsoluteAxisCode::ABS_X.0;
    // BTN_A
    let btn_a = KeyCode::BTN_SOUTH.code();

    let mut deflected = GenericInputMessage::new();
    deflected.set_axis(Axis::X1, 32767);
    deflected.set_button(Button::A, true);

    let mut centered_script = vec![MockRead::Frame(GenericInputMessage::new())];
    centered_script.extend(std::iter::repeat(MockRead::Idle).take(500));

    let opener = MockOpener::default();
    opener.script("pad", vec![MockRead::Frame(deflected), MockRead::Idle, MockRead::Fail]);
    opener.script("pad2", centered_script);

    let log = MockOutputLog::new();
    let factory = Box::new(MockDeviceFactory::new(Arc::clone(&log)));
    let mut manager =
        SlotManager::new(vec![SlotConfig::new(0)], factory, "Pipeline Test", Box::new(opener), SETTINGS).unwrap();
    assert_eq!(manager.assign(MockController::mock_identity("pad", 1, 1)), Some(0));

    let pad = DeviceId::joystick(0);
    assert!(wait_until(|| {
        manager.tick(1);
        manager.slot(0).and_then(|s| s.identity()).is_none()
    }));
    assert_eq!(abs_values(&log, pad, abs_x), vec![32767, 0]);
    assert_eq!(key_values(&log, pad, btn_a), vec![1, 0]);

    assert_eq!(manager.assign(MockController::mock_identity("pad2", 1, 1)), Some(0));
    thread::sleep(Duration::from_millis(50));
    manager.shutdown();

    // the centered pad has nothing to change, the output stays centered
    assert_eq!(abs_values(&log, pad, abs_x), vec![32767, 0]);
    assert_eq!(key_values(&log, pad, btn_a), vec![1, 0]);
}

#[test]
fn test_relative_axis_integrates_into_absolute_output() {
    let abs_x = AbsoluteAxisCode::ABS_X.0;

    let mut config = SlotConfig::new(0);
    config.modifiers.push(ModifierSpec::RelativeAxis {
        axis: "X1".to_string(),
        speed: 32768,
    });

    let mut tilted = GenericInputMessage::new();
    tilted.set_axis(Axis::X1, 16384);

    let opener = MockOpener::default();
    let mut script = vec![MockRead::Frame(tilted)];
    script.extend(std::iter::repeat(MockRead::Idle).take(500));
    opener.script("pad", script);

    let log = MockOutputLog::new();
    let factory = Box::new(MockDeviceFactory::new(Arc::clone(&log)));
    let mut manager = SlotManager::new(vec![config], factory, "Pipeline Test", Box::new(opener), SETTINGS).unwrap();
    manager.assign(MockController::mock_identity("pad", 1, 1));

    let pad = DeviceId::joystick(0);
    // half tilt at full speed covers the positive half range in about two seconds
    assert!(wait_until(|| abs_values(&log, pad, abs_x).last().is_some_and(|v| *v > 1000)));
    manager.shutdown();

    let values = abs_values(&log, pad, abs_x);
    let positions: Vec<i32> = values.iter().copied().filter(|v| *v != 0).collect();
    assert!(positions.windows(2).all(|w| w[0] <= w[1]), "integrator went backwards: {:?}", positions);
    assert!(positions.iter().all(|v| *v <= Axis::X1.max()));
}
