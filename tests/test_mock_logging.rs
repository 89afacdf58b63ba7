//! Test to verify the mock backends log and record output correctly

use evdev::KeyCode;
use padrelay::backend::mock::{MockDeviceFactory, MockOutputLog};
use padrelay::backend::{DeviceId, EventKind, VirtualOutputMultiplexer};
use std::sync::Arc;

#[test]
fn test_mock_uinput_logs() {
    // Initialize a simple logger for testing
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();

    let log = MockOutputLog::new();
    let mux = VirtualOutputMultiplexer::new(Box::new(MockDeviceFactory::new(Arc::clone(&log))), "Log Test");
    let pad = DeviceId::joystick(0);
    let space = KeyCode::KEY_SPACE.code();
    let keyboard = DeviceId::keyboard(0);

    mux.add_key(pad, KeyCode::BTN_SOUTH.code()).unwrap();
    mux.add_key(keyboard, space).unwrap();
    mux.finish().unwrap();
    assert_eq!(log.devices().len(), 2);

    // These should log at info level (visible with RUST_LOG=info)
    mux.send_key(keyboard, space, true).unwrap();
    mux.send_key(keyboard, space, false).unwrap();
    mux.sync().unwrap();

    assert_eq!(log.count(keyboard, EventKind::Key, space), 2);
    assert_eq!(log.count(pad, EventKind::Key, space), 0);
}
