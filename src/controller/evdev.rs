//! Generic Linux input device backend
//!
//! Reads raw `EV_KEY` / `EV_ABS` events from an evdev node and folds them
//! into a [`GenericInputMessage`]. A frame is complete at `SYN_REPORT`.

use super::types::{Axis, Button, GenericInputMessage};
use super::{ControllerError, ControllerKind, ControllerSource, DeviceIdentity};
use evdev::{AbsoluteAxisCode, Device, KeyCode};
use log::{debug, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;
const SYN_REPORT: u16 = 0x00;

/// One raw event as read from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    pub fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    pub fn syn() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }
}

/// Raw key code -> logical button and raw abs code -> logical axis tables
#[derive(Debug, Clone, Default)]
pub struct EvdevMaps {
    keys: HashMap<u16, Button>,
    abs: HashMap<u16, Axis>,
}

impl EvdevMaps {
    /// Empty maps: every raw event is ignored
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard Linux gamepad layout (as exposed by xpad and most HID pads)
    pub fn with_defaults() -> Self {
        let mut maps = Self::new();
        let keys = [
            (KeyCode::BTN_SOUTH, Button::A),
            (KeyCode::BTN_EAST, Button::B),
            (KeyCode::BTN_NORTH, Button::X),
            (KeyCode::BTN_WEST, Button::Y),
            (KeyCode::BTN_TL, Button::LB),
            (KeyCode::BTN_TR, Button::RB),
            (KeyCode::BTN_TL2, Button::LT),
            (KeyCode::BTN_TR2, Button::RT),
            (KeyCode::BTN_SELECT, Button::Back),
            (KeyCode::BTN_START, Button::Start),
            (KeyCode::BTN_MODE, Button::Guide),
            (KeyCode::BTN_THUMBL, Button::ThumbL),
            (KeyCode::BTN_THUMBR, Button::ThumbR),
            (KeyCode::BTN_DPAD_UP, Button::DpadUp),
            (KeyCode::BTN_DPAD_DOWN, Button::DpadDown),
            (KeyCode::BTN_DPAD_LEFT, Button::DpadLeft),
            (KeyCode::BTN_DPAD_RIGHT, Button::DpadRight),
        ];
        for (code, button) in keys {
            maps.bind_key(code.code(), button);
        }

        let axes = [
            (AbsoluteAxisCode::ABS_X, Axis::X1),
            (AbsoluteAxisCode::ABS_Y, Axis::Y1),
            (AbsoluteAxisCode::ABS_RX, Axis::X2),
            (AbsoluteAxisCode::ABS_RY, Axis::Y2),
            (AbsoluteAxisCode::ABS_Z, Axis::LT),
            (AbsoluteAxisCode::ABS_RZ, Axis::RT),
            (AbsoluteAxisCode::ABS_HAT0X, Axis::DpadX),
            (AbsoluteAxisCode::ABS_HAT0Y, Axis::DpadY),
        ];
        for (code, axis) in axes {
            maps.bind_abs(code.0, axis);
        }
        maps
    }

    pub fn bind_key(&mut self, code: u16, button: Button) {
        self.keys.insert(code, button);
    }

    pub fn bind_abs(&mut self, code: u16, axis: Axis) {
        self.abs.insert(code, axis);
    }

    pub fn key(&self, code: u16) -> Option<Button> {
        self.keys.get(&code).copied()
    }

    pub fn abs(&self, code: u16) -> Option<Axis> {
        self.abs.get(&code).copied()
    }
}

/// Rescale a raw value from the device range into an axis' logical range
pub fn scale_to_axis(axis: Axis, value: i32, min: i32, max: i32) -> i32 {
    if max <= min {
        return value;
    }
    match axis {
        Axis::DpadX | Axis::DpadY => {
            let center = (min + max) / 2;
            (value - center).signum()
        }
        _ => {
            let span = (max - min) as i64;
            let out_span = (axis.max() - axis.min()) as i64;
            let offset = (value.clamp(min, max) - min) as i64;
            (axis.min() as i64 + offset * out_span / span) as i32
        }
    }
}

/// Folds raw events into frames
///
/// Events are buffered; [`FrameAssembler::next_frame`] applies them in order
/// and stops at the first `SYN_REPORT`, leaving later events for the next call.
#[derive(Debug)]
pub struct FrameAssembler {
    maps: EvdevMaps,
    ranges: HashMap<u16, (i32, i32)>,
    frame: GenericInputMessage,
    pending: VecDeque<RawEvent>,
}

impl FrameAssembler {
    pub fn new(maps: EvdevMaps, ranges: HashMap<u16, (i32, i32)>) -> Self {
        Self {
            maps,
            ranges,
            frame: GenericInputMessage::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: RawEvent) {
        self.pending.push_back(event);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply buffered events up to and including the next `SYN_REPORT`
    pub fn next_frame(&mut self) -> Option<GenericInputMessage> {
        while let Some(event) = self.pending.pop_front() {
            match event.kind {
                EV_SYN if event.code == SYN_REPORT => return Some(self.frame),
                EV_KEY => self.apply_key(event.code, event.value),
                EV_ABS => self.apply_abs(event.code, event.value),
                _ => {}
            }
        }
        None
    }

    fn apply_key(&mut self, code: u16, value: i32) {
        if let Some(button) = self.maps.key(code) {
            trace!("evdev key {} -> {} = {}", code, button, value);
            self.frame.set_button(button, value != 0);
            if matches!(button, Button::DpadUp | Button::DpadDown | Button::DpadLeft | Button::DpadRight) {
                self.frame.sync_dpad_axes();
            }
        }
    }

    fn apply_abs(&mut self, code: u16, value: i32) {
        let Some(axis) = self.maps.abs(code) else {
            return;
        };
        let (min, max) = self
            .ranges
            .get(&code)
            .copied()
            .unwrap_or((axis.min(), axis.max()));
        let scaled = scale_to_axis(axis, value, min, max);
        trace!("evdev abs {} -> {} = {} ({})", code, axis, scaled, value);
        match axis {
            Axis::DpadX | Axis::DpadY => self.frame.set_dpad_axis(axis, scaled),
            Axis::LT | Axis::RT => self.frame.set_trigger(axis, scaled),
            _ => self.frame.set_axis(axis, scaled),
        }
    }
}

/// Controller backed by a Linux evdev node
pub struct EvdevController {
    device: Device,
    identity: DeviceIdentity,
    assembler: FrameAssembler,
    grabbed: bool,
}

impl EvdevController {
    /// Open `path`, put it in non-blocking mode and optionally grab it
    pub fn open(path: &str, maps: EvdevMaps, grab: bool) -> Result<Self, ControllerError> {
        let mut device = Device::open(path).map_err(|e| ControllerError::Open {
            path: path.to_string(),
            source: e,
        })?;

        let input_id = device.input_id();
        let identity = DeviceIdentity {
            kind: ControllerKind::Evdev,
            bus: input_id.bus_type().0,
            address: event_node_number(path),
            vendor: input_id.vendor(),
            product: input_id.product(),
            path: path.to_string(),
            name: device.name().unwrap_or("Unknown").to_string(),
        };

        let mut ranges = HashMap::new();
        match device.get_absinfo() {
            Ok(absinfo) => {
                for (code, info) in absinfo {
                    ranges.insert(code.0, (info.minimum(), info.maximum()));
                }
            }
            Err(e) => debug!("No absolute axis info for {}: {}", path, e),
        }

        set_nonblocking(&device)?;

        if grab {
            device.grab().map_err(|e| ControllerError::Claim {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        }

        info!("✓ Opened evdev device {} ({} axes with ranges)", identity, ranges.len());

        Ok(Self {
            device,
            identity,
            assembler: FrameAssembler::new(maps, ranges),
            grabbed: grab,
        })
    }

    /// Drain everything the kernel has buffered into the assembler
    fn drain_device(&mut self) -> Result<(), ControllerError> {
        loop {
            match self.device.fetch_events() {
                Ok(events) => {
                    let mut count = 0;
                    for ev in events {
                        self.assembler.push(RawEvent::new(ev.event_type().0, ev.code(), ev.value()));
                        count += 1;
                    }
                    if count == 0 {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(ControllerError::Io(e)),
            }
        }
    }
}

impl ControllerSource for EvdevController {
    fn read(&mut self, msg: &mut GenericInputMessage, timeout_ms: u32) -> Result<bool, ControllerError> {
        let start = Instant::now();

        if let Some(frame) = self.assembler.next_frame() {
            *msg = frame;
            return Ok(true);
        }

        self.drain_device()?;
        if let Some(frame) = self.assembler.next_frame() {
            *msg = frame;
            return Ok(true);
        }

        let timeout = Duration::from_millis(timeout_ms as u64);
        if let Some(remaining) = timeout.checked_sub(start.elapsed()) {
            thread::sleep(remaining);
        }
        Ok(false)
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

impl Drop for EvdevController {
    fn drop(&mut self) {
        if self.grabbed {
            if let Err(e) = self.device.ungrab() {
                warn!("Failed to ungrab {}: {}", self.identity.path, e);
            }
        }
        debug!("Released evdev device {}", self.identity.path);
    }
}

/// `/dev/input/event12` -> 12
pub fn event_node_number(path: &str) -> u16 {
    path.rsplit("event")
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn set_nonblocking(device: &Device) -> Result<(), ControllerError> {
    let raw_fd = device.as_raw_fd();

    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(ControllerError::Io(std::io::Error::last_os_error()));
    }

    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(ControllerError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}
