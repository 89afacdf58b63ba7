//! Mock controller for testing.
//!
//! Serves a scripted sequence of frames instead of reading hardware, and
//! counts how often its handle is released. Useful for testing slots, the
//! manager and the mapping pipeline without a physical pad.

use super::discovery::{DeviceScanner, SourceOpener};
use super::types::GenericInputMessage;
use super::{ControllerError, ControllerKind, ControllerSource, DeviceIdentity};
use log::info;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One scripted read result
#[derive(Debug, Clone)]
pub enum MockRead {
    Frame(GenericInputMessage),
    /// Behave like a timeout
    Idle,
    /// Fail like an unplugged device
    Fail,
}

/// Observations shared between a mock controller and the test that created it
#[derive(Debug, Default)]
pub struct MockProbe {
    releases: AtomicUsize,
    leds: Mutex<Vec<u8>>,
    rumbles: Mutex<Vec<(u8, u8)>>,
}

impl MockProbe {
    /// Number of times a controller handle was released
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn leds(&self) -> Vec<u8> {
        self.leds.lock().clone()
    }

    pub fn rumbles(&self) -> Vec<(u8, u8)> {
        self.rumbles.lock().clone()
    }
}

/// Controller that replays scripted reads
pub struct MockController {
    identity: DeviceIdentity,
    script: VecDeque<MockRead>,
    probe: Arc<MockProbe>,
}

impl MockController {
    pub fn new(identity: DeviceIdentity, script: Vec<MockRead>, probe: Arc<MockProbe>) -> Self {
        Self {
            identity,
            script: script.into(),
            probe,
        }
    }

    /// Identity for a mock device at `path`
    pub fn mock_identity(path: &str, vendor: u16, product: u16) -> DeviceIdentity {
        DeviceIdentity {
            kind: ControllerKind::Mock,
            bus: 0,
            address: 0,
            vendor,
            product,
            path: path.to_string(),
            name: format!("Mock Pad {}", path),
        }
    }
}

impl ControllerSource for MockController {
    fn read(&mut self, msg: &mut GenericInputMessage, timeout_ms: u32) -> Result<bool, ControllerError> {
        match self.script.pop_front() {
            Some(MockRead::Frame(frame)) => {
                *msg = frame;
                Ok(true)
            }
            Some(MockRead::Fail) => Err(ControllerError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device unplugged",
            ))),
            Some(MockRead::Idle) | None => {
                thread::sleep(Duration::from_millis(timeout_ms as u64));
                Ok(false)
            }
        }
    }

    fn set_led(&mut self, status: u8) {
        info!("[MOCK CONTROLLER] LED: {}", status);
        self.probe.leds.lock().push(status);
    }

    fn set_rumble(&mut self, left: u8, right: u8) {
        info!("[MOCK CONTROLLER] Rumble: {} {}", left, right);
        self.probe.rumbles.lock().push((left, right));
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        info!("[MOCK CONTROLLER] Released {}", self.identity.path);
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opener producing mock controllers, with per-path scripts
///
/// Paths without a script get a controller that idles forever. Paths marked
/// with [`MockOpener::fail_path`] fail to open like a missing device node.
#[derive(Default)]
pub struct MockOpener {
    scripts: Mutex<HashMap<String, Vec<MockRead>>>,
    failing: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
    probe: Arc<MockProbe>,
}

impl MockOpener {
    pub fn new(probe: Arc<MockProbe>) -> Self {
        Self {
            probe,
            ..Self::default()
        }
    }

    /// Script served by the next controller opened at `path`
    pub fn script(&self, path: &str, reads: Vec<MockRead>) {
        self.scripts.lock().insert(path.to_string(), reads);
    }

    pub fn fail_path(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    /// Paths opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl SourceOpener for MockOpener {
    fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn ControllerSource>, ControllerError> {
        if self.failing.lock().contains(&identity.path) {
            return Err(ControllerError::Open {
                path: identity.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock device missing"),
            });
        }
        self.opened.lock().push(identity.path.clone());
        let script = self.scripts.lock().remove(&identity.path).unwrap_or_default();
        info!("[MOCK CONTROLLER] Opened {}", identity.path);
        Ok(Box::new(MockController::new(
            identity.clone(),
            script,
            Arc::clone(&self.probe),
        )))
    }
}

/// Scanner reporting a device list the test can change at any time
#[derive(Clone, Default)]
pub struct MockScanner {
    devices: Arc<Mutex<Vec<DeviceIdentity>>>,
}

impl MockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&self, identity: DeviceIdentity) {
        self.devices.lock().push(identity);
    }

    pub fn unplug(&self, path: &str) {
        self.devices.lock().retain(|d| d.path != path);
    }
}

impl DeviceScanner for MockScanner {
    fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError> {
        Ok(self.devices.lock().clone())
    }
}
