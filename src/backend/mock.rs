//! Mock virtual device backend for testing.
//!
//! This backend logs events instead of creating kernel devices, and keeps a
//! shared record of every device created and every batch emitted. Useful for
//! testing the multiplexer and mapping logic without `/dev/uinput`.

use super::{BackendError, DeviceFactory, DeviceId, DeviceSpec, EventKind, OutputDevice, OutputEvent};
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything the mock backend has seen
#[derive(Debug, Default)]
pub struct MockOutputLog {
    devices: Mutex<Vec<(DeviceId, DeviceSpec)>>,
    batches: Mutex<Vec<(DeviceId, Vec<OutputEvent>)>>,
}

impl MockOutputLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Devices created so far, in creation order
    pub fn devices(&self) -> Vec<(DeviceId, DeviceSpec)> {
        self.devices.lock().clone()
    }

    /// Emitted batches (each one ends with an implicit sync report)
    pub fn batches(&self) -> Vec<(DeviceId, Vec<OutputEvent>)> {
        self.batches.lock().clone()
    }

    /// All emitted events, flattened
    pub fn events(&self) -> Vec<(DeviceId, OutputEvent)> {
        self.batches
            .lock()
            .iter()
            .flat_map(|(id, batch)| batch.iter().map(move |ev| (*id, *ev)))
            .collect()
    }

    /// Emitted events of one kind/code on one device
    pub fn count(&self, id: DeviceId, kind: EventKind, code: u16) -> usize {
        self.events()
            .iter()
            .filter(|(dev, ev)| *dev == id && ev.kind == kind && ev.code == code)
            .count()
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

/// Factory producing logging devices
#[derive(Clone, Debug)]
pub struct MockDeviceFactory {
    log: Arc<MockOutputLog>,
}

impl MockDeviceFactory {
    pub fn new(log: Arc<MockOutputLog>) -> Self {
        Self { log }
    }
}

impl DeviceFactory for MockDeviceFactory {
    fn create(&self, id: DeviceId, spec: &DeviceSpec) -> Result<Box<dyn OutputDevice>, BackendError> {
        info!("[MOCK UINPUT] Created '{}' ({})", spec.name, id);
        self.log.devices.lock().push((id, spec.clone()));
        Ok(Box::new(MockOutputDevice {
            id,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Device that records batches into the shared log
pub struct MockOutputDevice {
    id: DeviceId,
    log: Arc<MockOutputLog>,
}

impl OutputDevice for MockOutputDevice {
    fn emit(&mut self, events: &[OutputEvent]) -> Result<(), BackendError> {
        for ev in events {
            info!("[MOCK UINPUT] {} {:?} {} = {}", self.id, ev.kind, ev.code, ev.value);
        }
        self.log.batches.lock().push((self.id, events.to_vec()));
        Ok(())
    }
}
