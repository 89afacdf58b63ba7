//! Virtual output multiplexer
//!
//! Owns every virtual device, keyed by [`DeviceId`], and the background
//! repeat timers for relative axes. Devices are declared lazily during the
//! registration phase and all activated together by [`VirtualOutputMultiplexer::finish`].
//! Shared by all slot workers; one mutex serializes every operation.

use super::{
    AbsRange, BackendError, DeviceFactory, DeviceId, DeviceSpec, EventKind, OutputDevice, OutputEvent,
};
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

enum DeviceEntry {
    /// Declared, capabilities still growing
    Pending(DeviceSpec),
    /// Live device with its not yet synced events
    Active {
        device: Box<dyn OutputDevice>,
        queue: Vec<OutputEvent>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RelRepeat {
    value: i32,
    interval_ms: u32,
    time_count: u32,
}

#[derive(Default)]
struct MuxState {
    devices: BTreeMap<DeviceId, DeviceEntry>,
    repeats: BTreeMap<(DeviceId, u16), RelRepeat>,
    finished: bool,
}

impl MuxState {
    fn pending_spec(&mut self, prefix: &str, id: DeviceId) -> Result<&mut DeviceSpec, BackendError> {
        if self.finished {
            return Err(BackendError::AlreadyFinished);
        }
        let entry = self
            .devices
            .entry(id)
            .or_insert_with(|| {
                debug!("Declaring virtual device {}", id);
                DeviceEntry::Pending(DeviceSpec::for_device(prefix, id))
            });
        match entry {
            DeviceEntry::Pending(spec) => Ok(spec),
            DeviceEntry::Active { .. } => Err(BackendError::AlreadyFinished),
        }
    }

    fn queue(&mut self, id: DeviceId) -> Result<&mut Vec<OutputEvent>, BackendError> {
        if !self.finished {
            return Err(BackendError::NotFinished);
        }
        match self.devices.get_mut(&id) {
            Some(DeviceEntry::Active { queue, .. }) => Ok(queue),
            _ => Err(BackendError::UnknownDevice(id)),
        }
    }

    fn flush(&mut self, id: DeviceId) -> Result<(), BackendError> {
        if let Some(DeviceEntry::Active { device, queue }) = self.devices.get_mut(&id) {
            if !queue.is_empty() {
                let result = device.emit(queue.as_slice());
                queue.clear();
                result?;
            }
        }
        Ok(())
    }
}

/// Fan-out point for all virtual output devices
pub struct VirtualOutputMultiplexer {
    state: Mutex<MuxState>,
    factory: Box<dyn DeviceFactory>,
    name_prefix: String,
}

impl VirtualOutputMultiplexer {
    pub fn new(factory: Box<dyn DeviceFactory>, name_prefix: &str) -> Self {
        Self {
            state: Mutex::new(MuxState::default()),
            factory,
            name_prefix: name_prefix.to_string(),
        }
    }

    /// Declare a key/button on device `id`, creating the declaration if needed
    pub fn add_key(&self, id: DeviceId, code: u16) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.pending_spec(&self.name_prefix, id)?.keys.insert(code);
        Ok(())
    }

    pub fn add_rel(&self, id: DeviceId, code: u16) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.pending_spec(&self.name_prefix, id)?.rels.insert(code);
        Ok(())
    }

    pub fn add_abs(&self, id: DeviceId, code: u16, range: AbsRange) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.pending_spec(&self.name_prefix, id)?.abs.insert(code, range);
        Ok(())
    }

    /// Activate every declared device. Capabilities are frozen afterwards.
    pub fn finish(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(BackendError::AlreadyFinished);
        }

        let ids: Vec<DeviceId> = state.devices.keys().copied().collect();
        for id in ids {
            let Some(DeviceEntry::Pending(spec)) = state.devices.remove(&id) else {
                continue;
            };
            if spec.is_empty() {
                debug!("Skipping virtual device {} without capabilities", id);
                continue;
            }
            let device = self.factory.create(id, &spec)?;
            state.devices.insert(
                id,
                DeviceEntry::Active {
                    device,
                    queue: Vec::new(),
                },
            );
        }

        state.finished = true;
        info!("✓ {} virtual devices active", state.devices.len());
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Ids of all declared or active devices
    pub fn device_ids(&self) -> BTreeSet<DeviceId> {
        self.state.lock().devices.keys().copied().collect()
    }

    /// Queue one event on device `id`; it is written on the next [`sync`](Self::sync)
    pub fn send(&self, id: DeviceId, kind: EventKind, code: u16, value: i32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        trace!("{} {:?} {} = {}", id, kind, code, value);
        state.queue(id)?.push(OutputEvent::new(kind, code, value));
        Ok(())
    }

    pub fn send_key(&self, id: DeviceId, code: u16, pressed: bool) -> Result<(), BackendError> {
        self.send(id, EventKind::Key, code, pressed as i32)
    }

    pub fn send_abs(&self, id: DeviceId, code: u16, value: i32) -> Result<(), BackendError> {
        self.send(id, EventKind::Abs, code, value)
    }

    /// Queue and write a complete frame under one lock acquisition
    ///
    /// Only the devices named in `events` are flushed, so a frame from one
    /// slot is never split by another slot's sync. Nothing is queued if any
    /// device is unknown.
    pub fn send_frame(&self, events: &[(DeviceId, OutputEvent)]) -> Result<(), BackendError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let touched: BTreeSet<DeviceId> = events.iter().map(|(id, _)| *id).collect();
        for id in &touched {
            state.queue(*id)?;
        }
        for (id, event) in events {
            trace!("{} {:?} {} = {}", id, event.kind, event.code, event.value);
            state.queue(*id)?.push(*event);
        }

        let mut result = Ok(());
        for id in touched {
            if let Err(e) = state.flush(id) {
                result = Err(e);
            }
        }
        result
    }

    /// Install, update or remove the repeat timer for a relative axis
    ///
    /// A new entry starts with no accumulated time; an existing one keeps its
    /// accumulated time and only takes the new value and interval. A negative
    /// interval removes the entry (silently if there is none). Nothing is sent
    /// immediately; emission happens in [`update`](Self::update).
    pub fn send_rel_repetitive(
        &self,
        id: DeviceId,
        code: u16,
        value: i32,
        interval_ms: i32,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();

        if interval_ms < 0 {
            if state.repeats.remove(&(id, code)).is_some() {
                trace!("{} REL {} repeat removed", id, code);
            }
            return Ok(());
        }

        // Reject unknown devices up front
        state.queue(id)?;

        let interval_ms = (interval_ms as u32).max(1);
        state
            .repeats
            .entry((id, code))
            .and_modify(|repeat| {
                repeat.value = value;
                repeat.interval_ms = interval_ms;
            })
            .or_insert_with(|| {
                trace!("{} REL {} repeat installed: {} every {}ms", id, code, value, interval_ms);
                RelRepeat {
                    value,
                    interval_ms,
                    time_count: 0,
                }
            });
        Ok(())
    }

    /// Advance every repeat timer by `elapsed_ms`, emitting once per full interval
    pub fn update(&self, elapsed_ms: u32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let mut touched = BTreeSet::new();
        let mut pending = Vec::new();

        for (&(id, code), repeat) in state.repeats.iter_mut() {
            repeat.time_count = repeat.time_count.saturating_add(elapsed_ms);
            while repeat.time_count >= repeat.interval_ms {
                repeat.time_count -= repeat.interval_ms;
                pending.push((id, OutputEvent::new(EventKind::Rel, code, repeat.value)));
            }
        }

        for (id, event) in pending {
            state.queue(id)?.push(event);
            touched.insert(id);
        }

        let mut result = Ok(());
        for id in touched {
            if let Err(e) = state.flush(id) {
                result = Err(e);
            }
        }
        result
    }

    /// Write out every device's queued events, each batch closed by a sync report
    pub fn sync(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.finished {
            return Err(BackendError::NotFinished);
        }
        let ids: Vec<DeviceId> = state.devices.keys().copied().collect();
        let mut result = Ok(());
        for id in ids {
            if let Err(e) = state.flush(id) {
                result = Err(e);
            }
        }
        result
    }

    /// Number of installed repeat timers
    pub fn active_repeats(&self) -> usize {
        self.state.lock().repeats.len()
    }
}
