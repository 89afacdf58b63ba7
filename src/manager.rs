//! High-level slot manager
//!
//! Owns every controller slot and the shared output multiplexer. Discovered
//! devices are bound to the first free slot whose rules accept them, vanished
//! devices are disconnected, and finished workers are reaped on every tick.
//! [`SlotManager::run`] is the daemon loop: a scanner thread reports hot-plug
//! events over a channel while the loop drives the repeat timers.

use crate::backend::{DeviceFactory, VirtualOutputMultiplexer};
use crate::controller::{DeviceIdentity, DeviceScanner, SourceOpener};
use crate::mapping::config::Config;
use crate::slot::{ControllerSlot, SlotCommand, SlotConfig, SlotError, SlotState};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Hot-plug notification from the scanner thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added(DeviceIdentity),
    Removed(DeviceIdentity),
}

/// Timing knobs of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub read_timeout_ms: u32,
    pub scan_interval_ms: u64,
    pub tick_ms: u64,
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            read_timeout_ms: config.settings.read_timeout_ms,
            scan_interval_ms: config.settings.scan_interval_ms,
            tick_ms: config.settings.tick_ms,
        }
    }
}

/// One line of the controller inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    /// Slot the device is bound to
    pub slot: Option<usize>,
    pub state: Option<SlotState>,
    pub bound: bool,
    #[serde(flatten)]
    pub device: DeviceIdentity,
}

pub struct SlotManager {
    slots: Vec<ControllerSlot>,
    mux: Arc<VirtualOutputMultiplexer>,
    opener: Box<dyn SourceOpener>,
    /// Devices currently present, bound or not
    discovered: Vec<DeviceIdentity>,
    settings: ManagerSettings,
}

impl SlotManager {
    /// Create the slots, register their outputs and activate the virtual devices
    pub fn new(
        configs: Vec<SlotConfig>,
        factory: Box<dyn DeviceFactory>,
        device_name: &str,
        opener: Box<dyn SourceOpener>,
        settings: ManagerSettings,
    ) -> Result<Self, SlotError> {
        let mux = VirtualOutputMultiplexer::new(factory, device_name);
        let mut slots = Vec::with_capacity(configs.len());
        for (id, config) in configs.into_iter().enumerate() {
            config.declare_outputs(&mux)?;
            slots.push(ControllerSlot::new(id, config, settings.read_timeout_ms)?);
        }
        mux.finish()?;
        info!("✓ {} slots ready", slots.len());

        Ok(Self {
            slots,
            mux: Arc::new(mux),
            opener,
            discovered: Vec::new(),
            settings,
        })
    }

    /// Build a manager from a validated configuration
    pub fn from_config(
        config: &Config,
        factory: Box<dyn DeviceFactory>,
        opener: Box<dyn SourceOpener>,
    ) -> Result<Self, SlotError> {
        let configs = config.slot_configs().map_err(|e| SlotError::Config {
            id: 0,
            reason: e.to_string(),
        })?;
        Self::new(
            configs,
            factory,
            &config.settings.device_name,
            opener,
            ManagerSettings::from(config),
        )
    }

    pub fn slots(&self) -> &[ControllerSlot] {
        &self.slots
    }

    pub fn slot(&self, id: usize) -> Option<&ControllerSlot> {
        self.slots.get(id)
    }

    pub fn multiplexer(&self) -> &Arc<VirtualOutputMultiplexer> {
        &self.mux
    }

    /// Bind a newly seen device to the first free slot that accepts it
    ///
    /// Returns the slot id, or `None` when the device was already bound, no
    /// slot accepted it or it failed to open.
    pub fn assign(&mut self, device: DeviceIdentity) -> Option<usize> {
        if !self.discovered.iter().any(|d| d.same_device(&device)) {
            self.discovered.push(device.clone());
        }

        let already_bound = self
            .slots
            .iter()
            .any(|slot| slot.identity().is_some_and(|bound| bound.same_device(&device)));
        if already_bound {
            debug!("{} is already bound", device);
            return None;
        }

        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.state() == SlotState::Unbound && slot.matches(&device))
        else {
            debug!("No free slot for {}", device);
            return None;
        };

        if let Err(e) = slot.begin_connect(device.clone()) {
            warn!("{}", e);
            return None;
        }
        let source = match self.opener.open(&device) {
            Ok(source) => source,
            Err(e) => {
                warn!("Slot {}: {}", slot.id(), e);
                slot.abort_connect();
                return None;
            }
        };
        match slot.start(source, Arc::clone(&self.mux)) {
            Ok(()) => Some(slot.id()),
            Err(e) => {
                warn!("Slot {}: {}", slot.id(), e);
                None
            }
        }
    }

    /// A device vanished: forget it and stop the slot it was bound to
    pub fn remove(&mut self, device: &DeviceIdentity) -> Option<usize> {
        self.discovered.retain(|d| !d.same_device(device));
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.identity().is_some_and(|bound| bound.same_device(device)))?;
        info!("Device removed: {}", device);
        slot.try_disconnect();
        Some(slot.id())
    }

    /// Reap finished workers and advance the repeat timers
    pub fn tick(&mut self, elapsed_ms: u32) {
        for slot in self.slots.iter_mut() {
            if slot.poll() {
                debug!("Slot {} is free again", slot.id());
            }
        }
        if let Err(e) = self.mux.update(elapsed_ms) {
            warn!("Repeat update failed: {}", e);
        }
    }

    pub fn handle(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Added(device) => {
                info!("Device found: {}", device);
                self.assign(device);
            }
            DiscoveryEvent::Removed(device) => {
                self.remove(&device);
            }
        }
    }

    /// Bound and discovered devices
    pub fn inventory(&self) -> Vec<InventoryEntry> {
        let mut entries: Vec<InventoryEntry> = self
            .slots
            .iter()
            .filter_map(|slot| {
                slot.identity().map(|device| InventoryEntry {
                    slot: Some(slot.id()),
                    state: Some(slot.state()),
                    bound: true,
                    device: device.clone(),
                })
            })
            .collect();

        for device in &self.discovered {
            if !entries.iter().any(|e| e.device.same_device(device)) {
                entries.push(InventoryEntry {
                    slot: None,
                    state: None,
                    bound: false,
                    device: device.clone(),
                });
            }
        }
        entries
    }

    pub fn set_led(&mut self, slot: usize, status: u8) -> Result<(), SlotError> {
        self.slots
            .get_mut(slot)
            .ok_or(SlotError::NoSuchSlot(slot))?
            .set_led(status)
    }

    pub fn set_rumble(&self, slot: usize, left: u8, right: u8) -> Result<(), SlotError> {
        self.slots
            .get(slot)
            .ok_or(SlotError::NoSuchSlot(slot))?
            .send_command(SlotCommand::Rumble(left, right))
    }

    /// Daemon loop, returns once `shutdown` is set and every slot has stopped
    pub fn run(&mut self, scanner: Box<dyn DeviceScanner>, shutdown: Arc<AtomicBool>) -> Result<(), SlotError> {
        let (sender, receiver) = bounded(64);
        let scanning = Arc::new(AtomicBool::new(true));
        let scanner_thread = spawn_scanner(
            scanner,
            sender,
            Arc::clone(&scanning),
            Duration::from_millis(self.settings.scan_interval_ms),
        )?;

        info!("✓ Manager started, waiting for controllers...");
        let tick = Duration::from_millis(self.settings.tick_ms.max(1));
        let mut last_tick = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            self.pump(&receiver, tick);
            let elapsed = last_tick.elapsed().as_millis().min(u32::MAX as u128) as u32;
            if elapsed > 0 {
                last_tick += Duration::from_millis(elapsed as u64);
                self.tick(elapsed);
            }
        }

        info!("Shutting down slot manager...");
        scanning.store(false, Ordering::SeqCst);
        drop(receiver);
        if scanner_thread.join().is_err() {
            warn!("Scanner thread panicked");
        }
        self.shutdown();
        info!("✓ Slot manager shutdown complete");
        Ok(())
    }

    /// Wait up to `timeout` for discovery events and handle all that arrived
    fn pump(&mut self, receiver: &Receiver<DiscoveryEvent>, timeout: Duration) {
        match receiver.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                while let Ok(event) = receiver.try_recv() {
                    self.handle(event);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(timeout),
        }
    }

    /// Stop every slot and wait for the workers
    pub fn shutdown(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.try_disconnect();
        }
        for slot in self.slots.iter_mut() {
            slot.disconnect();
        }
    }
}

impl Drop for SlotManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Compare two scans and report what appeared and what vanished
pub fn diff_scan(previous: &[DeviceIdentity], current: &[DeviceIdentity]) -> Vec<DiscoveryEvent> {
    let removed = previous
        .iter()
        .filter(|old| !current.iter().any(|new| new.same_device(old)))
        .map(|old| DiscoveryEvent::Removed(old.clone()));
    let added = current
        .iter()
        .filter(|new| !previous.iter().any(|old| old.same_device(new)))
        .map(|new| DiscoveryEvent::Added(new.clone()));
    removed.chain(added).collect()
}

fn spawn_scanner(
    mut scanner: Box<dyn DeviceScanner>,
    sender: Sender<DiscoveryEvent>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> Result<thread::JoinHandle<()>, SlotError> {
    thread::Builder::new()
        .name("scanner".to_string())
        .spawn(move || {
            info!("Scanner thread started");
            let mut known: Vec<DeviceIdentity> = Vec::new();
            'scan: while running.load(Ordering::SeqCst) {
                match scanner.scan() {
                    Ok(current) => {
                        for event in diff_scan(&known, &current) {
                            if sender.send(event).is_err() {
                                break 'scan;
                            }
                        }
                        known = current;
                    }
                    Err(e) => warn!("Scan error: {}", e),
                }

                // sleep in short steps so shutdown is not delayed by a long interval
                let wake = Instant::now() + interval;
                while running.load(Ordering::SeqCst) && Instant::now() < wake {
                    thread::sleep(interval.min(Duration::from_millis(50)));
                }
            }
            info!("Scanner thread exited");
        })
        .map_err(SlotError::Spawn)
}
