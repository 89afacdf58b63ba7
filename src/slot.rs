//! Controller slots
//!
//! A slot is one logical controller position. It owns its remap tables and
//! modifier chain, and at most one bound physical device at a time. While a
//! device is bound, a worker thread runs the read → modify → remap → emit
//! loop for it.
//!
//! ```text
//! Unbound ──begin_connect──▶ Connecting ──start──▶ Connected
//!    ▲                           │                     │
//!    └────────abort_connect──────┘              try_disconnect / I/O error
//!    ▲                                                 ▼
//!    └──────────────────poll (join)─────────────── Disconnecting
//! ```

use crate::backend::{BackendError, VirtualOutputMultiplexer};
use crate::controller::{ControllerKind, ControllerSource, DeviceIdentity, GenericInputMessage};
use crate::mapping::button_map::{AxisEventTable, ButtonRemapTable};
use crate::mapping::executor::MappingExecutor;
use crate::modifier::{ModifierChain, ModifierSpec};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Slot {id} is {state}, expected {expected}")]
    WrongState {
        id: usize,
        state: SlotState,
        expected: SlotState,
    },

    #[error("No slot with id {0}")]
    NoSuchSlot(usize),

    #[error("Slot {0} has no device bound")]
    NotConnected(usize),

    #[error("Slot {id} configuration is invalid: {reason}")]
    Config { id: usize, reason: String },

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Unbound,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Unbound => "unbound",
            SlotState::Connecting => "connecting",
            SlotState::Connected => "connected",
            SlotState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Predicate deciding whether a discovered device may bind to a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatchRule {
    Any,
    /// USB bus and device number
    UsbPath { bus: u16, dev: u16 },
    UsbId { vendor: u16, product: u16 },
    /// evdev node path, e.g. `/dev/input/event5`
    EvdevPath { path: String },
    /// Case-insensitive substring of the device name
    Name { contains: String },
}

impl MatchRule {
    pub fn matches(&self, device: &DeviceIdentity) -> bool {
        let is_usb = matches!(
            device.kind,
            ControllerKind::UsbWired | ControllerKind::UsbWireless { .. }
        );
        match self {
            MatchRule::Any => true,
            MatchRule::UsbPath { bus, dev } => is_usb && device.bus == *bus && device.address == *dev,
            MatchRule::UsbId { vendor, product } => device.vendor == *vendor && device.product == *product,
            MatchRule::EvdevPath { path } => device.kind == ControllerKind::Evdev && device.path == *path,
            MatchRule::Name { contains } => device
                .name
                .to_ascii_lowercase()
                .contains(&contains.to_ascii_lowercase()),
        }
    }
}

/// Everything a slot is configured with
#[derive(Debug, Clone)]
pub struct SlotConfig {
    pub buttons: ButtonRemapTable,
    pub axes: AxisEventTable,
    pub modifiers: Vec<ModifierSpec>,
    /// Output device group the slot writes to
    pub group: u16,
    pub led: Option<u8>,
    pub rules: Vec<MatchRule>,
}

impl SlotConfig {
    /// Default gamepad layout, no modifiers, matching any device
    pub fn new(group: u16) -> Self {
        Self {
            buttons: ButtonRemapTable::with_defaults(),
            axes: AxisEventTable::with_defaults(),
            modifiers: Vec::new(),
            group,
            led: None,
            rules: Vec::new(),
        }
    }

    /// Register every output this slot can produce
    pub fn declare_outputs(&self, mux: &VirtualOutputMultiplexer) -> Result<(), BackendError> {
        self.buttons.declare(mux, self.group)?;
        self.axes.declare(mux, self.group)
    }

    fn pipeline(&self) -> Result<SlotPipeline, String> {
        Ok(SlotPipeline {
            chain: ModifierChain::from_specs(&self.modifiers)?,
            executor: MappingExecutor::new(self.buttons.clone(), self.axes.clone(), self.group),
        })
    }
}

/// Command forwarded to a running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCommand {
    Led(u8),
    Rumble(u8, u8),
}

/// Per-slot processing state, moved into the worker while a device is bound
struct SlotPipeline {
    chain: ModifierChain,
    executor: MappingExecutor,
}

struct Worker {
    handle: JoinHandle<SlotPipeline>,
    stop: Arc<AtomicBool>,
    commands: Sender<SlotCommand>,
}

pub struct ControllerSlot {
    id: usize,
    config: SlotConfig,
    state: SlotState,
    led_status: u8,
    read_timeout_ms: u32,
    identity: Option<DeviceIdentity>,
    pipeline: Option<SlotPipeline>,
    worker: Option<Worker>,
}

impl ControllerSlot {
    pub fn new(id: usize, config: SlotConfig, read_timeout_ms: u32) -> Result<Self, SlotError> {
        let pipeline = config
            .pipeline()
            .map_err(|reason| SlotError::Config { id, reason })?;
        let led_status = config
            .led
            .unwrap_or_else(|| crate::controller::constants::default_led_for_slot(id));
        Ok(Self {
            id,
            config,
            state: SlotState::Unbound,
            led_status,
            read_timeout_ms: read_timeout_ms.max(1),
            identity: None,
            pipeline: Some(pipeline),
            worker: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    pub fn led_status(&self) -> u8 {
        self.led_status
    }

    /// Identity of the bound device, if any
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// A slot without rules accepts any device
    pub fn matches(&self, device: &DeviceIdentity) -> bool {
        self.config.rules.is_empty() || self.config.rules.iter().any(|rule| rule.matches(device))
    }

    fn expect_state(&self, expected: SlotState) -> Result<(), SlotError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SlotError::WrongState {
                id: self.id,
                state: self.state,
                expected,
            })
        }
    }

    /// Reserve the slot for `identity` while its source is being opened
    pub fn begin_connect(&mut self, identity: DeviceIdentity) -> Result<(), SlotError> {
        self.expect_state(SlotState::Unbound)?;
        debug!("Slot {}: connecting {}", self.id, identity);
        self.identity = Some(identity);
        self.state = SlotState::Connecting;
        Ok(())
    }

    /// Give up a connection attempt, e.g. after the device failed to open
    pub fn abort_connect(&mut self) {
        if self.state == SlotState::Connecting && self.worker.is_none() {
            debug!("Slot {}: connection aborted", self.id);
            self.identity = None;
            self.state = SlotState::Unbound;
        }
    }

    /// Hand the opened source to a new worker thread
    pub fn start(
        &mut self,
        source: Box<dyn ControllerSource>,
        mux: Arc<VirtualOutputMultiplexer>,
    ) -> Result<(), SlotError> {
        self.expect_state(SlotState::Connecting)?;
        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => self
                .config
                .pipeline()
                .map_err(|reason| SlotError::Config { id: self.id, reason })?,
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (commands, receiver) = unbounded();
        let _ = commands.send(SlotCommand::Led(self.led_status));

        let id = self.id;
        let timeout = self.read_timeout_ms;
        let worker_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name(format!("slot-{}", id))
            .spawn(move || run_worker(id, source, pipeline, mux, worker_stop, receiver, timeout));

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { handle, stop, commands });
                self.state = SlotState::Connected;
                if let Some(identity) = &self.identity {
                    info!("✓ Slot {} connected: {}", self.id, identity);
                }
                Ok(())
            }
            Err(e) => {
                // the closure (and with it the source) was dropped by the failed spawn
                self.pipeline = self.config.pipeline().ok();
                self.identity = None;
                self.state = SlotState::Unbound;
                Err(SlotError::Spawn(e))
            }
        }
    }

    /// Ask the worker to stop without waiting for it
    ///
    /// Returns false when there was nothing to stop.
    pub fn try_disconnect(&mut self) -> bool {
        match &self.worker {
            Some(worker) => {
                worker.stop.store(true, Ordering::SeqCst);
                if self.state != SlotState::Disconnecting {
                    info!("Slot {}: disconnecting", self.id);
                }
                self.state = SlotState::Disconnecting;
                true
            }
            None => {
                self.abort_connect();
                false
            }
        }
    }

    /// Reap a worker that has exited. Returns true when the slot became unbound.
    pub fn poll(&mut self) -> bool {
        let finished = self.worker.as_ref().is_some_and(|w| w.handle.is_finished());
        if finished {
            self.reap();
        }
        finished
    }

    /// Stop the worker and wait for it to exit
    pub fn disconnect(&mut self) {
        if self.try_disconnect() {
            self.reap();
        }
    }

    fn reap(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        match worker.handle.join() {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(_) => {
                error!("Slot {}: worker panicked", self.id);
                self.pipeline = self.config.pipeline().ok();
            }
        }
        if let Some(identity) = self.identity.take() {
            info!("Slot {}: released {}", self.id, identity);
        }
        self.state = SlotState::Unbound;
    }

    /// Forward a command to the running worker
    pub fn send_command(&self, command: SlotCommand) -> Result<(), SlotError> {
        let worker = self.worker.as_ref().ok_or(SlotError::NotConnected(self.id))?;
        worker
            .commands
            .send(command)
            .map_err(|_| SlotError::NotConnected(self.id))
    }

    /// Change the LED status, applied now if a device is bound and on every later bind
    pub fn set_led(&mut self, status: u8) -> Result<(), SlotError> {
        self.led_status = status;
        if self.worker.is_some() {
            self.send_command(SlotCommand::Led(status))?;
        }
        Ok(())
    }
}

impl Drop for ControllerSlot {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_worker(
    id: usize,
    mut source: Box<dyn ControllerSource>,
    mut pipeline: SlotPipeline,
    mux: Arc<VirtualOutputMultiplexer>,
    stop: Arc<AtomicBool>,
    commands: Receiver<SlotCommand>,
    timeout_ms: u32,
) -> SlotPipeline {
    info!("Slot {}: worker started", id);
    let mut raw = GenericInputMessage::new();
    let mut last_tick = Instant::now();

    loop {
        while let Ok(command) = commands.try_recv() {
            match command {
                SlotCommand::Led(status) => source.set_led(status),
                SlotCommand::Rumble(left, right) => source.set_rumble(left, right),
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = source.read(&mut raw, timeout_ms) {
            warn!("Slot {}: device lost: {}", id, e);
            break;
        }

        let elapsed = last_tick.elapsed().as_millis().min(u32::MAX as u128) as u32;
        // keep the sub-millisecond remainder for the next tick
        last_tick += Duration::from_millis(elapsed as u64);

        let mut msg = raw;
        pipeline.chain.update(elapsed, &mut msg);
        if let Err(e) = pipeline.executor.process(&msg, &mux) {
            error!("Slot {}: output failed, stopping: {}", id, e);
            break;
        }
    }

    if let Err(e) = pipeline.executor.reset(&mux) {
        warn!("Slot {}: failed to release outputs: {}", id, e);
    }
    drop(source);
    info!("Slot {}: worker stopped", id);
    pipeline
}
