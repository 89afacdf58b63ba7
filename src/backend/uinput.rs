//! uinput backend
//!
//! Creates real kernel input devices through `/dev/uinput` using evdev's
//! `VirtualDevice` builder.

use super::{BackendError, DeviceFactory, DeviceId, DeviceSpec, EventKind, OutputDevice, OutputEvent};
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AbsoluteAxisEvent, AttributeSet, BusType, InputEvent, InputId, KeyCode,
    KeyEvent, RelativeAxisCode, RelativeAxisEvent, UinputAbsSetup,
};
use log::{debug, info};

/// Factory for uinput-backed devices
#[derive(Clone, Copy, Debug, Default)]
pub struct UinputDeviceFactory;

impl DeviceFactory for UinputDeviceFactory {
    fn create(&self, id: DeviceId, spec: &DeviceSpec) -> Result<Box<dyn OutputDevice>, BackendError> {
        let mut builder = VirtualDevice::builder()?
            .name(spec.name.as_str())
            .input_id(InputId::new(BusType::BUS_USB, spec.vendor, spec.product, 0x0110));

        if !spec.keys.is_empty() {
            let mut keys: AttributeSet<KeyCode> = AttributeSet::default();
            for code in &spec.keys {
                keys.insert(KeyCode::new(*code));
            }
            builder = builder.with_keys(&keys)?;
        }

        if !spec.rels.is_empty() {
            let mut rels: AttributeSet<RelativeAxisCode> = AttributeSet::default();
            for code in &spec.rels {
                rels.insert(RelativeAxisCode(*code));
            }
            builder = builder.with_relative_axes(&rels)?;
        }

        for (code, range) in &spec.abs {
            let info = AbsInfo::new(0, range.min, range.max, range.fuzz, range.flat, 0);
            builder = builder.with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode(*code), info))?;
        }

        let device = builder.build()?;
        info!(
            "✓ Created virtual device '{}' ({}): {} keys, {} rel, {} abs",
            spec.name,
            id,
            spec.keys.len(),
            spec.rels.len(),
            spec.abs.len()
        );

        Ok(Box::new(UinputDevice { id, device }))
    }
}

/// One live uinput device
pub struct UinputDevice {
    id: DeviceId,
    device: VirtualDevice,
}

fn to_input_event(event: &OutputEvent) -> InputEvent {
    match event.kind {
        EventKind::Key => InputEvent::from(KeyEvent::new_now(KeyCode::new(event.code), event.value)),
        EventKind::Rel => {
            InputEvent::from(RelativeAxisEvent::new_now(RelativeAxisCode(event.code), event.value))
        }
        EventKind::Abs => {
            InputEvent::from(AbsoluteAxisEvent::new_now(AbsoluteAxisCode(event.code), event.value))
        }
    }
}

impl OutputDevice for UinputDevice {
    fn emit(&mut self, events: &[OutputEvent]) -> Result<(), BackendError> {
        let batch: Vec<InputEvent> = events.iter().map(to_input_event).collect();
        // VirtualDevice::emit appends the SYN_REPORT
        self.device.emit(&batch)?;
        debug!("{}: emitted {} events", self.id, batch.len());
        Ok(())
    }
}
