//! Device discovery and opening
//!
//! Scanners enumerate candidate devices and report their identities; an
//! opener turns an identity into a live [`ControllerSource`]. The manager only
//! talks to the two traits, so tests can swap in scripted versions.

use super::capture::ReplayTransport;
use super::evdev::{EvdevController, EvdevMaps};
use super::usb::Xbox360Controller;
use super::{ControllerError, ControllerKind, ControllerSource, DeviceIdentity};
use evdev::KeyCode;
use log::{debug, trace, warn};
use std::path::{Path, PathBuf};

/// Enumerates candidate controllers
pub trait DeviceScanner: Send {
    fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError>;
}

/// Opens (and claims) a discovered controller
pub trait SourceOpener {
    fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn ControllerSource>, ControllerError>;
}

/// Scans `/dev/input` for devices that look like gamepads or joysticks
pub struct EvdevScanner {
    /// Devices whose name starts with this prefix are skipped (our own virtual devices)
    exclude_prefix: String,
}

impl EvdevScanner {
    pub fn new(exclude_prefix: &str) -> Self {
        Self {
            exclude_prefix: exclude_prefix.to_string(),
        }
    }
}

impl DeviceScanner for EvdevScanner {
    fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError> {
        let mut found = Vec::new();
        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or("Unknown").to_string();
            if !self.exclude_prefix.is_empty() && name.starts_with(&self.exclude_prefix) {
                trace!("Skipping own virtual device {}", name);
                continue;
            }

            let is_pad = device.supported_keys().is_some_and(|keys| {
                keys.contains(KeyCode::BTN_SOUTH) || keys.contains(KeyCode::BTN_TRIGGER)
            });
            if !is_pad {
                continue;
            }

            let path = path.display().to_string();
            let input_id = device.input_id();
            found.push(DeviceIdentity {
                kind: ControllerKind::Evdev,
                bus: input_id.bus_type().0,
                address: super::evdev::event_node_number(&path),
                vendor: input_id.vendor(),
                product: input_id.product(),
                path,
                name,
            });
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("evdev scan found {} pads", found.len());
        Ok(found)
    }
}

/// Reports a fixed list of devices (replay files, tests)
pub struct StaticScanner {
    devices: Vec<DeviceIdentity>,
}

impl StaticScanner {
    pub fn new(devices: Vec<DeviceIdentity>) -> Self {
        Self { devices }
    }

    /// One replay device per capture file
    pub fn replay_files<P: AsRef<Path>>(files: &[P]) -> Self {
        let devices = files
            .iter()
            .enumerate()
            .map(|(i, file)| replay_identity(file.as_ref(), i as u16))
            .collect();
        Self::new(devices)
    }
}

impl DeviceScanner for StaticScanner {
    fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError> {
        Ok(self.devices.clone())
    }
}

/// Runs several scanners and concatenates their results
///
/// A failing scanner is logged and skipped so one broken backend does not
/// hide the devices the others find.
#[derive(Default)]
pub struct MultiScanner {
    scanners: Vec<Box<dyn DeviceScanner>>,
}

impl MultiScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scanner: Box<dyn DeviceScanner>) {
        self.scanners.push(scanner);
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

impl DeviceScanner for MultiScanner {
    fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError> {
        let mut found = Vec::new();
        for scanner in self.scanners.iter_mut() {
            match scanner.scan() {
                Ok(devices) => found.extend(devices),
                Err(e) => warn!("Device scan failed: {}", e),
            }
        }
        Ok(found)
    }
}

/// Identity of a capture file served as a wired Xbox 360 pad
pub fn replay_identity(file: &Path, index: u16) -> DeviceIdentity {
    DeviceIdentity {
        kind: ControllerKind::Replay,
        bus: 0,
        address: index,
        vendor: 0x045e,
        product: 0x028e,
        path: file.display().to_string(),
        name: format!("Replay {}", file.display()),
    }
}

/// Split a hidapi path into USB bus and device numbers
///
/// Handles the libusb style `0001:0004:00`; anything else (hidraw nodes)
/// yields bus 0 and the trailing node number.
pub fn parse_usb_path(path: &str) -> (u16, u16) {
    let parts: Vec<&str> = path.split(':').collect();
    if parts.len() >= 2 {
        if let (Ok(bus), Ok(dev)) = (u16::from_str_radix(parts[0], 16), u16::from_str_radix(parts[1], 16)) {
            return (bus, dev);
        }
    }
    let digits: String = path
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (0, digits.parse().unwrap_or(0))
}

#[cfg(feature = "usb")]
pub use hid::UsbScanner;

#[cfg(feature = "usb")]
mod hid {
    use super::*;
    use crate::controller::constants::{find_supported_device, GamepadType};
    use hidapi::HidApi;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Scans HID devices against the supported device table
    pub struct UsbScanner {
        api: Arc<Mutex<HidApi>>,
    }

    impl UsbScanner {
        pub fn new(api: Arc<Mutex<HidApi>>) -> Self {
            Self { api }
        }
    }

    impl DeviceScanner for UsbScanner {
        fn scan(&mut self) -> Result<Vec<DeviceIdentity>, ControllerError> {
            let mut api = self.api.lock();
            api.refresh_devices()
                .map_err(|e| ControllerError::Io(std::io::Error::other(e.to_string())))?;

            let mut seen = HashSet::new();
            let mut found = Vec::new();
            for info in api.device_list() {
                let Some(supported) = find_supported_device(info.vendor_id(), info.product_id()) else {
                    continue;
                };
                let path = info.path().to_string_lossy().into_owned();
                if !seen.insert(path.clone()) {
                    continue;
                }
                let (bus, address) = parse_usb_path(&path);
                let interface = info.interface_number();

                let kind = match supported.kind {
                    GamepadType::Xbox360 if interface <= 0 => ControllerKind::UsbWired,
                    // odd interfaces of the receiver carry headset data
                    GamepadType::Xbox360Wireless if interface >= 0 && interface % 2 == 0 => {
                        ControllerKind::UsbWireless { port: (interface / 2) as u8 }
                    }
                    _ => continue,
                };

                found.push(DeviceIdentity {
                    kind,
                    bus,
                    address,
                    vendor: supported.vendor,
                    product: supported.product,
                    path,
                    name: supported.name.to_string(),
                });
            }
            debug!("usb scan found {} pads", found.len());
            Ok(found)
        }
    }

    pub(super) fn open_hid(
        api: &Arc<Mutex<HidApi>>,
        identity: &DeviceIdentity,
        capture_dir: Option<&Path>,
    ) -> Result<Box<dyn ControllerSource>, ControllerError> {
        use crate::controller::capture::{capture_path, CaptureTransport};
        use crate::controller::usb::Xbox360WirelessController;
        use std::ffi::CString;

        let c_path = CString::new(identity.path.clone())
            .map_err(|e| ControllerError::Protocol(e.to_string()))?;
        let device = api.lock().open_path(&c_path).map_err(|e| ControllerError::Claim {
            path: identity.path.clone(),
            reason: e.to_string(),
        })?;

        let wireless = matches!(identity.kind, ControllerKind::UsbWireless { .. });
        let source: Box<dyn ControllerSource> = match (capture_dir, wireless) {
            (Some(dir), false) => {
                let transport = CaptureTransport::create(device, capture_path(dir, &identity.path))?;
                Box::new(Xbox360Controller::new(transport, identity.clone()))
            }
            (Some(dir), true) => {
                let transport = CaptureTransport::create(device, capture_path(dir, &identity.path))?;
                Box::new(Xbox360WirelessController::new(transport, identity.clone()))
            }
            (None, false) => Box::new(Xbox360Controller::new(device, identity.clone())),
            (None, true) => Box::new(Xbox360WirelessController::new(device, identity.clone())),
        };
        Ok(source)
    }
}

/// Opens evdev nodes, replay files and (with the `usb` feature) HID pads
pub struct DefaultOpener {
    maps: EvdevMaps,
    grab: bool,
    capture_dir: Option<PathBuf>,
    #[cfg(feature = "usb")]
    hid: Option<std::sync::Arc<parking_lot::Mutex<hidapi::HidApi>>>,
}

impl DefaultOpener {
    pub fn new(maps: EvdevMaps, grab: bool, capture_dir: Option<PathBuf>) -> Self {
        Self {
            maps,
            grab,
            capture_dir,
            #[cfg(feature = "usb")]
            hid: None,
        }
    }

    #[cfg(feature = "usb")]
    pub fn with_hidapi(mut self, api: std::sync::Arc<parking_lot::Mutex<hidapi::HidApi>>) -> Self {
        self.hid = Some(api);
        self
    }

    #[cfg(feature = "usb")]
    fn open_usb(&self, identity: &DeviceIdentity) -> Result<Box<dyn ControllerSource>, ControllerError> {
        match &self.hid {
            Some(api) => hid::open_hid(api, identity, self.capture_dir.as_deref()),
            None => Err(ControllerError::Unsupported("USB scanning is disabled".to_string())),
        }
    }

    #[cfg(not(feature = "usb"))]
    fn open_usb(&self, identity: &DeviceIdentity) -> Result<Box<dyn ControllerSource>, ControllerError> {
        if let Some(dir) = &self.capture_dir {
            debug!("Capture to {} unavailable without usb support", dir.display());
        }
        Err(ControllerError::Unsupported(format!(
            "{} needs the `usb` feature",
            identity.path
        )))
    }
}

impl SourceOpener for DefaultOpener {
    fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn ControllerSource>, ControllerError> {
        match identity.kind {
            ControllerKind::Evdev => Ok(Box::new(EvdevController::open(
                &identity.path,
                self.maps.clone(),
                self.grab,
            )?)),
            ControllerKind::Replay => {
                let transport = ReplayTransport::open(&identity.path)?;
                Ok(Box::new(Xbox360Controller::new(transport, identity.clone())))
            }
            ControllerKind::UsbWired | ControllerKind::UsbWireless { .. } => self.open_usb(identity),
            ControllerKind::Mock => Err(ControllerError::Unsupported(format!(
                "mock device {} has no backing hardware",
                identity.path
            ))),
        }
    }
}
