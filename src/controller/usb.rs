//! Xbox 360 USB backends
//!
//! Minimal report decoders for the wired pad and the wireless receiver. The
//! transport is abstracted behind [`UsbTransport`] so decoding works the same
//! against hidapi, a capture file or a test double.

use super::constants::*;
use super::types::{Axis, Button, GenericInputMessage};
use super::{ControllerError, ControllerKind, ControllerSource, DeviceIdentity};
use log::{debug, info, warn};

/// Byte-level access to a USB device
pub trait UsbTransport: Send {
    /// Read one report into `buf`, waiting at most `timeout_ms`.
    /// Returns the number of bytes read (0 on timeout).
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, ControllerError>;

    /// Write one output report
    fn write(&mut self, data: &[u8]) -> Result<usize, ControllerError>;
}

#[cfg(feature = "usb")]
impl UsbTransport for hidapi::HidDevice {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, ControllerError> {
        hidapi::HidDevice::read_timeout(self, buf, timeout_ms)
            .map_err(|e| ControllerError::Io(std::io::Error::other(e.to_string())))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ControllerError> {
        hidapi::HidDevice::write(self, data)
            .map_err(|e| ControllerError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Decode a 20-byte wired report into `msg`
///
/// Byte 2/3 carry the digital buttons, 4/5 the triggers and 6..14 the sticks as
/// little-endian i16. Stick Y is flipped to the Linux (down = positive) convention.
pub fn decode_xbox360_report(data: &[u8], msg: &mut GenericInputMessage) -> Result<(), ControllerError> {
    if data.len() < XBOX360_REPORT_LEN {
        return Err(ControllerError::Protocol(format!(
            "short report: {} bytes",
            data.len()
        )));
    }

    let b2 = data[2];
    let b3 = data[3];

    msg.set_button(Button::DpadUp, b2 & 0x01 != 0);
    msg.set_button(Button::DpadDown, b2 & 0x02 != 0);
    msg.set_button(Button::DpadLeft, b2 & 0x04 != 0);
    msg.set_button(Button::DpadRight, b2 & 0x08 != 0);
    msg.set_button(Button::Start, b2 & 0x10 != 0);
    msg.set_button(Button::Back, b2 & 0x20 != 0);
    msg.set_button(Button::ThumbL, b2 & 0x40 != 0);
    msg.set_button(Button::ThumbR, b2 & 0x80 != 0);

    msg.set_button(Button::LB, b3 & 0x01 != 0);
    msg.set_button(Button::RB, b3 & 0x02 != 0);
    msg.set_button(Button::Guide, b3 & 0x04 != 0);
    msg.set_button(Button::A, b3 & 0x10 != 0);
    msg.set_button(Button::B, b3 & 0x20 != 0);
    msg.set_button(Button::X, b3 & 0x40 != 0);
    msg.set_button(Button::Y, b3 & 0x80 != 0);

    msg.set_trigger(Axis::LT, data[4] as i32);
    msg.set_trigger(Axis::RT, data[5] as i32);

    let stick = |lo: usize| i16::from_le_bytes([data[lo], data[lo + 1]]) as i32;
    msg.set_axis(Axis::X1, stick(6));
    msg.set_axis(Axis::Y1, -1 - stick(8));
    msg.set_axis(Axis::X2, stick(10));
    msg.set_axis(Axis::Y2, -1 - stick(12));

    msg.sync_dpad_axes();
    Ok(())
}

fn led_packet(status: u8) -> [u8; 3] {
    [XBOX360_LED_PREFIX[0], XBOX360_LED_PREFIX[1], status]
}

fn rumble_packet(left: u8, right: u8) -> [u8; 8] {
    let mut packet = XBOX360_RUMBLE_TEMPLATE;
    packet[XBOX360_RUMBLE_LEFT_INDEX] = left;
    packet[XBOX360_RUMBLE_RIGHT_INDEX] = right;
    packet
}

fn wireless_led_packet(status: u8) -> [u8; 12] {
    let mut packet = WIRELESS_LED_TEMPLATE;
    packet[WIRELESS_LED_INDEX] = 0x40 + status;
    packet
}

fn wireless_rumble_packet(left: u8, right: u8) -> [u8; 12] {
    let mut packet = WIRELESS_RUMBLE_TEMPLATE;
    packet[WIRELESS_RUMBLE_LEFT_INDEX] = left;
    packet[WIRELESS_RUMBLE_RIGHT_INDEX] = right;
    packet
}

/// Wired Xbox 360 pad
pub struct Xbox360Controller<T: UsbTransport> {
    transport: T,
    identity: DeviceIdentity,
}

impl<T: UsbTransport> Xbox360Controller<T> {
    pub fn new(transport: T, identity: DeviceIdentity) -> Self {
        info!("✓ Xbox 360 controller ready: {}", identity);
        Self { transport, identity }
    }
}

impl<T: UsbTransport> ControllerSource for Xbox360Controller<T> {
    fn read(&mut self, msg: &mut GenericInputMessage, timeout_ms: u32) -> Result<bool, ControllerError> {
        let mut buf = [0u8; 32];
        let len = self.transport.read_timeout(&mut buf, timeout_ms as i32)?;
        if len == 0 {
            return Ok(false);
        }

        // Anything other than an input report (LED/rumble acks, ...) is skipped
        if len < XBOX360_REPORT_LEN || buf[..2] != XBOX360_REPORT_HEADER {
            debug!("Ignoring {} byte packet type {:#04x}", len, buf[0]);
            return Ok(false);
        }

        decode_xbox360_report(&buf[..len], msg)?;
        Ok(true)
    }

    fn set_led(&mut self, status: u8) {
        if let Err(e) = self.transport.write(&led_packet(status)) {
            warn!("LED write failed on {}: {}", self.identity.path, e);
        }
    }

    fn set_rumble(&mut self, left: u8, right: u8) {
        if let Err(e) = self.transport.write(&rumble_packet(left, right)) {
            warn!("Rumble write failed on {}: {}", self.identity.path, e);
        }
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

/// One controller port of an Xbox 360 wireless receiver
pub struct Xbox360WirelessController<T: UsbTransport> {
    transport: T,
    identity: DeviceIdentity,
    connected: bool,
    led_status: Option<u8>,
}

impl<T: UsbTransport> Xbox360WirelessController<T> {
    pub fn new(transport: T, identity: DeviceIdentity) -> Self {
        info!("✓ Xbox 360 wireless port ready: {}", identity);
        Self {
            transport,
            identity,
            connected: false,
            led_status: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn port(&self) -> u8 {
        match self.identity.kind {
            ControllerKind::UsbWireless { port } => port,
            _ => 0,
        }
    }
}

impl<T: UsbTransport> ControllerSource for Xbox360WirelessController<T> {
    fn read(&mut self, msg: &mut GenericInputMessage, timeout_ms: u32) -> Result<bool, ControllerError> {
        let mut buf = [0u8; 32];
        let len = self.transport.read_timeout(&mut buf, timeout_ms as i32)?;
        if len == 0 {
            return Ok(false);
        }
        if len < 2 {
            return Ok(false);
        }

        if buf[0] == WIRELESS_STATUS_PACKET {
            let connected = buf[1] & WIRELESS_STATUS_CONNECTED != 0;
            if connected != self.connected {
                self.connected = connected;
                if connected {
                    info!("Wireless controller connected on port {}", self.port());
                    if let Some(status) = self.led_status {
                        self.set_led(status);
                    }
                } else {
                    info!("Wireless controller on port {} went away", self.port());
                }
            }
            return Ok(false);
        }

        if buf[0] == 0x00 && buf[1] == 0x01 && len >= WIRELESS_PACKET_LEN {
            let report = &buf[WIRELESS_REPORT_OFFSET..WIRELESS_REPORT_OFFSET + XBOX360_REPORT_LEN];
            if report[..2] == XBOX360_REPORT_HEADER {
                decode_xbox360_report(report, msg)?;
                return Ok(true);
            }
        }

        debug!("Ignoring wireless packet {:02x} {:02x} ({} bytes)", buf[0], buf[1], len);
        Ok(false)
    }

    fn set_led(&mut self, status: u8) {
        self.led_status = Some(status);
        if let Err(e) = self.transport.write(&wireless_led_packet(status)) {
            warn!("LED write failed on {}: {}", self.identity.path, e);
        }
    }

    fn set_rumble(&mut self, left: u8, right: u8) {
        if let Err(e) = self.transport.write(&wireless_rumble_packet(left, right)) {
            warn!("Rumble write failed on {}: {}", self.identity.path, e);
        }
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Serves canned packets and records writes
    pub(crate) struct ScriptedTransport {
        pub reads: VecDeque<Vec<u8>>,
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(reads: Vec<Vec<u8>>) -> Self {
            Self {
                reads: reads.into(),
                writes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl UsbTransport for ScriptedTransport {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, ControllerError> {
            match self.reads.pop_front() {
                Some(packet) => {
                    buf[..packet.len()].copy_from_slice(&packet);
                    Ok(packet.len())
                }
                None => Ok(0),
            }
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, ControllerError> {
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }
    }

    pub(crate) fn wired_identity() -> DeviceIdentity {
        DeviceIdentity {
            kind: ControllerKind::UsbWired,
            bus: 1,
            address: 4,
            vendor: 0x045e,
            product: 0x028e,
            path: "0001:0004:00".to_string(),
            name: "Microsoft Xbox 360 Controller".to_string(),
        }
    }

    pub(crate) fn report(b2: u8, b3: u8, lt: u8, rt: u8, lx: i16, ly: i16) -> Vec<u8> {
        let mut data = vec![0u8; XBOX360_REPORT_LEN];
        data[0] = 0x00;
        data[1] = 0x14;
        data[2] = b2;
        data[3] = b3;
        data[4] = lt;
        data[5] = rt;
        data[6..8].copy_from_slice(&lx.to_le_bytes());
        data[8..10].copy_from_slice(&ly.to_le_bytes());
        data
    }

    #[test]
    fn test_decode_buttons_and_triggers() {
        let mut msg = GenericInputMessage::new();
        decode_xbox360_report(&report(0x11, 0x11, 255, 0, 0, 0), &mut msg).unwrap();
        assert!(msg.get_button(Button::DpadUp));
        assert!(msg.get_button(Button::Start));
        assert!(msg.get_button(Button::LB));
        assert!(msg.get_button(Button::A));
        assert!(!msg.get_button(Button::B));
        assert_eq!(msg.get_axis(Axis::LT), 255);
        assert!(msg.get_button(Button::LT));
        assert_eq!(msg.get_axis(Axis::DpadY), -1);
    }

    #[test]
    fn test_decode_sticks_flip_y() {
        let mut msg = GenericInputMessage::new();
        decode_xbox360_report(&report(0, 0, 0, 0, 32767, 32767), &mut msg).unwrap();
        assert_eq!(msg.get_axis(Axis::X1), 32767);
        assert_eq!(msg.get_axis(Axis::Y1), -32768);

        decode_xbox360_report(&report(0, 0, 0, 0, -32768, -32768), &mut msg).unwrap();
        assert_eq!(msg.get_axis(Axis::Y1), 32767);
    }

    #[test]
    fn test_short_report_is_protocol_error() {
        let mut msg = GenericInputMessage::new();
        assert!(matches!(
            decode_xbox360_report(&[0x00, 0x14, 0x00], &mut msg),
            Err(ControllerError::Protocol(_))
        ));
    }

    #[test]
    fn test_wired_read_timeout_and_non_input_packets() {
        let transport = ScriptedTransport::new(vec![vec![0x01, 0x03, 0x06], report(0, 0x20, 0, 0, 0, 0)]);
        let mut pad = Xbox360Controller::new(transport, wired_identity());
        let mut msg = GenericInputMessage::new();

        assert!(!pad.read(&mut msg, 10).unwrap());
        assert_eq!(msg, GenericInputMessage::new());
        assert!(pad.read(&mut msg, 10).unwrap());
        assert!(msg.get_button(Button::B));
        assert!(!pad.read(&mut msg, 10).unwrap());
    }

    #[test]
    fn test_wired_led_and_rumble_packets() {
        let transport = ScriptedTransport::new(vec![]);
        let writes = Arc::clone(&transport.writes);
        let mut pad = Xbox360Controller::new(transport, wired_identity());

        pad.set_led(6);
        pad.set_rumble(0x20, 0xff);

        let writes = writes.lock().unwrap();
        assert_eq!(writes[0], vec![0x01, 0x03, 0x06]);
        assert_eq!(writes[1], vec![0x00, 0x08, 0x00, 0x20, 0xff, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_wireless_status_and_data_packets() {
        let mut data = vec![0u8; WIRELESS_PACKET_LEN];
        data[1] = 0x01;
        data[WIRELESS_REPORT_OFFSET..WIRELESS_REPORT_OFFSET + XBOX360_REPORT_LEN]
            .copy_from_slice(&report(0, 0x40, 0, 0, 0, 0));

        let transport = ScriptedTransport::new(vec![vec![0x08, 0x80], data]);
        let writes = Arc::clone(&transport.writes);
        let mut identity = wired_identity();
        identity.kind = ControllerKind::UsbWireless { port: 2 };
        let mut pad = Xbox360WirelessController::new(transport, identity);
        pad.set_led(4);

        let mut msg = GenericInputMessage::new();
        assert!(!pad.read(&mut msg, 10).unwrap());
        assert!(pad.is_connected());
        assert!(pad.read(&mut msg, 10).unwrap());
        assert!(msg.get_button(Button::X));

        let writes = writes.lock().unwrap();
        // LED is resent once the controller shows up
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1][3], 0x44);
    }
}
