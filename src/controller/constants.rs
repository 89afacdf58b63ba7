//! Controller protocol constants
//!
//! This module contains the constants needed to talk to supported pads:
//! - the supported USB device table
//! - Xbox 360 report layouts and output packets
//! - timing and LED defaults

// ============================================================================
// Supported USB devices
// ============================================================================

/// Wire protocol spoken by a supported USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadType {
    /// Wired Xbox 360 pad and compatible third-party pads
    Xbox360,
    /// Xbox 360 wireless receiver (four controller ports)
    Xbox360Wireless,
}

/// One entry of the supported device table
#[derive(Debug, Clone, Copy)]
pub struct SupportedDevice {
    pub vendor: u16,
    pub product: u16,
    pub kind: GamepadType,
    pub name: &'static str,
}

pub const SUPPORTED_DEVICES: &[SupportedDevice] = &[
    SupportedDevice { vendor: 0x045e, product: 0x028e, kind: GamepadType::Xbox360, name: "Microsoft Xbox 360 Controller" },
    SupportedDevice { vendor: 0x045e, product: 0x028f, kind: GamepadType::Xbox360, name: "Microsoft Xbox 360 Controller (plug-and-charge)" },
    SupportedDevice { vendor: 0x045e, product: 0x0291, kind: GamepadType::Xbox360Wireless, name: "Microsoft Xbox 360 Wireless Receiver" },
    SupportedDevice { vendor: 0x045e, product: 0x0719, kind: GamepadType::Xbox360Wireless, name: "Microsoft Xbox 360 Wireless Receiver" },
    SupportedDevice { vendor: 0x046d, product: 0xc21d, kind: GamepadType::Xbox360, name: "Logitech Gamepad F310" },
    SupportedDevice { vendor: 0x046d, product: 0xc21e, kind: GamepadType::Xbox360, name: "Logitech Gamepad F510" },
    SupportedDevice { vendor: 0x046d, product: 0xc21f, kind: GamepadType::Xbox360, name: "Logitech Gamepad F710" },
    SupportedDevice { vendor: 0x0738, product: 0x4716, kind: GamepadType::Xbox360, name: "Mad Catz Wired Xbox 360 Controller" },
    SupportedDevice { vendor: 0x0738, product: 0x4726, kind: GamepadType::Xbox360, name: "Mad Catz Xbox 360 Controller" },
    SupportedDevice { vendor: 0x0e6f, product: 0x0201, kind: GamepadType::Xbox360, name: "Pelican TSZ360 Pad" },
    SupportedDevice { vendor: 0x12ab, product: 0x0004, kind: GamepadType::Xbox360, name: "Honey Bee Xbox360 dancepad" },
    SupportedDevice { vendor: 0x1430, product: 0x4748, kind: GamepadType::Xbox360, name: "RedOctane Guitar Hero X-plorer" },
    SupportedDevice { vendor: 0x1bad, product: 0xf016, kind: GamepadType::Xbox360, name: "Mad Catz Xbox 360 Controller" },
    SupportedDevice { vendor: 0x24c6, product: 0x5300, kind: GamepadType::Xbox360, name: "PowerA MINI PROEX Controller" },
];

/// Look up a USB vendor/product pair in the supported device table
pub fn find_supported_device(vendor: u16, product: u16) -> Option<&'static SupportedDevice> {
    SUPPORTED_DEVICES
        .iter()
        .find(|d| d.vendor == vendor && d.product == product)
}

// ============================================================================
// Xbox 360 wired reports
// ============================================================================

/// Length of a wired input report
pub const XBOX360_REPORT_LEN: usize = 20;

/// First two bytes of a wired input report (type 0x00, length 0x14)
pub const XBOX360_REPORT_HEADER: [u8; 2] = [0x00, 0x14];

/// LED command: byte 2 carries the LED status
pub const XBOX360_LED_PREFIX: [u8; 2] = [0x01, 0x03];

/// Rumble command template: bytes 3 and 4 carry the left/right motor strength
pub const XBOX360_RUMBLE_TEMPLATE: [u8; 8] = [0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const XBOX360_RUMBLE_LEFT_INDEX: usize = 3;
pub const XBOX360_RUMBLE_RIGHT_INDEX: usize = 4;

// ============================================================================
// Xbox 360 wireless receiver packets
// ============================================================================

/// Length of a wireless receiver packet
pub const WIRELESS_PACKET_LEN: usize = 29;

/// Offset of the embedded wired-style report inside a data packet
pub const WIRELESS_REPORT_OFFSET: usize = 4;

/// Connection status packet: byte 0 == 0x08, byte 1 bit 7 = controller present
pub const WIRELESS_STATUS_PACKET: u8 = 0x08;
pub const WIRELESS_STATUS_CONNECTED: u8 = 0x80;

/// LED command template: byte 3 = 0x40 + LED status
pub const WIRELESS_LED_TEMPLATE: [u8; 12] = [0x00, 0x00, 0x08, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const WIRELESS_LED_INDEX: usize = 3;

/// Rumble command template: bytes 5 and 6 carry the left/right motor strength
pub const WIRELESS_RUMBLE_TEMPLATE: [u8; 12] = [0x00, 0x01, 0x0f, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const WIRELESS_RUMBLE_LEFT_INDEX: usize = 5;
pub const WIRELESS_RUMBLE_RIGHT_INDEX: usize = 6;

/// Number of controller ports on one wireless receiver
pub const WIRELESS_PORTS: u8 = 4;

// ============================================================================
// LED status values
// ============================================================================

/// All LEDs off
pub const LED_OFF: u8 = 0;

/// Default LED status for a slot: flash once, then light ring position
pub fn default_led_for_slot(slot_id: usize) -> u8 {
    2 + (slot_id % 4) as u8
}

// ============================================================================
// Timing Constants
// ============================================================================

/// Default worker read timeout (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 20;

/// Default discovery period (milliseconds)
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;

/// Default manager tick (milliseconds)
pub const DEFAULT_TICK_MS: u64 = 10;

/// Size of one record in a raw capture file
pub const CAPTURE_RECORD_LEN: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_supported_device() {
        let dev = find_supported_device(0x045e, 0x028e).unwrap();
        assert_eq!(dev.kind, GamepadType::Xbox360);
        let dev = find_supported_device(0x045e, 0x0719).unwrap();
        assert_eq!(dev.kind, GamepadType::Xbox360Wireless);
        assert!(find_supported_device(0x1234, 0x5678).is_none());
    }

    #[test]
    fn test_default_led_cycles_ring_positions() {
        assert_eq!(default_led_for_slot(0), 2);
        assert_eq!(default_led_for_slot(3), 5);
        assert_eq!(default_led_for_slot(4), 2);
    }
}
