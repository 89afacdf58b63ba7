//! Event code names
//!
//! Resolves `KEY_*`, `BTN_*`, `REL_*` and `ABS_*` names to kernel codes using
//! evdev's own tables, plus the usual gamepad aliases.

use evdev::{AbsoluteAxisCode, KeyCode, RelativeAxisCode};

/// First joystick button code (`BTN_JOYSTICK` / `BTN_TRIGGER`)
const BTN_JOYSTICK: u16 = 0x120;

/// Resolve a key or button name
pub fn parse_key(name: &str) -> Option<u16> {
    let upper = name.to_ascii_uppercase();
    let alias = match upper.as_str() {
        "BTN_A" => Some(KeyCode::BTN_SOUTH),
        "BTN_B" => Some(KeyCode::BTN_EAST),
        "BTN_X" => Some(KeyCode::BTN_NORTH),
        "BTN_Y" => Some(KeyCode::BTN_WEST),
        "BTN_GAMEPAD" => Some(KeyCode::BTN_SOUTH),
        "BTN_MOUSE" => Some(KeyCode::BTN_LEFT),
        "BTN_TRIGGER" => Some(KeyCode::BTN_TRIGGER),
        _ => None,
    };
    if let Some(code) = alias {
        return Some(code.code());
    }

    if let Some(n) = upper.strip_prefix("JS_") {
        let n: u16 = n.parse().ok()?;
        return (n < 32).then_some(BTN_JOYSTICK + n);
    }

    upper.parse::<KeyCode>().ok().map(|k| k.code())
}

/// Resolve a relative axis name
pub fn parse_rel(name: &str) -> Option<u16> {
    name.to_ascii_uppercase()
        .parse::<RelativeAxisCode>()
        .ok()
        .map(|r| r.0)
}

/// Resolve an absolute axis name
pub fn parse_abs(name: &str) -> Option<u16> {
    name.to_ascii_uppercase()
        .parse::<AbsoluteAxisCode>()
        .ok()
        .map(|a| a.0)
}

/// Name of a key code for log output
pub fn key_name(code: u16) -> String {
    format!("{:?}", KeyCode::new(code))
}

pub fn rel_name(code: u16) -> String {
    format!("{:?}", RelativeAxisCode(code))
}

pub fn abs_name(code: u16) -> String {
    format!("{:?}", AbsoluteAxisCode(code))
}

/// Mouse buttons (`BTN_LEFT` ..= `BTN_TASK`) belong on the mouse device by default
pub fn is_mouse_button(code: u16) -> bool {
    (KeyCode::BTN_LEFT.code()..=KeyCode::BTN_TASK.code()).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamepad_aliases() {
        assert_eq!(parse_key("BTN_A"), Some(KeyCode::BTN_SOUTH.code()));
        assert_eq!(parse_key("btn_x"), Some(KeyCode::BTN_NORTH.code()));
        assert_eq!(parse_key("BTN_Y"), Some(KeyCode::BTN_WEST.code()));
    }

    #[test]
    fn test_joystick_button_numbers() {
        assert_eq!(parse_key("JS_0"), Some(0x120));
        assert_eq!(parse_key("JS_5"), Some(0x125));
        assert_eq!(parse_key("JS_99"), None);
        assert_eq!(parse_key("JS_x"), None);
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(parse_key("KEY_SPACE"), Some(KeyCode::KEY_SPACE.code()));
        assert_eq!(parse_key("BTN_LEFT"), Some(KeyCode::BTN_LEFT.code()));
        assert_eq!(parse_rel("REL_WHEEL"), Some(RelativeAxisCode::REL_WHEEL.0));
        assert_eq!(parse_abs("abs_hat0x"), Some(AbsoluteAxisCode::ABS_HAT0X.0));
        assert_eq!(parse_key("KEY_NOT_A_KEY"), None);
    }

    #[test]
    fn test_mouse_buttons() {
        assert!(is_mouse_button(KeyCode::BTN_LEFT.code()));
        assert!(is_mouse_button(KeyCode::BTN_MIDDLE.code()));
        assert!(!is_mouse_button(KeyCode::BTN_SOUTH.code()));
        assert!(!is_mouse_button(KeyCode::KEY_A.code()));
    }
}
