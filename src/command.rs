//! Configuration command parser.
//!
//! Commands arrive as ASCII text on the configuration characteristic:
//!
//! ```text
//! N:<modifier>:<keycode>   rebind the NEXT button
//! P:<modifier>:<keycode>   rebind the PREV button
//! ```
//!
//! The modifier is whatever sits between the first and the last colon,
//! the keycode whatever follows the last colon. Both must be decimal
//! numbers that fit in a byte. Anything else is rejected as a whole.

use crate::keymap::{KeyBinding, Slot};

/// A well-formed rebind request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigCommand {
    pub slot: Slot,
    pub binding: KeyBinding,
}

impl ConfigCommand {
    /// Parse a raw GATT write. Returns `None` for any malformed input.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let text = core::str::from_utf8(raw).ok()?.trim();

        let (target, rest) = text.split_once(':')?;
        let slot = match target {
            "N" => Slot::Next,
            "P" => Slot::Prev,
            _ => return None,
        };

        let (modifier, keycode) = rest.rsplit_once(':')?;
        let binding = KeyBinding::new(parse_byte(modifier)?, parse_byte(keycode)?);

        Some(Self { slot, binding })
    }
}

fn parse_byte(field: &str) -> Option<u8> {
    let field = field.trim();
    // `u8::from_str` accepts a leading '+'; the wire format does not.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{
        KEY_DOWN_ARROW, KEY_PAGE_DOWN, KEY_RIGHT_ARROW, MOD_LEFT_ALT, MOD_LEFT_CTRL, MOD_LEFT_GUI,
    };

    #[test]
    fn parses_next_command() {
        let cmd = ConfigCommand::parse(b"N:0:81").unwrap();
        assert_eq!(cmd.slot, Slot::Next);
        assert_eq!(cmd.binding, KeyBinding::new(0, KEY_DOWN_ARROW));
    }

    #[test]
    fn parses_prev_command_with_modifier() {
        let cmd = ConfigCommand::parse(b"P:1:78").unwrap();
        assert_eq!(cmd.slot, Slot::Prev);
        assert_eq!(cmd.binding, KeyBinding::new(MOD_LEFT_CTRL, KEY_PAGE_DOWN));
    }

    #[test]
    fn modifier_is_a_bitmask() {
        // Left Alt + Left GUI
        let cmd = ConfigCommand::parse(b"N:12:79").unwrap();
        assert_eq!(
            cmd.binding,
            KeyBinding::new(MOD_LEFT_ALT | MOD_LEFT_GUI, KEY_RIGHT_ARROW)
        );
    }

    #[test]
    fn accepts_byte_bounds() {
        let cmd = ConfigCommand::parse(b"N:255:0").unwrap();
        assert_eq!(cmd.binding, KeyBinding::new(255, 0));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let cmd = ConfigCommand::parse(b"P:2:80\r\n").unwrap();
        assert_eq!(cmd.binding, KeyBinding::new(2, 80));
        let cmd = ConfigCommand::parse(b"N: 4 : 75").unwrap();
        assert_eq!(cmd.binding, KeyBinding::new(4, 75));
    }

    #[test]
    fn rejects_malformed_commands() {
        for raw in [
            &b"N:abc:12"[..],
            b"X:1:2",
            b"N:1",
            b"N:",
            b"N::",
            b"N:1:",
            b":1:2",
            b"n:1:2",
            b"NP:1:2",
            b"N:1:2:3",
            b"N:256:1",
            b"N:1:300",
            b"N:-1:2",
            b"N:+1:2",
            b"",
            b"N10:20",
        ] {
            assert_eq!(ConfigCommand::parse(raw), None, "accepted {:?}", raw);
        }
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(ConfigCommand::parse(&[b'N', b':', 0xFF, b':', b'1']), None);
    }
}
