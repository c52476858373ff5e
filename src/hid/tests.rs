//! Unit tests for keyboard report building and the emulator seam.
//!
//! These tests run on the host (not embedded) and drive a recording
//! emulator in place of the SoftDevice HID service.

use super::keyboard::{Key, KeyboardReport};
use super::{press_binding, KeyboardEmulator};
use crate::keymap::{KeyBinding, KEY_DOWN_ARROW, KEY_PAGE_DOWN, MOD_LEFT_CTRL, MOD_LEFT_SHIFT};

/// Records every report that would go out over the air.
#[derive(Default)]
struct Recorder {
    report: KeyboardReport,
    sent: heapless::Vec<[u8; 8], 8>,
    battery: Option<(u8, bool)>,
    connected: bool,
}

impl Recorder {
    fn send(&mut self) -> Result<(), ()> {
        let mut buf = [0u8; 8];
        self.report.serialize(&mut buf);
        self.sent.push(buf).map_err(|_| ())
    }
}

impl KeyboardEmulator for Recorder {
    type Error = ();

    fn begin(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn end(&mut self) -> Result<(), ()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn press(&mut self, key: Key) -> Result<(), ()> {
        self.report.press(key);
        self.send()
    }

    fn release_all(&mut self) -> Result<(), ()> {
        self.report.release_all();
        self.send()
    }

    fn set_battery_level(&mut self, percent: u8, notify: bool) -> Result<(), ()> {
        self.battery = Some((percent, notify));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Keyboard Report Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn keyboard_report_empty() {
    let report = KeyboardReport::empty();
    assert!(report.is_empty());
    assert_eq!(report.modifier, 0);
    assert_eq!(report.keycodes, [0; 6]);
}

#[test]
fn keyboard_report_press_modifier_then_key() {
    let mut report = KeyboardReport::empty();
    assert!(report.press(Key::Modifier(MOD_LEFT_CTRL)));
    assert!(report.press(Key::Usage(KEY_PAGE_DOWN)));

    let mut buf = [0u8; 8];
    assert_eq!(report.serialize(&mut buf), 8);
    assert_eq!(buf, [0x01, 0x00, 0x4E, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn keyboard_report_press_is_idempotent() {
    let mut report = KeyboardReport::empty();
    assert!(report.press(Key::Usage(0x04)));
    assert!(!report.press(Key::Usage(0x04)));
    assert!(report.press(Key::Modifier(MOD_LEFT_SHIFT)));
    assert!(!report.press(Key::Modifier(MOD_LEFT_SHIFT)));
    assert_eq!(report.keycodes, [0x04, 0, 0, 0, 0, 0]);
}

#[test]
fn keyboard_report_usage_zero_is_no_event() {
    let mut report = KeyboardReport::empty();
    assert!(!report.press(Key::Usage(0)));
    assert!(report.is_empty());
}

#[test]
fn keyboard_report_seventh_key_dropped() {
    let mut report = KeyboardReport::empty();
    for code in 0x04..0x0A {
        assert!(report.press(Key::Usage(code)));
    }
    assert!(!report.press(Key::Usage(0x0A)));
    assert_eq!(report.keycodes, [0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
}

#[test]
fn keyboard_report_release_all_clears_everything() {
    let mut report = KeyboardReport::empty();
    report.press(Key::Modifier(0xFF));
    report.press(Key::Usage(0x28));
    report.release_all();
    assert!(report.is_empty());
}

#[test]
fn keyboard_report_serialize_buffer_too_small() {
    let report = KeyboardReport::empty();
    let mut buf = [0u8; 4];
    assert_eq!(report.serialize(&mut buf), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Emulator Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn press_binding_sends_modifier_before_key() {
    let mut kb = Recorder::default();
    press_binding(&mut kb, KeyBinding::new(MOD_LEFT_CTRL, KEY_PAGE_DOWN)).unwrap();
    kb.release_all().unwrap();

    assert_eq!(
        kb.sent.as_slice(),
        &[
            [0x01, 0, 0, 0, 0, 0, 0, 0],
            [0x01, 0, 0x4E, 0, 0, 0, 0, 0],
            [0x00, 0, 0, 0, 0, 0, 0, 0],
        ]
    );
}

#[test]
fn press_binding_without_modifier_sends_key_only() {
    let mut kb = Recorder::default();
    press_binding(&mut kb, KeyBinding::new(0, KEY_DOWN_ARROW)).unwrap();

    assert_eq!(kb.sent.as_slice(), &[[0x00, 0, 0x51, 0, 0, 0, 0, 0]]);
}

#[test]
fn press_binding_propagates_emulator_error() {
    let mut kb = Recorder::default();
    // Fill the recorder so the next send fails.
    for _ in 0..8 {
        kb.send().unwrap();
    }
    assert_eq!(press_binding(&mut kb, KeyBinding::DEFAULT_NEXT), Err(()));
}

#[test]
fn battery_level_is_forwarded() {
    let mut kb = Recorder::default();
    kb.set_battery_level(87, true).unwrap();
    assert_eq!(kb.battery, Some((87, true)));
    assert!(!kb.is_connected());
}
