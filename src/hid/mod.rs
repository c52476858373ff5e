//! Keyboard emulation: report types and the emulator seam.

pub mod keyboard;

#[cfg(test)]
mod tests;

pub use keyboard::{Key, KeyboardReport};

use crate::keymap::KeyBinding;

/// A BLE keyboard the firmware can drive.
///
/// Implemented on target by the SoftDevice HID service and in tests by
/// a recorder.
pub trait KeyboardEmulator {
    type Error;

    /// Start advertising as a keyboard.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Drop the host link and stop advertising.
    fn end(&mut self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    /// Add `key` to the held set and send the resulting report.
    fn press(&mut self, key: Key) -> Result<(), Self::Error>;

    /// Release everything and send an empty report.
    fn release_all(&mut self) -> Result<(), Self::Error>;

    /// Update the battery level, notifying the host when `notify` is set.
    fn set_battery_level(&mut self, percent: u8, notify: bool) -> Result<(), Self::Error>;
}

/// Key-down half of a binding: modifier first (if any), then the key.
///
/// The caller holds for `KEY_HOLD_MS` and then calls
/// [`KeyboardEmulator::release_all`].
pub fn press_binding<K: KeyboardEmulator>(kb: &mut K, binding: KeyBinding) -> Result<(), K::Error> {
    if binding.modifier != 0 {
        kb.press(Key::Modifier(binding.modifier))?;
    }
    kb.press(Key::Usage(binding.keycode))
}
