//! Boot-time mode selection and per-mode radio identity.
//!
//! Holding NEXT while the device powers up enters configuration mode.
//! The decision is a two-read debounce: one sample at boot, one after
//! `MODE_SELECT_DEBOUNCE_MS`. Samples in between are ignored.
//!
//! A wake from System OFF boots within milliseconds, so the first sample
//! usually lands inside the press that woke the chip. The window is long
//! enough that an ordinary tap is released before the second read.

use crate::config::{
    KEYBOARD_NAME, MODE_SELECT_DEBOUNCE_MS, NEXT_BUTTON_PIN, NOTIFIER_NAME, PREV_BUTTON_PIN,
    SETUP_NAME,
};
use crate::power_logic::{WakeCause, WakeStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    Normal,
    Configuration,
}

/// Cooperative two-read debounce for the mode-select button.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModeSelector {
    first_held_at: Option<u64>,
}

impl ModeSelector {
    pub const fn new() -> Self {
        Self {
            first_held_at: None,
        }
    }

    /// Feed one sample. Returns the mode once it is decided.
    pub fn sample(&mut self, held: bool, now_ms: u64) -> Option<OperatingMode> {
        match self.first_held_at {
            None if !held => Some(OperatingMode::Normal),
            None => {
                self.first_held_at = Some(now_ms);
                None
            }
            Some(t0) if now_ms.saturating_sub(t0) < MODE_SELECT_DEBOUNCE_MS => None,
            Some(_) if held => Some(OperatingMode::Configuration),
            Some(_) => Some(OperatingMode::Normal),
        }
    }
}

/// Name and address the radio presents for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioIdentity {
    pub name: &'static str,
    /// Little-endian BLE address (byte 5 is the most significant).
    pub address: [u8; 6],
}

impl OperatingMode {
    /// Identity for this mode, derived from the chip's factory address.
    pub fn identity(self, factory_address: [u8; 6], notifier: bool) -> RadioIdentity {
        match self {
            OperatingMode::Normal => RadioIdentity {
                name: if notifier { NOTIFIER_NAME } else { KEYBOARD_NAME },
                address: factory_address,
            },
            OperatingMode::Configuration => RadioIdentity {
                name: SETUP_NAME,
                address: setup_address(factory_address),
            },
        }
    }

    /// Wake cause for this boot. Configuration mode never replays a press.
    pub fn wake_cause(self, status: WakeStatus) -> WakeCause {
        match self {
            OperatingMode::Normal => {
                WakeCause::from_status(status, NEXT_BUTTON_PIN, PREV_BUTTON_PIN)
            }
            OperatingMode::Configuration => WakeCause::ColdBoot,
        }
    }
}

/// Random-static address for configuration mode.
///
/// Always differs from the factory address in the lowest byte and keeps
/// the two top bits set, as random-static addresses require. Hosts that
/// bonded with the keyboard never see the setup identity as the same
/// device.
pub fn setup_address(factory_address: [u8; 6]) -> [u8; 6] {
    let mut addr = factory_address;
    addr[0] ^= 0x5A;
    addr[5] |= 0xC0;
    addr
}
