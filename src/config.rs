//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

// Power / sleep policy

/// Inactivity timeout before deep sleep in normal mode (ms).
pub const SLEEP_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Idle time allowed without a host link before deep sleep (ms).
pub const DISCONNECTED_GRACE_MS: u64 = 2 * 60 * 1000;

/// Inactivity timeout in configuration mode (ms).
pub const SETUP_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Session loop tick - how often sleep eligibility and deferred work are checked (ms).
pub const SESSION_TICK_MS: u64 = 100;

// Buttons

/// Time the NEXT button must stay held at boot to enter configuration mode (ms).
/// Longer than a normal wake tap, which the first read usually catches.
pub const MODE_SELECT_DEBOUNCE_MS: u64 = 500;

/// Poll interval while sampling the mode-select button (ms).
pub const MODE_SELECT_POLL_MS: u64 = 10;

/// Edge debounce inside the button tasks (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 20;

/// Lockout after a live press before the same button may fire again (ms).
pub const BUTTON_LOCKOUT_MS: u64 = 300;

// GPIO pin assignments (nRF52840-DK defaults, port 0)
//
// The numbers are needed at register level to arm the SENSE wake-up in
// System OFF; the typed `embassy_nrf::peripherals::*` pins that match them
// are picked in `main.rs`.  Adjust both for a custom PCB.
//
//   Button NEXT  → P0.11 (active-low, internal pull-up)
//   Button PREV  → P0.12 (active-low, internal pull-up)
//   Battery sense → P0.02 / AIN0 (through a resistor divider)

/// Port-0 pin number of the NEXT button.
pub const NEXT_BUTTON_PIN: usize = 11;

/// Port-0 pin number of the PREV button.
pub const PREV_BUTTON_PIN: usize = 12;

// Keyboard emulation

/// Stabilization delay after link-up before a deferred key is sent (ms).
/// HID hosts drop input reports that arrive while they finish link setup.
pub const LINK_STABILIZE_MS: u64 = 500;

/// Minimum time a key combination is held before release (ms).
pub const KEY_HOLD_MS: u64 = 50;

// Battery

/// Number of ADC samples averaged per reading.
pub const BATTERY_SAMPLES: usize = 10;

/// Pause between two ADC samples (ms).
pub const BATTERY_SAMPLE_GAP_MS: u64 = 5;

/// Cell voltage reported as 0 % (mV).
pub const BATTERY_EMPTY_MV: u32 = 3300;

/// Cell voltage reported as 100 % (mV).
pub const BATTERY_FULL_MV: u32 = 4200;

/// SAADC full-scale input: 0.6 V internal reference with gain 1/6 (mV).
pub const ADC_FULL_SCALE_MV: u32 = 3600;

/// Maximum raw value at 12-bit resolution.
pub const ADC_MAX_RAW: u32 = 4095;

/// Resistor divider ratio between the cell and the ADC pin, as a fraction.
pub const BATTERY_DIVIDER_NUM: u32 = 243;
pub const BATTERY_DIVIDER_DEN: u32 = 100;

/// Interval between battery notifications in the notifier build (ms).
pub const BATTERY_NOTIFY_INTERVAL_MS: u64 = 5000;

// BLE

/// Advertised name of the HID keyboard identity.
pub const KEYBOARD_NAME: &str = "PageTurn Remote";

/// Advertised name of the configuration identity.
pub const SETUP_NAME: &str = "PageTurn SETUP";

/// Advertised name of the companion-app notifier identity (the app scans for it).
pub const NOTIFIER_NAME: &str = "Remote-Switch";

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const BLE_ADV_INTERVAL: u32 = 160;

/// Largest configuration write accepted from the GATT characteristic (bytes).
pub const CONFIG_WRITE_MAX: usize = 32;

/// Configuration service UUID `4fafc201-1fb5-459e-8fcc-c5c9c331914b`, little-endian.
pub const SETUP_SERVICE_UUID_LE: [u8; 16] = [
    0x4b, 0x91, 0x31, 0xc3, 0xc9, 0xc5, 0xcc, 0x8f, 0x9e, 0x45, 0xb5, 0x1f, 0x01, 0xc2, 0xaf, 0x4f,
];

/// Notifier service UUID `12345678-1234-1234-1234-1234567890ab`, little-endian.
pub const NOTIFIER_SERVICE_UUID_LE: [u8; 16] = [
    0xab, 0x90, 0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12,
];

// Persistent storage

/// Maximum number of bonded hosts kept in flash.
pub const MAX_BONDED_HOSTS: usize = 2;

/// Flash page index where key/value storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 250;

/// Number of flash pages reserved for key/value storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 2;
