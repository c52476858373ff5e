//! Deep sleep (System OFF) and wake detection.
//!
//! nRF52840 power modes:
//! - System ON: normal operation (~3.5 mA with BLE active)
//! - System ON Idle: CPU sleeping, peripherals active (~1.5 mA)
//! - System OFF: deep sleep, wake on GPIO sense (~0.4 µA)
//!
//! Both buttons are armed with SENSE=LOW before System OFF. With
//! DETECTMODE=LDETECT the pin that woke us is left in `P0.LATCH`, which
//! together with `RESETREAS.OFF` tells a button wake from a cold boot.

use defmt::info;
use embassy_nrf::pac;
use embassy_nrf::pac::gpio::vals::{Detectmode, Dir, Input, Pull, Sense};
use nrf_softdevice::raw;
use pageturn::config::{NEXT_BUTTON_PIN, PREV_BUTTON_PIN};
use pageturn::power_logic::WakeStatus;

/// Read and clear the reset reason and pin latch.
///
/// Must be the first thing `main` does. `embassy_nrf::init` with the
/// `gpiote` feature clears `P0.LATCH`, and once the SoftDevice is enabled
/// it owns POWER.
pub fn read_wake_status() -> WakeStatus {
    let resetreas = pac::POWER.resetreas().read();
    let latch = pac::P0.latch().read();

    // Both registers are write-one-to-clear.
    pac::POWER.resetreas().write_value(resetreas);
    pac::P0.latch().write_value(latch);

    let status = WakeStatus {
        from_system_off: resetreas.off(),
        latch: latch.0,
    };
    info!(
        "Power: resetreas={:#010x} latch={:#010x}",
        resetreas.0, status.latch
    );
    status
}

/// Configure both buttons as System OFF wake sources.
pub fn arm_wake_pins() {
    pac::P0
        .detectmode()
        .write(|w| w.set_detectmode(Detectmode::LDETECT));

    for pin in [NEXT_BUTTON_PIN, PREV_BUTTON_PIN] {
        pac::P0.pin_cnf(pin).write(|w| {
            w.set_dir(Dir::INPUT);
            w.set_input(Input::CONNECT);
            w.set_pull(Pull::PULLUP);
            w.set_sense(Sense::LOW);
        });
    }

    // Start from a clean latch so only the waking pin is recorded.
    let latch = pac::P0.latch().read();
    pac::P0.latch().write_value(latch);
}

/// Enter System OFF through the SoftDevice. Does not return; the next
/// button press resets the chip.
pub fn enter_system_off() -> ! {
    info!("Power: entering System OFF");
    unsafe {
        raw::sd_power_system_off();
    }

    // Only reached under a debugger, where System OFF is emulated.
    loop {
        cortex_m::asm::wfe();
    }
}
