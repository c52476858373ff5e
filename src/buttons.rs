//! GPIO button input with async debouncing.
//!
//! Two active-low buttons with internal pull-ups, NEXT and PREV. Each is
//! served by its own task that waits for a falling edge, debounces it and
//! posts `SessionEvent::ButtonPressed` to the session. The per-slot
//! lockout lives in the session, not here.

use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{Duration, Timer};
use pageturn::config::BUTTON_DEBOUNCE_MS;
use pageturn::keymap::Slot;
use pageturn::session::SessionEvent;

use crate::ble::EVENTS;

#[embassy_executor::task(pool_size = 2)]
pub async fn button_task(pin: AnyPin, slot: Slot) -> ! {
    let mut btn = Input::new(pin, Pull::Up);

    // A wake press may still be held when the task starts.
    if btn.is_low() {
        btn.wait_for_high().await;
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
    }

    loop {
        btn.wait_for_falling_edge().await;

        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        if btn.is_low() {
            info!("Button: {}", slot);
            EVENTS.send(SessionEvent::ButtonPressed(slot)).await;

            // Wait for release to avoid repeat triggers.
            btn.wait_for_rising_edge().await;
            Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
        }
    }
}
