//! Sleep policy and wake-cause decoding.
//!
//! Pure functions over millisecond timestamps so the policy can be
//! exercised on the host without a clock.

use crate::config::{DISCONNECTED_GRACE_MS, SETUP_TIMEOUT_MS, SLEEP_TIMEOUT_MS};
use crate::mode::OperatingMode;
use crate::session::ConnectionState;

/// Outcome of one sleep evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepDecision {
    Continue,
    EnterDeepSleep,
}

/// What has to be torn down before System OFF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Teardown {
    /// Stop the keyboard emulator (drop link, stop advertising).
    StopKeyboard,
    /// Shut down the custom GATT server and its advertising.
    ShutdownGattServer,
}

/// Decide whether the device should go to deep sleep.
pub fn evaluate_sleep(
    now_ms: u64,
    last_activity_ms: u64,
    mode: OperatingMode,
    connection: ConnectionState,
) -> SleepDecision {
    let idle_ms = now_ms.saturating_sub(last_activity_ms);

    let sleep = match mode {
        OperatingMode::Configuration => idle_ms >= SETUP_TIMEOUT_MS,
        OperatingMode::Normal => {
            idle_ms >= SLEEP_TIMEOUT_MS
                || (connection == ConnectionState::Disconnected && idle_ms > DISCONNECTED_GRACE_MS)
        }
    };

    if sleep {
        SleepDecision::EnterDeepSleep
    } else {
        SleepDecision::Continue
    }
}

/// Why the chip is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeCause {
    ColdBoot,
    NextButtonWake,
    PrevButtonWake,
}

/// Raw wake status captured once at boot, before anything clears it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeStatus {
    /// RESETREAS.OFF: reset was a wake from System OFF via GPIO DETECT.
    pub from_system_off: bool,
    /// GPIO LATCH snapshot, one bit per port-0 pin.
    pub latch: u32,
}

impl WakeCause {
    /// Map the captured status to a cause. If both pins latched, NEXT wins.
    pub fn from_status(status: WakeStatus, next_pin: usize, prev_pin: usize) -> Self {
        if !status.from_system_off {
            return WakeCause::ColdBoot;
        }
        if status.latch & pin_mask(next_pin) != 0 {
            WakeCause::NextButtonWake
        } else if status.latch & pin_mask(prev_pin) != 0 {
            WakeCause::PrevButtonWake
        } else {
            WakeCause::ColdBoot
        }
    }
}

fn pin_mask(pin: usize) -> u32 {
    if pin < 32 {
        1 << pin
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NEXT_BUTTON_PIN, PREV_BUTTON_PIN};

    const MIN: u64 = 60 * 1000;

    fn wake(from_system_off: bool, latch: u32) -> WakeCause {
        WakeCause::from_status(
            WakeStatus {
                from_system_off,
                latch,
            },
            NEXT_BUTTON_PIN,
            PREV_BUTTON_PIN,
        )
    }

    #[test]
    fn normal_connected_sleeps_after_five_minutes() {
        let c = ConnectionState::Connected;
        assert_eq!(
            evaluate_sleep(5 * MIN - 1, 0, OperatingMode::Normal, c),
            SleepDecision::Continue
        );
        assert_eq!(
            evaluate_sleep(5 * MIN, 0, OperatingMode::Normal, c),
            SleepDecision::EnterDeepSleep
        );
    }

    #[test]
    fn normal_disconnected_grace_is_strict() {
        let d = ConnectionState::Disconnected;
        assert_eq!(
            evaluate_sleep(2 * MIN, 0, OperatingMode::Normal, d),
            SleepDecision::Continue
        );
        assert_eq!(
            evaluate_sleep(2 * MIN + 1, 0, OperatingMode::Normal, d),
            SleepDecision::EnterDeepSleep
        );
    }

    #[test]
    fn configuration_ignores_connection_state() {
        for c in [ConnectionState::Connected, ConnectionState::Disconnected] {
            assert_eq!(
                evaluate_sleep(9 * MIN, 0, OperatingMode::Configuration, c),
                SleepDecision::Continue
            );
            assert_eq!(
                evaluate_sleep(10 * MIN, 0, OperatingMode::Configuration, c),
                SleepDecision::EnterDeepSleep
            );
        }
    }

    #[test]
    fn activity_in_the_future_counts_as_fresh() {
        assert_eq!(
            evaluate_sleep(10, 5000, OperatingMode::Normal, ConnectionState::Disconnected),
            SleepDecision::Continue
        );
    }

    #[test]
    fn wake_cause_requires_system_off_reset() {
        assert_eq!(wake(false, 1 << NEXT_BUTTON_PIN), WakeCause::ColdBoot);
        assert_eq!(wake(true, 1 << NEXT_BUTTON_PIN), WakeCause::NextButtonWake);
        assert_eq!(wake(true, 1 << PREV_BUTTON_PIN), WakeCause::PrevButtonWake);
    }

    #[test]
    fn wake_cause_next_wins_when_both_latched() {
        let both = (1 << NEXT_BUTTON_PIN) | (1 << PREV_BUTTON_PIN);
        assert_eq!(wake(true, both), WakeCause::NextButtonWake);
    }

    #[test]
    fn wake_cause_unknown_latch_is_cold_boot() {
        assert_eq!(wake(true, 0), WakeCause::ColdBoot);
        assert_eq!(wake(true, 1 << 3), WakeCause::ColdBoot);
    }

    #[test]
    fn out_of_range_pin_never_matches() {
        assert_eq!(
            WakeCause::from_status(
                WakeStatus {
                    from_system_off: true,
                    latch: u32::MAX
                },
                40,
                41
            ),
            WakeCause::ColdBoot
        );
    }
}
