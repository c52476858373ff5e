//! Battery level estimation from raw SAADC samples.
//!
//! The cell is read through a resistor divider at 12-bit resolution and
//! mapped linearly between `BATTERY_EMPTY_MV` (0 %) and
//! `BATTERY_FULL_MV` (100 %).

use crate::config::{
    ADC_FULL_SCALE_MV, ADC_MAX_RAW, BATTERY_DIVIDER_DEN, BATTERY_DIVIDER_NUM, BATTERY_EMPTY_MV,
    BATTERY_FULL_MV,
};

/// Average a burst of raw samples. Negative readings (input slightly
/// below ground) count as zero. An empty burst averages to zero.
pub fn average_raw(samples: &[i16]) -> u16 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u32 = samples.iter().map(|&s| s.max(0) as u32).sum();
    (sum / samples.len() as u32) as u16
}

/// Cell voltage in millivolts for an averaged raw reading.
pub fn millivolts_from_raw(raw: u16) -> u32 {
    let pin_mv = raw as u32 * ADC_FULL_SCALE_MV / ADC_MAX_RAW;
    pin_mv * BATTERY_DIVIDER_NUM / BATTERY_DIVIDER_DEN
}

/// Linear state of charge, clamped to `0..=100`.
pub fn percent_from_millivolts(mv: u32) -> u8 {
    if mv >= BATTERY_FULL_MV {
        return 100;
    }
    if mv <= BATTERY_EMPTY_MV {
        return 0;
    }
    ((mv - BATTERY_EMPTY_MV) * 100 / (BATTERY_FULL_MV - BATTERY_EMPTY_MV)) as u8
}

/// Samples in, percentage out.
pub fn battery_percent(samples: &[i16]) -> u8 {
    percent_from_millivolts(millivolts_from_raw(average_raw(samples)))
}
