//! Battery voltage through the SAADC.
//!
//! The cell sits behind a divider on AIN0. Default channel settings
//! (gain 1/6, 0.6 V reference) give a 3.6 V full scale at 12 bits.

use defmt::debug;
use embassy_nrf::bind_interrupts;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::peripherals::SAADC;
use embassy_nrf::saadc::{self, AnyInput, ChannelConfig, Input as _, Resolution, Saadc};
use embassy_time::Timer;
use pageturn::battery_logic;
use pageturn::config::{BATTERY_SAMPLES, BATTERY_SAMPLE_GAP_MS};

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

pub struct BatteryMonitor {
    adc: Saadc<'static, 1>,
}

impl BatteryMonitor {
    pub async fn new(adc: SAADC, pin: AnyInput) -> Self {
        let mut config = saadc::Config::default();
        config.resolution = Resolution::_12BIT;
        let channel = ChannelConfig::single_ended(pin.degrade_saadc());
        // Below the SoftDevice's reserved priorities
        interrupt::SAADC.set_priority(Priority::P3);
        let adc = Saadc::new(adc, Irqs, config, [channel]);
        adc.calibrate().await;
        Self { adc }
    }

    /// Averaged battery level in percent.
    pub async fn percent(&mut self) -> u8 {
        let mut samples = [0i16; BATTERY_SAMPLES];
        for sample in samples.iter_mut() {
            let mut buf = [0i16; 1];
            self.adc.sample(&mut buf).await;
            *sample = buf[0];
            Timer::after_millis(BATTERY_SAMPLE_GAP_MS).await;
        }

        let raw = battery_logic::average_raw(&samples);
        let mv = battery_logic::millivolts_from_raw(raw);
        let percent = battery_logic::percent_from_millivolts(mv);
        debug!("Battery: raw={} {}mV {}%", raw, mv, percent);
        percent
    }
}
