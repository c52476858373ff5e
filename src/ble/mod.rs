//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role.
//! Exactly one identity is on air per boot:
//!
//! 1. **Keyboard** - HID-over-GATT keyboard plus battery service
//!    (Normal mode).
//! 2. **Notifier** - companion-app service with button and battery
//!    notifications (Normal mode, `notifier` feature).
//! 3. **Setup** - configuration service accepting `N:`/`P:` rebind
//!    commands (Configuration mode).
//!
//! Link events reach the session task through `EVENTS`; the session
//! steers advertising with `BLE_COMMANDS`.

pub mod advertise;
pub mod bonder;
pub mod keyboard;
pub mod notifier;
pub mod setup;

use core::cell::RefCell;
use core::mem;

use defmt::{debug, info, warn, Format};
use embassy_futures::select::{select, Either};
use embassy_nrf::pac;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use nrf_softdevice::ble::gatt_server::{self, Server};
use nrf_softdevice::ble::peripheral::{self, ConnectableAdvertisement};
use nrf_softdevice::ble::security::SecurityHandler;
use nrf_softdevice::ble::{set_address, Address, AddressType, Connection};
use nrf_softdevice::{raw, Config, Softdevice};
use pageturn::config::BLE_ADV_INTERVAL;
use pageturn::mode::RadioIdentity;
use pageturn::session::SessionEvent;

use self::bonder::Bonder;

/// Events for the session task (link edges, button presses, config writes).
pub static EVENTS: Channel<CriticalSectionRawMutex, SessionEvent, 8> = Channel::new();

/// Commands from the session task to the link runner.
pub static BLE_COMMANDS: Channel<CriticalSectionRawMutex, BleCommand, 2> = Channel::new();

/// Raised by the link runner once the radio is quiet after `Shutdown`.
pub static SHUTDOWN_DONE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// The active host link, if any.
static LINK: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    BlockingMutex::new(RefCell::new(None));

/// Commands that the session task can send to the link runner.
#[derive(Clone, Copy, PartialEq, Eq, Format)]
pub enum BleCommand {
    /// Start (or resume) advertising.
    Advertise,
    /// Drop the link, stop advertising and stay quiet.
    Shutdown,
}

/// Whether the runner advertises again on its own after a disconnect.
#[derive(Clone, Copy, PartialEq, Eq, Format)]
pub enum Readvertise {
    /// Re-advertise immediately (keyboard).
    Always,
    /// Wait for `BleCommand::Advertise` (custom GATT services).
    OnRequest,
}

/// SoftDevice configuration for a single peripheral link.
pub fn softdevice_config(device_name: &'static str) -> Config {
    Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: 1024,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: device_name.as_ptr() as _,
            current_len: device_name.len() as u16,
            max_len: device_name.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        conn_gatts: Some(raw::ble_gatts_conn_cfg_t {
            hvn_tx_queue_size: 4,
        }),
        ..Default::default()
    }
}

/// Factory random-static address from FICR, as the SoftDevice would use it.
pub fn factory_address() -> [u8; 6] {
    let lo = pac::FICR.deviceaddr(0).read().to_le_bytes();
    let hi = pac::FICR.deviceaddr(1).read().to_le_bytes();
    // Random-static addresses have the two top bits set
    [lo[0], lo[1], lo[2], lo[3], hi[0], hi[1] | 0xC0]
}

/// Put the session's identity on the radio.
pub fn apply_identity(sd: &Softdevice, identity: &RadioIdentity) {
    set_address(sd, &Address::new(AddressType::RandomStatic, identity.address));
    info!("BLE: identity \"{}\" {:02x}", identity.name, identity.address);
}

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    // Enable dcdc-mode, reduce power consumption
    unsafe {
        raw::sd_power_dcdc_mode_set(raw::NRF_POWER_DCDC_MODES_NRF_POWER_DCDC_ENABLE as u8);
    }
    sd.run().await
}

/// The current host link, if one is up.
pub fn current_link() -> Option<Connection> {
    LINK.lock(|link| link.borrow().clone())
}

/// Queue an event for the session task without blocking a callback.
pub fn post(event: SessionEvent) {
    if EVENTS.try_send(event).is_err() {
        warn!("BLE: session event queue full, event dropped");
    }
}

fn link_up(conn: &Connection) {
    LINK.lock(|link| *link.borrow_mut() = Some(conn.clone()));
    post(SessionEvent::Connected);
}

fn link_down() {
    LINK.lock(|link| link.borrow_mut().take());
    post(SessionEvent::Disconnected);
}

async fn shutdown_requested() {
    loop {
        match BLE_COMMANDS.receive().await {
            BleCommand::Shutdown => return,
            BleCommand::Advertise => debug!("BLE: already advertising or connected"),
        }
    }
}

/// Advertise, serve one host at a time, repeat.
///
/// Nothing goes on air before the first `BleCommand::Advertise`. Returns
/// after `BleCommand::Shutdown` once the link is down, with
/// `SHUTDOWN_DONE` raised.
pub async fn run_link<S: Server>(
    sd: &'static Softdevice,
    server: &S,
    adv_data: &[u8],
    scan_data: &[u8],
    bonder: Option<&'static Bonder>,
    readvertise: Readvertise,
    mut on_event: impl FnMut(S::Event),
) {
    let mut advertise = BLE_COMMANDS.receive().await == BleCommand::Advertise;

    while advertise {
        let mut config = peripheral::Config::default();
        config.interval = BLE_ADV_INTERVAL;
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data,
            scan_data,
        };

        let advertising = async {
            match bonder {
                Some(bonder) => peripheral::advertise_pairable(sd, adv, &config, bonder).await,
                None => peripheral::advertise_connectable(sd, adv, &config).await,
            }
        };

        let conn = match select(advertising, shutdown_requested()).await {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(e)) => {
                warn!("BLE: advertise error: {:?}", e);
                // Retry after 200 ms
                Timer::after_millis(200).await;
                continue;
            }
            Either::Second(()) => break,
        };

        info!("BLE: connected to {}", conn.peer_address());
        if let Some(bonder) = bonder {
            bonder.load_sys_attrs(&conn);
        }
        link_up(&conn);

        let serving = gatt_server::run(&conn, server, &mut on_event);
        let shutdown = match select(serving, shutdown_requested()).await {
            Either::First(reason) => {
                info!("BLE: disconnected: {:?}", reason);
                false
            }
            Either::Second(()) => {
                if conn.disconnect().is_err() {
                    debug!("BLE: link already gone");
                }
                true
            }
        };

        if let Some(bonder) = bonder {
            bonder.save_sys_attrs(&conn);
        }
        link_down();

        advertise = !shutdown
            && match readvertise {
                Readvertise::Always => true,
                Readvertise::OnRequest => BLE_COMMANDS.receive().await == BleCommand::Advertise,
            };
    }

    info!("BLE: radio quiet");
    SHUTDOWN_DONE.signal(());
}
