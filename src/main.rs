//! pageturn - two-button BLE slide remote firmware for nRF52840.
//!
//! Boot sequence:
//!   1. Capture the wake status (RESETREAS + GPIO LATCH) before
//!      `embassy_nrf::init`, whose GPIOTE setup clears the latch.
//!   2. Decide the operating mode from the NEXT button (held = setup).
//!   3. Enable the SoftDevice under the mode's name and address.
//!   4. Load bindings (and bonds in Normal mode) from flash.
//!   5. Run the link runner and the session task side by side until the
//!      sleep policy fires, then tear down, persist and enter System OFF.
//!
//! Target: nRF52840 with SoftDevice S140 v7.x

#![no_std]
#![no_main]

mod battery;
mod ble;
mod buttons;
mod power;
mod storage;

use defmt::{error, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_futures::select::{select3, Either3};
use embassy_nrf::gpio::{Input, Pin as _, Pull};
use embassy_nrf::interrupt::Priority;
use embassy_nrf::saadc::Input as _;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use nrf_softdevice::{Flash, Softdevice};
use pageturn::config::{KEY_HOLD_MS, MODE_SELECT_POLL_MS, SESSION_TICK_MS};
use pageturn::error::{BleError, Error};
use pageturn::hid::{press_binding, KeyboardEmulator};
use pageturn::keymap::{KeyBinding, Slot};
use pageturn::mode::{ModeSelector, OperatingMode};
use pageturn::power_logic::{SleepDecision, Teardown};
use pageturn::session::{
    Effect, Effects, LinkFlavor, NormalSession, Session, SessionEvent, SetupSession,
};
use pageturn::store::{self, BindingStore};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::battery::BatteryMonitor;
use crate::ble::advertise::{
    KEYBOARD_ADV, KEYBOARD_SCAN, NOTIFIER_ADV, NOTIFIER_SCAN, SETUP_ADV, SETUP_SCAN,
};
use crate::ble::bonder::{Bonder, BONDS_CHANGED};
use crate::ble::keyboard::{BleKeyboard, KeyboardServer};
use crate::ble::notifier::NotifierServer;
use crate::ble::setup::SetupServer;
use crate::ble::{BleCommand, Readvertise, BLE_COMMANDS, EVENTS, SHUTDOWN_DONE};
use crate::storage::FlashStore;

/// Longest wait for the radio to go quiet before System OFF.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// GATT server registered for this boot.
#[derive(Clone, Copy)]
enum Servers {
    Keyboard(&'static KeyboardServer),
    Notifier(&'static NotifierServer),
    Setup(&'static SetupServer),
}

/// Whatever is on the other end of the session's effects.
enum Frontend<'a> {
    Keyboard(BleKeyboard<'a>),
    Notifier(&'a NotifierServer),
    Setup,
}

impl Frontend<'_> {
    fn advertise(&mut self) {
        let res = match self {
            Frontend::Keyboard(kb) => kb.begin(),
            Frontend::Notifier(_) | Frontend::Setup => request(BleCommand::Advertise),
        };
        if let Err(e) = res {
            warn!("BLE: advertise request failed: {}", e);
        }
    }

    fn teardown(&mut self, teardown: Teardown) {
        let res = match (teardown, self) {
            (Teardown::StopKeyboard, Frontend::Keyboard(kb)) => kb.end(),
            _ => request(BleCommand::Shutdown),
        };
        if let Err(e) = res {
            warn!("BLE: shutdown request failed: {}", e);
        }
    }
}

fn request(command: BleCommand) -> Result<(), Error> {
    BLE_COMMANDS
        .try_send(command)
        .map_err(|_| Error::Ble(BleError::AdvertiseFailed))
}

/// Everything the session task drives.
struct Driver<'a> {
    frontend: Frontend<'a>,
    battery: BatteryMonitor,
    store: FlashStore<Flash>,
    bonder: Option<&'static Bonder>,
}

impl Driver<'_> {
    async fn apply<S: Session>(&mut self, session: &mut S, effect: Effect) {
        match effect {
            Effect::SendKey(binding) => {
                let Frontend::Keyboard(kb) = &mut self.frontend else {
                    return;
                };
                info!("Key: mod={:#04x} code={:#04x}", binding.modifier, binding.keycode);
                if let Err(e) = press_binding(kb, binding) {
                    warn!("Key: press failed: {}", e);
                }
                Timer::after_millis(KEY_HOLD_MS).await;
                if let Err(e) = kb.release_all() {
                    warn!("Key: release failed: {}", e);
                }
            }
            Effect::NotifyButton(slot) => {
                if let Frontend::Notifier(server) = &self.frontend {
                    if let Err(e) = server.notify_button(slot) {
                        warn!("NOTIFIER: button notify failed: {}", e);
                    }
                }
            }
            Effect::PushBattery => {
                let percent = self.battery.percent().await;
                let res = match &mut self.frontend {
                    Frontend::Keyboard(kb) => {
                        let connected = kb.is_connected();
                        kb.set_battery_level(percent, connected)
                    }
                    Frontend::Notifier(server) => server.push_battery(percent),
                    Frontend::Setup => Ok(()),
                };
                if let Err(e) = res {
                    warn!("Battery: push failed: {}", e);
                }
            }
            Effect::PersistBinding(slot, binding) => {
                let ok = self.persist_binding(slot, binding).await;
                session.mark_persisted(slot, ok);
            }
            Effect::RestartAdvertising => self.frontend.advertise(),
        }
    }

    async fn persist_binding(&mut self, slot: Slot, binding: KeyBinding) -> bool {
        match BindingStore::new(&mut self.store).save(slot, binding).await {
            Ok(()) => {
                info!("Binding {} saved: {}", slot, binding);
                true
            }
            Err(e) => {
                error!("Binding {} not saved: {}", slot, e);
                false
            }
        }
    }

    async fn persist_bonds(&mut self) {
        let Some(bonder) = self.bonder else {
            return;
        };
        let Some(mut bonds) = bonder.take_unsaved() else {
            return;
        };
        match store::save_bonds(&mut self.store, &mut bonds).await {
            Ok(()) => info!("Bonds saved ({} host(s))", bonds.len()),
            Err(e) => {
                error!("Bonds not saved: {}", e);
                bonder.mark_unsaved();
            }
        }
    }

    async fn run_effects<S: Session>(&mut self, session: &mut S, effects: Effects) {
        for effect in effects {
            self.apply(session, effect).await;
        }
    }

    /// Session task: events, ticks and the sleep policy. Ends in System OFF.
    async fn run<S: Session>(&mut self, mut session: S) -> ! {
        self.frontend.advertise();
        let effects = session.start(now_ms());
        self.run_effects(&mut session, effects).await;

        loop {
            match select3(
                EVENTS.receive(),
                BONDS_CHANGED.wait(),
                Timer::after_millis(SESSION_TICK_MS),
            )
            .await
            {
                Either3::First(event) => {
                    match &event {
                        SessionEvent::Connected => info!("Session: host connected"),
                        SessionEvent::Disconnected => info!("Session: host disconnected"),
                        _ => {}
                    }
                    let is_write = matches!(event, SessionEvent::ConfigWrite(_));
                    let effects = session.on_event(event, now_ms());
                    if is_write && effects.is_empty() {
                        warn!("SETUP: command ignored");
                    }
                    self.run_effects(&mut session, effects).await;
                }
                Either3::Second(()) => self.persist_bonds().await,
                Either3::Third(()) => {
                    let effects = session.tick(now_ms());
                    self.run_effects(&mut session, effects).await;
                }
            }

            if session.evaluate_sleep(now_ms()) == SleepDecision::EnterDeepSleep {
                break;
            }
        }

        info!(
            "Session: idle for {} ms, going to sleep",
            session.state().activity.idle_for(now_ms())
        );
        self.sleep(&mut session).await
    }

    async fn sleep<S: Session>(&mut self, session: &mut S) -> ! {
        let teardown = session.on_sleep_requested();
        info!("Sleep: teardown {}", teardown);
        self.frontend.teardown(teardown);
        if with_timeout(SHUTDOWN_WAIT, SHUTDOWN_DONE.wait()).await.is_err() {
            warn!("Sleep: radio still busy: {}", Error::Timeout);
        }

        for slot in Slot::ALL {
            if session.state().is_dirty(slot) {
                let binding = session.state().bindings.get(slot);
                let ok = self.persist_binding(slot, binding).await;
                session.mark_persisted(slot, ok);
            }
        }
        self.persist_bonds().await;

        power::arm_wake_pins();
        power::enter_system_off()
    }
}

/// Sample NEXT until the mode is decided.
async fn select_mode(next: &Input<'_>) -> OperatingMode {
    let mut selector = ModeSelector::new();
    // Let the pull-up charge the line
    Timer::after_millis(1).await;
    loop {
        if let Some(mode) = selector.sample(next.is_low(), now_ms()) {
            return mode;
        }
        Timer::after_millis(MODE_SELECT_POLL_MS).await;
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Before `embassy_nrf::init`: GPIOTE init writes all ones to P0.LATCH
    let wake_status = power::read_wake_status();
    info!("pageturn starting");

    // SoftDevice reserves priorities 0, 1 and 4
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let mut p = embassy_nrf::init(nrf_config);

    let mode = {
        let next = Input::new(&mut p.P0_11, Pull::Up);
        select_mode(&next).await
    };
    let wake = mode.wake_cause(wake_status);
    let flavor = if cfg!(feature = "notifier") {
        LinkFlavor::Notifier
    } else {
        LinkFlavor::Keyboard
    };
    info!("Mode: {} wake={} flavor={}", mode, wake, flavor);

    // Identity
    let identity = mode.identity(ble::factory_address(), flavor == LinkFlavor::Notifier);
    let sd = Softdevice::enable(&ble::softdevice_config(identity.name));
    ble::apply_identity(sd, &identity);

    // Services have to be registered before the SoftDevice task starts
    static KEYBOARD_SERVER: StaticCell<KeyboardServer> = StaticCell::new();
    static NOTIFIER_SERVER: StaticCell<NotifierServer> = StaticCell::new();
    static SETUP_SERVER: StaticCell<SetupServer> = StaticCell::new();
    let servers = match (mode, flavor) {
        (OperatingMode::Configuration, _) => {
            Servers::Setup(SETUP_SERVER.init(unwrap!(SetupServer::new(sd))))
        }
        (OperatingMode::Normal, LinkFlavor::Notifier) => {
            Servers::Notifier(NOTIFIER_SERVER.init(unwrap!(NotifierServer::new(sd))))
        }
        (OperatingMode::Normal, LinkFlavor::Keyboard) => {
            Servers::Keyboard(KEYBOARD_SERVER.init(unwrap!(KeyboardServer::new(sd))))
        }
    };

    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(ble::softdevice_task(sd)));

    // Persisted settings
    let mut flash_store = FlashStore::new(Flash::take(sd));
    let bindings = BindingStore::new(&mut flash_store).load().await;
    info!("Bindings: next={} prev={}", bindings.next, bindings.prev);

    static BONDER: StaticCell<Bonder> = StaticCell::new();
    let bonder: Option<&'static Bonder> = match servers {
        Servers::Keyboard(_) => {
            let bonds = store::load_bonds(&mut flash_store).await;
            info!("Bonds: {} host(s)", bonds.len());
            Some(BONDER.init(Bonder::new(bonds)))
        }
        Servers::Notifier(_) | Servers::Setup(_) => None,
    };

    let battery = BatteryMonitor::new(p.SAADC, p.P0_02.degrade_saadc()).await;

    unwrap!(spawner.spawn(buttons::button_task(p.P0_11.degrade(), Slot::Next)));
    unwrap!(spawner.spawn(buttons::button_task(p.P0_12.degrade(), Slot::Prev)));

    let now = now_ms();
    match servers {
        Servers::Keyboard(server) => {
            let mut driver = Driver {
                frontend: Frontend::Keyboard(BleKeyboard::new(server)),
                battery,
                store: flash_store,
                bonder,
            };
            let session = NormalSession::new(bindings, wake, flavor, now);
            let link = ble::run_link(
                sd,
                server,
                &KEYBOARD_ADV,
                &KEYBOARD_SCAN,
                bonder,
                Readvertise::Always,
                |_| {},
            );
            join(link, driver.run(session)).await;
        }
        Servers::Notifier(server) => {
            let mut driver = Driver {
                frontend: Frontend::Notifier(server),
                battery,
                store: flash_store,
                bonder: None,
            };
            let session = NormalSession::new(bindings, wake, flavor, now);
            let link = ble::run_link(
                sd,
                server,
                &NOTIFIER_ADV,
                &NOTIFIER_SCAN,
                None,
                Readvertise::OnRequest,
                ble::notifier::on_event,
            );
            join(link, driver.run(session)).await;
        }
        Servers::Setup(server) => {
            let mut driver = Driver {
                frontend: Frontend::Setup,
                battery,
                store: flash_store,
                bonder: None,
            };
            let session = SetupSession::new(bindings, now);
            let link = ble::run_link(
                sd,
                server,
                &SETUP_ADV,
                &SETUP_SCAN,
                None,
                Readvertise::OnRequest,
                ble::setup::on_event,
            );
            join(link, driver.run(session)).await;
        }
    }
}
