//! Integration tests for pageturn host-testable logic.
//!
//! Each test plays a whole boot: build a session the way the firmware
//! does, feed it events and ticks, and execute its effects against an
//! in-memory store and a recording keyboard.

use embassy_futures::block_on;
use heapless::{LinearMap, Vec};
use pageturn::battery_logic::battery_percent;
use pageturn::config::*;
use pageturn::hid::{press_binding, Key, KeyboardEmulator, KeyboardReport};
use pageturn::keymap::*;
use pageturn::mode::{ModeSelector, OperatingMode};
use pageturn::power_logic::{SleepDecision, Teardown, WakeCause, WakeStatus};
use pageturn::session::*;
use pageturn::store::{BindingStore, KeyValueStore, MAX_VALUE_SIZE};

const SEC: u64 = 1000;
const MIN: u64 = 60 * SEC;

/// Raw SAADC level that maps to 36 %.
const BATTERY_RAW: i16 = 1700;

// ═══════════════════════════════════════════════════════════════════════════
// In-memory collaborators
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemStore {
    items: LinearMap<u8, Vec<u8, MAX_VALUE_SIZE>, 4>,
    fail_writes: bool,
}

impl KeyValueStore for MemStore {
    type Error = ();

    async fn fetch<'a>(&mut self, key: u8, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, ()> {
        match self.items.get(&key) {
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(Some(&buf[..v.len()]))
            }
            None => Ok(None),
        }
    }

    async fn store(&mut self, key: u8, value: &[u8]) -> Result<(), ()> {
        if self.fail_writes {
            return Err(());
        }
        let v = Vec::from_slice(value)?;
        self.items.insert(key, v).map_err(|_| ())?;
        Ok(())
    }
}

#[derive(Default)]
struct Keyboard {
    report: KeyboardReport,
    sent: Vec<[u8; 8], 16>,
    battery: Option<(u8, bool)>,
    connected: bool,
    advertising: bool,
}

impl KeyboardEmulator for Keyboard {
    type Error = ();

    fn begin(&mut self) -> Result<(), ()> {
        self.advertising = true;
        Ok(())
    }

    fn end(&mut self) -> Result<(), ()> {
        self.advertising = false;
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn press(&mut self, key: Key) -> Result<(), ()> {
        if self.report.press(key) {
            let mut buf = [0u8; 8];
            self.report.serialize(&mut buf);
            self.sent.push(buf).map_err(|_| ())?;
        }
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), ()> {
        self.report.release_all();
        self.sent.push([0; 8]).map_err(|_| ())
    }

    fn set_battery_level(&mut self, percent: u8, notify: bool) -> Result<(), ()> {
        self.battery = Some((percent, notify));
        Ok(())
    }
}

/// Executes effects the way the firmware's session task does.
#[derive(Default)]
struct Device {
    kb: Keyboard,
    store: MemStore,
    button_notifications: Vec<u8, 8>,
    battery_pushes: usize,
    readvertised: usize,
}

impl Device {
    fn load_bindings(&mut self) -> Bindings {
        block_on(BindingStore::new(&mut self.store).load())
    }

    fn run<S: Session>(&mut self, session: &mut S, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::SendKey(binding) => {
                    press_binding(&mut self.kb, binding).unwrap();
                    self.kb.release_all().unwrap();
                }
                Effect::NotifyButton(slot) => {
                    self.button_notifications.push(slot.event_code()).unwrap();
                }
                Effect::PushBattery => {
                    self.battery_pushes += 1;
                    let percent = battery_percent(&[BATTERY_RAW; BATTERY_SAMPLES]);
                    let connected = self.kb.is_connected();
                    self.kb.set_battery_level(percent, connected).unwrap();
                }
                Effect::PersistBinding(slot, binding) => {
                    let ok = block_on(BindingStore::new(&mut self.store).save(slot, binding)).is_ok();
                    session.mark_persisted(slot, ok);
                }
                Effect::RestartAdvertising => self.readvertised += 1,
            }
        }
    }

    fn event<S: Session>(&mut self, session: &mut S, event: SessionEvent, now: u64) {
        match event {
            SessionEvent::Connected => self.kb.connected = true,
            SessionEvent::Disconnected => self.kb.connected = false,
            _ => {}
        }
        let effects = session.on_event(event, now);
        self.run(session, effects);
    }

    fn tick<S: Session>(&mut self, session: &mut S, now: u64) {
        let effects = session.tick(now);
        self.run(session, effects);
    }

    /// The pre-sleep path: tear down, then retry unsaved bindings.
    fn sleep<S: Session>(&mut self, session: &mut S) -> Teardown {
        let teardown = session.on_sleep_requested();
        if teardown == Teardown::StopKeyboard {
            self.kb.end().unwrap();
        }
        for slot in Slot::ALL {
            if session.state().is_dirty(slot) {
                let binding = session.state().bindings.get(slot);
                let ok = block_on(BindingStore::new(&mut self.store).save(slot, binding)).is_ok();
                session.mark_persisted(slot, ok);
            }
        }
        teardown
    }
}

fn wake_from(latch: u32) -> WakeCause {
    WakeCause::from_status(
        WakeStatus {
            from_system_off: true,
            latch,
        },
        NEXT_BUTTON_PIN,
        PREV_BUTTON_PIN,
    )
}

fn write(text: &str) -> SessionEvent {
    SessionEvent::ConfigWrite(CommandBuf::from_slice(text.as_bytes()).unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
// Configure, then use
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rebind_over_the_air_then_wake_sends_new_binding() {
    let mut dev = Device::default();

    // Boot 1: NEXT held through the debounce window.
    let mut sel = ModeSelector::new();
    assert_eq!(sel.sample(true, 0), None);
    assert_eq!(
        sel.sample(true, MODE_SELECT_DEBOUNCE_MS),
        Some(OperatingMode::Configuration)
    );

    let bindings = dev.load_bindings();
    let mut setup = SetupSession::new(bindings, 0);
    dev.event(&mut setup, SessionEvent::Connected, 2 * SEC);
    dev.event(&mut setup, write("N:0:81"), 3 * SEC);
    assert!(!setup.state().is_dirty(Slot::Next));
    assert_eq!(dev.sleep(&mut setup), Teardown::ShutdownGattServer);

    // Boot 2: woken by NEXT.
    let bindings = dev.load_bindings();
    assert_eq!(bindings.next, KeyBinding::new(0, KEY_DOWN_ARROW));
    assert_eq!(bindings.prev, KeyBinding::DEFAULT_PREV);

    let mut s = NormalSession::new(bindings, wake_from(1 << NEXT_BUTTON_PIN), LinkFlavor::Keyboard, 0);
    let fx = s.start(0);
    dev.run(&mut s, fx);
    dev.event(&mut s, SessionEvent::Connected, SEC);
    dev.tick(&mut s, SEC + LINK_STABILIZE_MS);

    assert_eq!(
        dev.kb.sent.as_slice(),
        &[[0, 0, KEY_DOWN_ARROW, 0, 0, 0, 0, 0], [0; 8]]
    );
    assert_eq!(s.state().pending, PendingAction::None);
}

#[test]
fn wake_tap_boots_normal_and_replays_next() {
    let mut dev = Device::default();
    let status = WakeStatus {
        from_system_off: true,
        latch: 1 << NEXT_BUTTON_PIN,
    };

    // The chip is up 2 ms into a 180 ms tap on NEXT.
    let mut sel = ModeSelector::new();
    let mut now = 2;
    let mode = loop {
        if let Some(mode) = sel.sample(now < 180, now) {
            break mode;
        }
        now += MODE_SELECT_POLL_MS;
    };
    assert_eq!(mode, OperatingMode::Normal);

    let wake = mode.wake_cause(status);
    let mut s = NormalSession::new(dev.load_bindings(), wake, LinkFlavor::Keyboard, now);
    assert_eq!(s.state().pending, PendingAction::SendNext);

    dev.event(&mut s, SessionEvent::Connected, 2 * SEC);
    dev.tick(&mut s, 2 * SEC + LINK_STABILIZE_MS);
    assert_eq!(dev.kb.sent[1], [MOD_LEFT_CTRL, 0, KEY_PAGE_DOWN, 0, 0, 0, 0, 0]);
    assert_eq!(s.state().pending, PendingAction::None);
}

#[test]
fn malformed_writes_never_touch_flash() {
    let mut dev = Device::default();
    let mut setup = SetupSession::new(dev.load_bindings(), 0);
    dev.event(&mut setup, SessionEvent::Connected, 0);

    for bad in ["N:abc:12", "X:1:2", "N:1", "P:1:256", ":1:2", ""] {
        dev.event(&mut setup, write(bad), SEC);
    }

    assert!(dev.store.items.is_empty());
    assert_eq!(dev.load_bindings(), Bindings::default());
}

#[test]
fn prev_rebind_leaves_next_alone() {
    let mut dev = Device::default();
    let mut setup = SetupSession::new(dev.load_bindings(), 0);
    dev.event(&mut setup, write("P:2:80"), SEC);

    let b = dev.load_bindings();
    assert_eq!(b.prev, KeyBinding::new(MOD_LEFT_SHIFT, KEY_LEFT_ARROW));
    assert_eq!(b.next, KeyBinding::DEFAULT_NEXT);
}

#[test]
fn failed_save_is_retried_before_sleep() {
    let mut dev = Device::default();
    dev.store.fail_writes = true;

    let mut setup = SetupSession::new(dev.load_bindings(), 0);
    dev.event(&mut setup, write("N:0:79"), SEC);
    assert!(setup.state().is_dirty(Slot::Next));
    assert!(dev.store.items.is_empty());

    // Flash recovers before the idle timeout.
    dev.store.fail_writes = false;
    assert_eq!(
        setup.evaluate_sleep(SEC + SETUP_TIMEOUT_MS),
        SleepDecision::EnterDeepSleep
    );
    dev.sleep(&mut setup);

    assert!(!setup.state().is_dirty(Slot::Next));
    assert_eq!(dev.load_bindings().next, KeyBinding::new(0, KEY_RIGHT_ARROW));
}

// ═══════════════════════════════════════════════════════════════════════════
// Normal mode lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn live_presses_send_keys_and_battery() {
    let mut dev = Device::default();
    let mut s = NormalSession::new(dev.load_bindings(), WakeCause::ColdBoot, LinkFlavor::Keyboard, 0);
    dev.event(&mut s, SessionEvent::Connected, SEC);

    dev.event(&mut s, SessionEvent::ButtonPressed(Slot::Prev), 2 * SEC);
    assert_eq!(
        dev.kb.sent.as_slice(),
        &[
            [MOD_LEFT_CTRL, 0, 0, 0, 0, 0, 0, 0],
            [MOD_LEFT_CTRL, 0, KEY_PAGE_UP, 0, 0, 0, 0, 0],
            [0; 8],
        ]
    );
    assert_eq!(dev.kb.battery, Some((36, true)));

    // Bounce inside the lockout window is swallowed.
    dev.event(&mut s, SessionEvent::ButtonPressed(Slot::Prev), 2 * SEC + 100);
    assert_eq!(dev.kb.sent.len(), 3);
}

#[test]
fn presses_while_offline_are_dropped_but_keep_device_awake() {
    let mut dev = Device::default();
    let mut s = NormalSession::new(dev.load_bindings(), WakeCause::ColdBoot, LinkFlavor::Keyboard, 0);

    dev.event(&mut s, SessionEvent::ButtonPressed(Slot::Next), 90 * SEC);
    assert!(dev.kb.sent.is_empty());
    assert_eq!(s.evaluate_sleep(2 * MIN + 1), SleepDecision::Continue);
    assert_eq!(s.evaluate_sleep(90 * SEC + 2 * MIN + 1), SleepDecision::EnterDeepSleep);

    // Connecting later does not replay the offline press.
    dev.event(&mut s, SessionEvent::Connected, 3 * MIN);
    dev.tick(&mut s, 3 * MIN + LINK_STABILIZE_MS);
    assert!(dev.kb.sent.is_empty());
}

#[test]
fn never_connected_cold_boot_sleeps_after_grace() {
    let mut dev = Device::default();
    let mut s = NormalSession::new(dev.load_bindings(), WakeCause::ColdBoot, LinkFlavor::Keyboard, 0);
    let fx = s.start(0);
    dev.run(&mut s, fx);
    dev.kb.begin().unwrap();

    let mut now = 0;
    while s.evaluate_sleep(now) == SleepDecision::Continue {
        dev.tick(&mut s, now);
        now += SESSION_TICK_MS;
    }
    assert!(now > DISCONNECTED_GRACE_MS);
    assert!(now <= DISCONNECTED_GRACE_MS + SESSION_TICK_MS);

    assert_eq!(dev.sleep(&mut s), Teardown::StopKeyboard);
    assert!(!dev.kb.advertising);
}

#[test]
fn wake_press_is_kept_until_a_host_connects() {
    let mut dev = Device::default();
    let mut s = NormalSession::new(
        dev.load_bindings(),
        wake_from(1 << PREV_BUTTON_PIN),
        LinkFlavor::Keyboard,
        0,
    );

    for t in (0..MIN).step_by(SESSION_TICK_MS as usize) {
        dev.tick(&mut s, t);
    }
    assert_eq!(s.state().pending, PendingAction::SendPrev);
    assert!(dev.kb.sent.is_empty());

    dev.event(&mut s, SessionEvent::Connected, MIN);
    dev.tick(&mut s, MIN + LINK_STABILIZE_MS);
    assert_eq!(dev.kb.sent[1][2], KEY_PAGE_UP);
    assert_eq!(s.state().pending, PendingAction::None);

    // Flushed exactly once.
    dev.tick(&mut s, MIN + 2 * LINK_STABILIZE_MS);
    assert_eq!(dev.kb.sent.len(), 3);
}

#[test]
fn cold_boot_with_stray_latch_has_no_pending_action() {
    let cause = WakeCause::from_status(
        WakeStatus {
            from_system_off: false,
            latch: 1 << NEXT_BUTTON_PIN,
        },
        NEXT_BUTTON_PIN,
        PREV_BUTTON_PIN,
    );
    let s = NormalSession::new(Bindings::default(), cause, LinkFlavor::Keyboard, 0);
    assert_eq!(s.state().pending, PendingAction::None);
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifier flavor
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn notifier_reports_buttons_and_battery() {
    let mut dev = Device::default();
    let mut s = NormalSession::new(
        dev.load_bindings(),
        wake_from(1 << NEXT_BUTTON_PIN),
        LinkFlavor::Notifier,
        0,
    );

    dev.event(&mut s, SessionEvent::Connected, SEC);
    assert_eq!(dev.battery_pushes, 1);

    dev.tick(&mut s, SEC + LINK_STABILIZE_MS);
    dev.event(&mut s, SessionEvent::ButtonPressed(Slot::Prev), 3 * SEC);
    assert_eq!(dev.button_notifications.as_slice(), &[1, 2]);
    assert!(dev.kb.sent.is_empty());

    let pushes = dev.battery_pushes;
    dev.tick(&mut s, 3 * SEC + BATTERY_NOTIFY_INTERVAL_MS);
    assert_eq!(dev.battery_pushes, pushes + 1);

    dev.event(&mut s, SessionEvent::Disconnected, 10 * SEC);
    assert_eq!(dev.readvertised, 1);
    assert_eq!(dev.sleep(&mut s), Teardown::ShutdownGattServer);
}

#[test]
fn setup_mode_outlasts_normal_timeouts() {
    let mut dev = Device::default();
    let mut setup = SetupSession::new(dev.load_bindings(), 0);
    dev.event(&mut setup, SessionEvent::Connected, 0);
    dev.event(&mut setup, SessionEvent::Disconnected, SEC);
    assert_eq!(dev.readvertised, 1);

    assert_eq!(setup.evaluate_sleep(SLEEP_TIMEOUT_MS), SleepDecision::Continue);
    dev.event(&mut setup, write("P:0:75\n"), 9 * MIN);
    assert_eq!(setup.evaluate_sleep(18 * MIN), SleepDecision::Continue);
    assert_eq!(setup.evaluate_sleep(19 * MIN), SleepDecision::EnterDeepSleep);
    assert_eq!(dev.load_bindings().prev, KeyBinding::new(0, KEY_PAGE_UP));
}
