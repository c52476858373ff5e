//! Session state machine.
//!
//! One [`SessionState`] holds everything the firmware knows between boot
//! and the next System OFF. Radio callbacks, button tasks and the tick
//! timer feed it [`SessionEvent`]s; it answers with [`Effect`]s that the
//! embedded driver executes. No I/O happens here.
//!
//! Two implementations of [`Session`] exist, one per [`OperatingMode`]:
//!
//! ```text
//!   NormalSession   keyboard (or notifier) link, wake replay, live presses
//!   SetupSession    configuration GATT service, rebinding over the air
//! ```

use heapless::Vec;

use crate::command::ConfigCommand;
use crate::config::{
    BATTERY_NOTIFY_INTERVAL_MS, BUTTON_LOCKOUT_MS, CONFIG_WRITE_MAX, LINK_STABILIZE_MS,
};
use crate::keymap::{Bindings, KeyBinding, Slot};
use crate::mode::OperatingMode;
use crate::power_logic::{self, SleepDecision, Teardown, WakeCause};

/// Raw payload of one configuration write.
pub type CommandBuf = Vec<u8, CONFIG_WRITE_MAX>;

/// Effects produced by a single event or tick.
pub type Effects = Vec<Effect, 4>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Key press owed to the host because a button woke the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingAction {
    None,
    SendNext,
    SendPrev,
}

impl PendingAction {
    pub fn from_wake(cause: WakeCause) -> Self {
        match cause {
            WakeCause::ColdBoot => PendingAction::None,
            WakeCause::NextButtonWake => PendingAction::SendNext,
            WakeCause::PrevButtonWake => PendingAction::SendPrev,
        }
    }

    pub fn slot(self) -> Option<Slot> {
        match self {
            PendingAction::None => None,
            PendingAction::SendNext => Some(Slot::Next),
            PendingAction::SendPrev => Some(Slot::Prev),
        }
    }
}

/// Timestamp of the last meaningful activity. Never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActivityClock {
    last_ms: u64,
}

impl ActivityClock {
    pub const fn started_at(now_ms: u64) -> Self {
        Self { last_ms: now_ms }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_ms = self.last_ms.max(now_ms);
    }

    pub fn last(&self) -> u64 {
        self.last_ms
    }

    pub fn idle_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ms)
    }
}

/// Input to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEvent {
    Connected,
    Disconnected,
    ButtonPressed(Slot),
    ConfigWrite(CommandBuf),
}

/// Output of the state machine, executed by the driver in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    /// Modifier down (if any), key down, hold, release all.
    SendKey(KeyBinding),
    /// Notify the companion app's button characteristic.
    NotifyButton(Slot),
    /// Sample the battery and push the level to the host.
    PushBattery,
    /// Write the binding to flash, then report back via `mark_persisted`.
    PersistBinding(Slot, KeyBinding),
    /// Advertise again after the host went away.
    RestartAdvertising,
}

/// How Normal mode talks to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkFlavor {
    /// HID keyboard: presses become key strokes.
    Keyboard,
    /// Companion app: presses become button-event notifications.
    Notifier,
}

/// Everything the session owns.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub bindings: Bindings,
    pub pending: PendingAction,
    pub connection: ConnectionState,
    pub activity: ActivityClock,
    connected_at: Option<u64>,
    last_fired: [Option<u64>; 2],
    dirty: [bool; 2],
    last_battery_push: Option<u64>,
}

impl SessionState {
    pub fn new(bindings: Bindings, pending: PendingAction, now_ms: u64) -> Self {
        Self {
            bindings,
            pending,
            connection: ConnectionState::Disconnected,
            activity: ActivityClock::started_at(now_ms),
            connected_at: None,
            last_fired: [None; 2],
            dirty: [false; 2],
            last_battery_push: None,
        }
    }

    pub fn is_dirty(&self, slot: Slot) -> bool {
        self.dirty[slot.index()]
    }

    /// Bindings changed in RAM whose flash write has not succeeded yet.
    pub fn dirty_bindings(&self) -> impl Iterator<Item = (Slot, KeyBinding)> + '_ {
        Slot::ALL
            .into_iter()
            .filter(|s| self.is_dirty(*s))
            .map(|s| (s, self.bindings.get(s)))
    }

    /// Record the outcome of a flash write. A failed write stays dirty.
    pub fn mark_persisted(&mut self, slot: Slot, ok: bool) {
        if ok {
            self.dirty[slot.index()] = false;
        }
    }

    /// Returns `true` on the Disconnected → Connected edge.
    fn link_up(&mut self, now_ms: u64) -> bool {
        if self.connection == ConnectionState::Connected {
            return false;
        }
        self.connection = ConnectionState::Connected;
        self.connected_at = Some(now_ms);
        true
    }

    /// Returns `true` on the Connected → Disconnected edge.
    fn link_down(&mut self) -> bool {
        if self.connection == ConnectionState::Disconnected {
            return false;
        }
        self.connection = ConnectionState::Disconnected;
        self.connected_at = None;
        true
    }

    fn locked_out(&self, slot: Slot, now_ms: u64) -> bool {
        match self.last_fired[slot.index()] {
            Some(t) => now_ms.saturating_sub(t) < BUTTON_LOCKOUT_MS,
            None => false,
        }
    }
}

/// Behaviour shared by both operating modes.
pub trait Session {
    fn mode(&self) -> OperatingMode;

    fn state(&self) -> &SessionState;

    fn state_mut(&mut self) -> &mut SessionState;

    /// Effects to run once the radio is up.
    fn start(&mut self, now_ms: u64) -> Effects;

    fn on_event(&mut self, event: SessionEvent, now_ms: u64) -> Effects;

    /// Periodic housekeeping: deferred sends and timed notifications.
    fn tick(&mut self, now_ms: u64) -> Effects;

    /// Called once when the sleep policy fires.
    fn on_sleep_requested(&mut self) -> Teardown;

    fn evaluate_sleep(&self, now_ms: u64) -> SleepDecision {
        let state = self.state();
        power_logic::evaluate_sleep(now_ms, state.activity.last(), self.mode(), state.connection)
    }

    fn mark_persisted(&mut self, slot: Slot, ok: bool) {
        self.state_mut().mark_persisted(slot, ok);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Normal mode
// ═══════════════════════════════════════════════════════════════════════════

pub struct NormalSession {
    state: SessionState,
    flavor: LinkFlavor,
}

impl NormalSession {
    pub fn new(bindings: Bindings, wake: WakeCause, flavor: LinkFlavor, now_ms: u64) -> Self {
        Self {
            state: SessionState::new(bindings, PendingAction::from_wake(wake), now_ms),
            flavor,
        }
    }

    fn fire(&mut self, slot: Slot, now_ms: u64, effects: &mut Effects) {
        let action = match self.flavor {
            LinkFlavor::Keyboard => Effect::SendKey(self.state.bindings.get(slot)),
            LinkFlavor::Notifier => Effect::NotifyButton(slot),
        };
        let _ = effects.push(action);
        let _ = effects.push(Effect::PushBattery);

        self.state.activity.touch(now_ms);
        self.state.last_fired[slot.index()] = Some(now_ms);
        self.state.last_battery_push = Some(now_ms);
    }
}

impl Session for NormalSession {
    fn mode(&self) -> OperatingMode {
        OperatingMode::Normal
    }

    fn state(&self) -> &SessionState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn start(&mut self, _now_ms: u64) -> Effects {
        let mut effects = Effects::new();
        let _ = effects.push(Effect::PushBattery);
        effects
    }

    fn on_event(&mut self, event: SessionEvent, now_ms: u64) -> Effects {
        let mut effects = Effects::new();

        match event {
            SessionEvent::Connected => {
                if self.state.link_up(now_ms) && self.flavor == LinkFlavor::Notifier {
                    let _ = effects.push(Effect::PushBattery);
                    self.state.last_battery_push = Some(now_ms);
                }
            }
            SessionEvent::Disconnected => {
                if self.state.link_down() && self.flavor == LinkFlavor::Notifier {
                    let _ = effects.push(Effect::RestartAdvertising);
                }
            }
            SessionEvent::ButtonPressed(slot) => {
                self.state.activity.touch(now_ms);
                // Offline presses are dropped, and the wake press goes first.
                if self.state.connection == ConnectionState::Connected
                    && self.state.pending == PendingAction::None
                    && !self.state.locked_out(slot, now_ms)
                {
                    self.fire(slot, now_ms, &mut effects);
                }
            }
            SessionEvent::ConfigWrite(_) => {}
        }

        effects
    }

    fn tick(&mut self, now_ms: u64) -> Effects {
        let mut effects = Effects::new();
        if self.state.connection != ConnectionState::Connected {
            return effects;
        }

        if let (Some(slot), Some(since)) = (self.state.pending.slot(), self.state.connected_at) {
            if now_ms.saturating_sub(since) >= LINK_STABILIZE_MS {
                self.state.pending = PendingAction::None;
                self.fire(slot, now_ms, &mut effects);
            }
        }

        if self.flavor == LinkFlavor::Notifier {
            let last = self.state.last_battery_push.unwrap_or(0);
            if now_ms.saturating_sub(last) >= BATTERY_NOTIFY_INTERVAL_MS {
                let _ = effects.push(Effect::PushBattery);
                self.state.last_battery_push = Some(now_ms);
            }
        }

        effects
    }

    fn on_sleep_requested(&mut self) -> Teardown {
        match self.flavor {
            LinkFlavor::Keyboard => Teardown::StopKeyboard,
            LinkFlavor::Notifier => Teardown::ShutdownGattServer,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration mode
// ═══════════════════════════════════════════════════════════════════════════

pub struct SetupSession {
    state: SessionState,
}

impl SetupSession {
    pub fn new(bindings: Bindings, now_ms: u64) -> Self {
        Self {
            state: SessionState::new(bindings, PendingAction::None, now_ms),
        }
    }
}

impl Session for SetupSession {
    fn mode(&self) -> OperatingMode {
        OperatingMode::Configuration
    }

    fn state(&self) -> &SessionState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn start(&mut self, _now_ms: u64) -> Effects {
        Effects::new()
    }

    fn on_event(&mut self, event: SessionEvent, now_ms: u64) -> Effects {
        let mut effects = Effects::new();

        match event {
            SessionEvent::Connected => {
                self.state.link_up(now_ms);
            }
            SessionEvent::Disconnected => {
                if self.state.link_down() {
                    let _ = effects.push(Effect::RestartAdvertising);
                }
            }
            SessionEvent::ConfigWrite(raw) => {
                if raw.is_empty() {
                    return effects;
                }
                self.state.activity.touch(now_ms);
                if let Some(cmd) = ConfigCommand::parse(&raw) {
                    self.state.bindings.set(cmd.slot, cmd.binding);
                    self.state.dirty[cmd.slot.index()] = true;
                    let _ = effects.push(Effect::PersistBinding(cmd.slot, cmd.binding));
                }
            }
            // Buttons do nothing while configuring.
            SessionEvent::ButtonPressed(_) => {}
        }

        effects
    }

    fn tick(&mut self, _now_ms: u64) -> Effects {
        Effects::new()
    }

    fn on_sleep_requested(&mut self) -> Teardown {
        Teardown::ShutdownGattServer
    }
}
