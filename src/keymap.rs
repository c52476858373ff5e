//! Key bindings for the two buttons.
//!
//! Bindings use USB HID encoding directly: the modifier is the HID
//! modifier bitfield (same layout as byte 0 of a boot keyboard report)
//! and the keycode is a Keyboard/Keypad page usage ID.

/// HID modifier bits.
pub const MOD_LEFT_CTRL: u8 = 0x01;
pub const MOD_LEFT_SHIFT: u8 = 0x02;
pub const MOD_LEFT_ALT: u8 = 0x04;
pub const MOD_LEFT_GUI: u8 = 0x08;

/// HID Keyboard/Keypad usages used by the defaults and tests.
pub const KEY_PAGE_UP: u8 = 0x4B;
pub const KEY_PAGE_DOWN: u8 = 0x4E;
pub const KEY_RIGHT_ARROW: u8 = 0x4F;
pub const KEY_LEFT_ARROW: u8 = 0x50;
pub const KEY_DOWN_ARROW: u8 = 0x51;

/// One button's key combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyBinding {
    /// Modifier bitfield, `0` means no modifier.
    pub modifier: u8,
    /// HID usage of the key.
    pub keycode: u8,
}

impl KeyBinding {
    pub const fn new(modifier: u8, keycode: u8) -> Self {
        Self { modifier, keycode }
    }

    /// Ctrl + Page Down.
    pub const DEFAULT_NEXT: Self = Self::new(MOD_LEFT_CTRL, KEY_PAGE_DOWN);

    /// Ctrl + Page Up.
    pub const DEFAULT_PREV: Self = Self::new(MOD_LEFT_CTRL, KEY_PAGE_UP);

    /// Stored form: `[modifier, keycode]`, always written as one record.
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.modifier, self.keycode]
    }

    /// Decode a stored record. Anything other than exactly two bytes is rejected.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [modifier, keycode] => Some(Self::new(*modifier, *keycode)),
            _ => None,
        }
    }
}

/// The two physical buttons / binding slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    Next,
    Prev,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Next, Slot::Prev];

    pub const fn index(self) -> usize {
        match self {
            Slot::Next => 0,
            Slot::Prev => 1,
        }
    }

    pub const fn default_binding(self) -> KeyBinding {
        match self {
            Slot::Next => KeyBinding::DEFAULT_NEXT,
            Slot::Prev => KeyBinding::DEFAULT_PREV,
        }
    }

    /// Value pushed on the notifier's button characteristic.
    pub const fn event_code(self) -> u8 {
        match self {
            Slot::Next => 1,
            Slot::Prev => 2,
        }
    }
}

/// Both bindings, as held in RAM for the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bindings {
    pub next: KeyBinding,
    pub prev: KeyBinding,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            next: KeyBinding::DEFAULT_NEXT,
            prev: KeyBinding::DEFAULT_PREV,
        }
    }
}

impl Bindings {
    pub fn get(&self, slot: Slot) -> KeyBinding {
        match slot {
            Slot::Next => self.next,
            Slot::Prev => self.prev,
        }
    }

    pub fn set(&mut self, slot: Slot, binding: KeyBinding) {
        match slot {
            Slot::Next => self.next = binding,
            Slot::Prev => self.prev = binding,
        }
    }
}
