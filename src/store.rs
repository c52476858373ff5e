//! Persistent settings on top of a small key/value store.
//!
//! Storage layout (one map, `u8` keys):
//!   - `KEY_NEXT_BINDING` / `KEY_PREV_BINDING`: `[modifier, keycode]`,
//!     always written together so a binding is never half-updated.
//!   - `KEY_BONDS`: the serialized bond table (see `bond.rs`).
//!
//! The backing store is a trait so the same code runs against
//! `sequential-storage` on target and an in-memory map in tests.

use crate::bond::{BondTable, MAX_BOND_TABLE_SIZE};
use crate::keymap::{Bindings, KeyBinding, Slot};

/// Key for the NEXT button binding.
pub const KEY_NEXT_BINDING: u8 = 0x10;

/// Key for the PREV button binding.
pub const KEY_PREV_BINDING: u8 = 0x11;

/// Key for the bonded host table.
pub const KEY_BONDS: u8 = 0x20;

/// Scratch buffer size for a single value.
pub const MAX_VALUE_SIZE: usize = 256;

/// Minimal async key/value store with `u8` keys and small byte values.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    type Error;

    /// Read `key` into `buf`. `Ok(None)` when the key was never written.
    async fn fetch<'a>(&mut self, key: u8, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, Self::Error>;

    /// Write `value` under `key`; returns once the write is durable.
    async fn store(&mut self, key: u8, value: &[u8]) -> Result<(), Self::Error>;
}

pub const fn binding_key(slot: Slot) -> u8 {
    match slot {
        Slot::Next => KEY_NEXT_BINDING,
        Slot::Prev => KEY_PREV_BINDING,
    }
}

/// Button bindings stored in a [`KeyValueStore`].
pub struct BindingStore<'s, S> {
    kv: &'s mut S,
}

impl<'s, S: KeyValueStore> BindingStore<'s, S> {
    pub fn new(kv: &'s mut S) -> Self {
        Self { kv }
    }

    /// Load both bindings. Missing, unreadable or malformed records fall
    /// back to the slot's default.
    pub async fn load(&mut self) -> Bindings {
        let mut bindings = Bindings::default();
        for slot in Slot::ALL {
            bindings.set(slot, self.load_slot(slot).await);
        }
        bindings
    }

    async fn load_slot(&mut self, slot: Slot) -> KeyBinding {
        let mut buf = [0u8; MAX_VALUE_SIZE];
        match self.kv.fetch(binding_key(slot), &mut buf).await {
            Ok(Some(data)) => KeyBinding::from_bytes(data).unwrap_or(slot.default_binding()),
            Ok(None) | Err(_) => slot.default_binding(),
        }
    }

    /// Persist one binding as a single record.
    pub async fn save(&mut self, slot: Slot, binding: KeyBinding) -> Result<(), S::Error> {
        self.kv.store(binding_key(slot), &binding.to_bytes()).await
    }
}

/// Load the bond table. An unreadable record yields an empty table.
pub async fn load_bonds<S: KeyValueStore, const N: usize>(kv: &mut S) -> BondTable<N> {
    let mut buf = [0u8; MAX_VALUE_SIZE];
    let mut table = BondTable::new();
    if let Ok(Some(data)) = kv.fetch(KEY_BONDS, &mut buf).await {
        table.deserialize_all(data);
    }
    table
}

/// Write the bond table if it changed since the last save.
pub async fn save_bonds<S: KeyValueStore, const N: usize>(
    kv: &mut S,
    table: &mut BondTable<N>,
) -> Result<(), S::Error> {
    if !table.is_dirty() {
        return Ok(());
    }
    let mut buf = [0u8; MAX_BOND_TABLE_SIZE];
    let len = table.serialize_all(&mut buf);
    kv.store(KEY_BONDS, &buf[..len]).await?;
    table.mark_clean();
    Ok(())
}
