//! Bond keeper for the keyboard identity.
//!
//! Bonds live in a RAM [`BondTable`] loaded from flash at boot. The
//! SoftDevice callbacks update the table; the session task writes it
//! back when `BONDS_CHANGED` fires and once more before deep sleep.

use core::cell::RefCell;

use defmt::{debug, info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use nrf_softdevice::ble::gatt_server::{get_sys_attrs, set_sys_attrs};
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    Address, AddressType, Connection, EncryptionInfo, IdentityKey, IdentityResolutionKey, MasterId,
    SecurityMode,
};
use nrf_softdevice::raw;
use pageturn::bond::{BondRecord, BondTable, SYS_ATTR_MAX};
use pageturn::config::MAX_BONDED_HOSTS;

pub type Bonds = BondTable<MAX_BONDED_HOSTS>;

/// Raised whenever the bond table has unsaved changes.
pub static BONDS_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub struct Bonder {
    bonds: RefCell<Bonds>,
}

impl Bonder {
    pub fn new(bonds: Bonds) -> Self {
        Self {
            bonds: RefCell::new(bonds),
        }
    }

    /// Copy of the table for writing to flash. Clears the dirty flag on
    /// the live table; call [`Bonder::mark_unsaved`] if the write fails so
    /// the next save picks it up again.
    pub fn take_unsaved(&self) -> Option<Bonds> {
        let mut bonds = self.bonds.borrow_mut();
        if !bonds.is_dirty() {
            return None;
        }
        let snapshot = bonds.clone();
        bonds.mark_clean();
        Some(snapshot)
    }

    pub fn mark_unsaved(&self) {
        self.bonds.borrow_mut().mark_dirty();
    }

    fn index_of(&self, addr: Address) -> Option<usize> {
        self.bonds
            .borrow()
            .iter()
            .position(|r| identity_of(r).is_match(addr))
    }
}

fn address_type_code(addr: &Address) -> u8 {
    match addr.address_type() {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    }
}

fn address_type_from_code(code: u8) -> AddressType {
    match code {
        0 => AddressType::Public,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => AddressType::RandomStatic,
    }
}

fn identity_of(record: &BondRecord) -> IdentityKey {
    IdentityKey {
        irk: IdentityResolutionKey::from_raw(raw::ble_gap_irk_t { irk: record.irk }),
        addr: Address::new(address_type_from_code(record.peer_addr_type), record.peer_addr),
    }
}

fn record_from(
    conn: &Connection,
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
) -> BondRecord {
    let mut sys_attrs = [0u8; SYS_ATTR_MAX];
    let sys_len = get_sys_attrs(conn, &mut sys_attrs).unwrap_or(0);

    BondRecord {
        ediv: master_id.ediv,
        rand: master_id.rand,
        ltk: key.ltk,
        ltk_flags: key.flags,
        irk: peer_id.irk.as_raw().irk,
        peer_addr_type: address_type_code(&peer_id.addr),
        peer_addr: peer_id.addr.bytes(),
        sys_attrs: Vec::from_slice(&sys_attrs[..sys_len]).unwrap_or_default(),
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        info!("BLE passkey: {:#X}", passkey);
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
    }

    fn on_bonded(
        &self,
        conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        debug!("BLE: storing bond for {}", master_id);
        let record = record_from(conn, master_id, key, peer_id);
        self.bonds.borrow_mut().upsert(record);
        info!("BLE: {} bonded host(s)", self.bonds.borrow().len());
        BONDS_CHANGED.signal(());
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        debug!("BLE: looking up bond for {}", master_id);
        self.bonds
            .borrow()
            .find_by_master(master_id.ediv, &master_id.rand)
            .map(|r| EncryptionInfo {
                ltk: r.ltk,
                flags: r.ltk_flags,
            })
    }

    fn save_sys_attrs(&self, conn: &Connection) {
        let Some(index) = self.index_of(conn.peer_address()) else {
            debug!("BLE: no bond for {}", conn.peer_address());
            return;
        };

        let mut buf = [0u8; SYS_ATTR_MAX];
        match get_sys_attrs(conn, &mut buf) {
            Ok(0) => warn!("BLE: got empty system attributes"),
            Ok(len) => {
                if self.bonds.borrow_mut().set_sys_attrs(index, &buf[..len]) {
                    debug!("BLE: system attributes updated");
                    BONDS_CHANGED.signal(());
                }
            }
            Err(e) => warn!("BLE: get_sys_attrs failed: {:?}", e),
        }
    }

    fn load_sys_attrs(&self, conn: &Connection) {
        let addr = conn.peer_address();
        let bonds = self.bonds.borrow();
        let sys_attrs = bonds
            .iter()
            .filter(|r| !r.sys_attrs.is_empty())
            .find(|r| identity_of(r).is_match(addr))
            .map(|r| r.sys_attrs.as_slice());

        if let Err(e) = set_sys_attrs(conn, sys_attrs) {
            warn!("BLE: set_sys_attrs failed: {:?}", e);
        }
    }
}
