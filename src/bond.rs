//! Bonded host records and their flash encoding.
//!
//! A bond is what the SoftDevice hands over after pairing (master ID,
//! long-term key, the host's identity key and address) plus the GATT
//! system attributes (CCCD state) so notifications stay enabled after a
//! reconnect.
//!
//! Record layout (little-endian):
//! ```text
//!   [2 ediv][8 rand][16 ltk][1 ltk_flags][16 irk][1 addr_type][6 addr]
//!   [1 sys_len][sys_len bytes of system attributes]
//! ```
//! The table is `[1 count][record]*`.

use heapless::Vec;

use crate::config::MAX_BONDED_HOSTS;

/// Largest system attribute blob kept per host.
pub const SYS_ATTR_MAX: usize = 62;

/// Size of the fixed part of a record.
const FIXED_RECORD_SIZE: usize = 2 + 8 + 16 + 1 + 16 + 1 + 6 + 1;

/// Largest encoded record.
pub const MAX_BOND_RECORD_SIZE: usize = FIXED_RECORD_SIZE + SYS_ATTR_MAX;

/// Largest encoded table for the configured host count.
pub const MAX_BOND_TABLE_SIZE: usize = 1 + MAX_BONDED_HOSTS * MAX_BOND_RECORD_SIZE;

/// One bonded host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondRecord {
    pub ediv: u16,
    pub rand: [u8; 8],
    pub ltk: [u8; 16],
    pub ltk_flags: u8,
    pub irk: [u8; 16],
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    pub sys_attrs: Vec<u8, SYS_ATTR_MAX>,
}

impl BondRecord {
    /// Encoded length of this record.
    pub fn encoded_len(&self) -> usize {
        FIXED_RECORD_SIZE + self.sys_attrs.len()
    }

    /// Serialize to bytes for flash storage. Returns 0 if `buf` is too small.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let total = self.encoded_len();
        if buf.len() < total {
            return 0;
        }

        buf[0..2].copy_from_slice(&self.ediv.to_le_bytes());
        buf[2..10].copy_from_slice(&self.rand);
        buf[10..26].copy_from_slice(&self.ltk);
        buf[26] = self.ltk_flags;
        buf[27..43].copy_from_slice(&self.irk);
        buf[43] = self.peer_addr_type;
        buf[44..50].copy_from_slice(&self.peer_addr);
        buf[50] = self.sys_attrs.len() as u8;
        buf[51..total].copy_from_slice(&self.sys_attrs);
        total
    }

    /// Deserialize from bytes. Trailing bytes are ignored.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < FIXED_RECORD_SIZE {
            return None;
        }
        let sys_len = data[50] as usize;
        if sys_len > SYS_ATTR_MAX || data.len() < FIXED_RECORD_SIZE + sys_len {
            return None;
        }

        let mut record = Self {
            ediv: u16::from_le_bytes([data[0], data[1]]),
            ltk_flags: data[26],
            peer_addr_type: data[43],
            ..Default::default()
        };
        record.rand.copy_from_slice(&data[2..10]);
        record.ltk.copy_from_slice(&data[10..26]);
        record.irk.copy_from_slice(&data[27..43]);
        record.peer_addr.copy_from_slice(&data[44..50]);
        record.sys_attrs = Vec::from_slice(&data[51..51 + sys_len]).ok()?;
        Some(record)
    }

    fn same_peer(&self, other: &BondRecord) -> bool {
        self.peer_addr == other.peer_addr && self.peer_addr_type == other.peer_addr_type
    }
}

/// In-memory copy of the bonded hosts, synced with flash.
#[derive(Clone, Debug, Default)]
pub struct BondTable<const N: usize> {
    records: Vec<BondRecord, N>,
    /// True if the table differs from flash.
    dirty: bool,
}

impl<const N: usize> BondTable<N> {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = &BondRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&BondRecord> {
        self.records.get(index)
    }

    /// Add or replace the bond for a host. When full, the oldest bond is evicted.
    pub fn upsert(&mut self, record: BondRecord) {
        if let Some(pos) = self.records.iter().position(|r| r.same_peer(&record)) {
            self.records.remove(pos);
        } else if self.records.is_full() {
            self.records.remove(0);
        }
        let _ = self.records.push(record);
        self.dirty = true;
    }

    /// Bond matching the master ID presented by a reconnecting host.
    pub fn find_by_master(&self, ediv: u16, rand: &[u8; 8]) -> Option<&BondRecord> {
        self.records
            .iter()
            .find(|r| r.ediv == ediv && &r.rand == rand)
    }

    /// Replace the system attributes of one bond. Returns `false` if
    /// nothing changed or `data` does not fit.
    pub fn set_sys_attrs(&mut self, index: usize, data: &[u8]) -> bool {
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        if record.sys_attrs.as_slice() == data {
            return false;
        }
        match Vec::from_slice(data) {
            Ok(attrs) => {
                record.sys_attrs = attrs;
                self.dirty = true;
                true
            }
            Err(()) => false,
        }
    }

    /// Serialize all bonds to a byte buffer.
    pub fn serialize_all(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        // First byte: bond count.
        let mut offset = 1;
        let mut count = 0u8;

        for record in &self.records {
            let written = record.serialize(&mut buf[offset..]);
            if written == 0 {
                break;
            }
            offset += written;
            count += 1;
        }

        buf[0] = count;
        offset
    }

    /// Replace the table with bonds decoded from a byte buffer. Stops at
    /// the first record that does not decode.
    pub fn deserialize_all(&mut self, data: &[u8]) {
        self.records.clear();
        self.dirty = false;

        let Some((&count, mut rest)) = data.split_first() else {
            return;
        };

        for _ in 0..count {
            let Some(record) = BondRecord::deserialize(rest) else {
                break;
            };
            rest = &rest[record.encoded_len()..];
            if self.records.push(record).is_err() {
                break;
            }
        }
    }
}
