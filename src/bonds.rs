//! Bond records and the in-memory bond table.
//!
//! The SoftDevice hands us key material when a host bonds; we keep it in a
//! small table that is persisted to flash by the firmware (`storage.rs` in
//! the binary) and read back at boot. The codec lives here so it can be
//! tested on the host.
//!
//! Record layout (fixed 50 bytes):
//! ```text
//! [6 addr][1 addr type][2 ediv LE][8 rand][16 ltk][1 key flags][16 irk]
//! ```
//! Table layout: `[1 count][record]*`.

use core::fmt;

use crate::config::MAX_BONDS;
use heapless::Vec;

/// Serialized size of one [`BondRecord`].
pub const BOND_RECORD_SIZE: usize = 50;

/// Serialized size of a full [`BondTable`].
pub const BOND_TABLE_SIZE: usize = 1 + MAX_BONDS * BOND_RECORD_SIZE;

/// BLE address type, numbered as stored in flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AddressKind {
    Public = 0,
    RandomStatic = 1,
    RandomPrivateResolvable = 2,
    RandomPrivateNonResolvable = 3,
    Anonymous = 4,
}

impl AddressKind {
    fn from_code(code: u8) -> Self {
        match code {
            0 => AddressKind::Public,
            2 => AddressKind::RandomPrivateResolvable,
            3 => AddressKind::RandomPrivateNonResolvable,
            4 => AddressKind::Anonymous,
            _ => AddressKind::RandomStatic, // default fallback
        }
    }
}

/// Identity of a bonded remote. Only ever read by the lifecycle logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondAddress {
    pub kind: AddressKind,
    /// Address bytes, least significant first (as on air).
    pub bytes: [u8; 6],
}

impl BondAddress {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl fmt::Display for BondAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )?;
        match self.kind {
            AddressKind::Public => f.write_str(" (public)"),
            _ => f.write_str(" (random)"),
        }
    }
}

/// Long-term key material for one bonded host.
///
/// Only the peer address is ever logged; see the `defmt::Format` impl.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BondRecord {
    /// Identity address of the host.
    pub peer: BondAddress,
    /// Encrypted diversifier of the LTK.
    pub ediv: u16,
    /// Random value of the LTK.
    pub rand: [u8; 8],
    /// Long-term key.
    pub ltk: [u8; 16],
    /// Key flags (LESC / authenticated) as reported by the SoftDevice.
    pub key_flags: u8,
    /// Identity resolving key of the host (all zero if none was shared).
    pub irk: [u8; 16],
}

impl BondRecord {
    /// Whether the host shared an identity resolving key.
    pub fn has_irk(&self) -> bool {
        self.irk.iter().any(|&b| b != 0)
    }

    /// Serialize to bytes for flash storage.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < BOND_RECORD_SIZE {
            return 0;
        }
        buf[0..6].copy_from_slice(&self.peer.bytes);
        buf[6] = self.peer.kind as u8;
        buf[7..9].copy_from_slice(&self.ediv.to_le_bytes());
        buf[9..17].copy_from_slice(&self.rand);
        buf[17..33].copy_from_slice(&self.ltk);
        buf[33] = self.key_flags;
        buf[34..50].copy_from_slice(&self.irk);
        BOND_RECORD_SIZE
    }

    /// Deserialize from bytes.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < BOND_RECORD_SIZE {
            return None;
        }

        let mut addr = [0u8; 6];
        addr.copy_from_slice(&data[0..6]);
        let mut rand = [0u8; 8];
        rand.copy_from_slice(&data[9..17]);
        let mut ltk = [0u8; 16];
        ltk.copy_from_slice(&data[17..33]);
        let mut irk = [0u8; 16];
        irk.copy_from_slice(&data[34..50]);

        Some(Self {
            peer: BondAddress::new(AddressKind::from_code(data[6]), addr),
            ediv: u16::from_le_bytes([data[7], data[8]]),
            rand,
            ltk,
            key_flags: data[33],
            irk,
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BondRecord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "BondRecord(peer={})", self.peer)
    }
}

/// In-memory bond table, synced with flash.
#[derive(Clone, Debug)]
pub struct BondTable {
    /// Bonds, oldest first.
    records: Vec<BondRecord, MAX_BONDS>,
    /// Dirty flag - true if the table differs from flash.
    dirty: bool,
}

impl Default for BondTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BondTable {
    /// Create an empty table.
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

    /// Force the next save, e.g. after a failed flash write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = &BondRecord> {
        self.records.iter()
    }

    /// Add or refresh a bond. A bond for the same host (same address or
    /// same LTK identifiers) is replaced and becomes the most recent; when
    /// the table is full the oldest bond is evicted.
    pub fn add(&mut self, record: BondRecord) {
        if let Some(pos) = self.records.iter().position(|r| {
            r.peer == record.peer || (r.ediv == record.ediv && r.rand == record.rand)
        }) {
            self.records.remove(pos);
            debug!("Refreshing existing bond");
        } else if self.records.is_full() {
            warn!("Bond table full - evicting oldest entry");
            self.records.remove(0);
        }

        let _ = self.records.push(record);
        self.dirty = true;
        info!("Bond stored - now holding {}", self.records.len());
    }

    /// Forget every bond.
    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.dirty = true;
        }
    }

    /// Most recently added bond.
    pub fn latest(&self) -> Option<&BondRecord> {
        self.records.last()
    }

    /// Bond whose LTK identifiers match.
    pub fn find_by_master_id(&self, ediv: u16, rand: &[u8; 8]) -> Option<&BondRecord> {
        self.records
            .iter()
            .find(|r| r.ediv == ediv && &r.rand == rand)
    }

    /// Bond for the given identity address.
    pub fn find_by_peer(&self, peer: &BondAddress) -> Option<&BondRecord> {
        self.records.iter().find(|r| &r.peer == peer)
    }

    /// Identity address and IRK of `peer`, if it bonded with privacy.
    /// Hosts reconnecting from a resolvable private address only pass the
    /// accept list when the stack knows this pair.
    pub fn resolving_identity(&self, peer: &BondAddress) -> Option<(BondAddress, [u8; 16])> {
        self.find_by_peer(peer)
            .filter(|r| r.has_irk())
            .map(|r| (r.peer, r.irk))
    }

    /// Identity addresses, oldest first.
    pub fn addresses(&self) -> Vec<BondAddress, MAX_BONDS> {
        self.records.iter().map(|r| r.peer).collect()
    }

    /// Serialize the whole table into `buf`.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let needed = 1 + self.records.len() * BOND_RECORD_SIZE;
        if buf.len() < needed {
            return 0;
        }

        buf[0] = self.records.len() as u8;
        let mut offset = 1;
        for record in &self.records {
            offset += record.serialize(&mut buf[offset..]);
        }
        offset
    }

    /// Replace the table with the records decoded from `data`.
    /// Truncated trailing records are skipped.
    pub fn load(&mut self, data: &[u8]) {
        self.records.clear();
        self.dirty = false;

        let Some((&count, mut rest)) = data.split_first() else {
            return;
        };

        for _ in 0..count {
            let Some(record) = BondRecord::deserialize(rest) else {
                warn!("Bond table truncated");
                break;
            };
            if self.records.push(record).is_err() {
                break;
            }
            rest = &rest[BOND_RECORD_SIZE..];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: u8) -> BondRecord {
        BondRecord {
            peer: BondAddress::new(AddressKind::RandomStatic, [seed; 6]),
            ediv: 0x1000 + seed as u16,
            rand: [seed.wrapping_add(1); 8],
            ltk: [seed.wrapping_add(2); 16],
            key_flags: 0x01,
            irk: [seed.wrapping_add(3); 16],
        }
    }

    #[test]
    fn record_layout() {
        let mut buf = [0u8; BOND_RECORD_SIZE];
        let rec = BondRecord {
            peer: BondAddress::new(AddressKind::Public, [1, 2, 3, 4, 5, 6]),
            ediv: 0xBEEF,
            rand: [7; 8],
            ltk: [8; 16],
            key_flags: 0x03,
            irk: [9; 16],
        };
        assert_eq!(rec.serialize(&mut buf), BOND_RECORD_SIZE);
        assert_eq!(&buf[0..7], &[1, 2, 3, 4, 5, 6, 0]);
        assert_eq!(&buf[7..9], &[0xEF, 0xBE]);
        assert_eq!(buf[33], 0x03);
        assert_eq!(BondRecord::deserialize(&buf), Some(rec));
    }

    #[test]
    fn record_short_input() {
        assert!(BondRecord::deserialize(&[0u8; BOND_RECORD_SIZE - 1]).is_none());
        let mut small = [0u8; 10];
        assert_eq!(record(1).serialize(&mut small), 0);
    }

    #[test]
    fn unknown_address_type_falls_back_to_random_static() {
        let mut buf = [0u8; BOND_RECORD_SIZE];
        record(1).serialize(&mut buf);
        buf[6] = 0xEE;
        let rec = BondRecord::deserialize(&buf).unwrap();
        assert_eq!(rec.peer.kind, AddressKind::RandomStatic);
    }

    #[test]
    fn add_refreshes_existing_peer() {
        let mut table = BondTable::new();
        table.add(record(1));
        table.add(record(2));
        let mut refreshed = record(1);
        refreshed.ltk = [0xAA; 16];
        table.add(refreshed);

        assert_eq!(table.len(), 2);
        assert_eq!(table.latest(), Some(&refreshed));
        assert!(table.is_dirty());
    }

    #[test]
    fn add_evicts_oldest_when_full() {
        let mut table = BondTable::new();
        for seed in 0..MAX_BONDS as u8 + 1 {
            table.add(record(seed));
        }
        assert_eq!(table.len(), MAX_BONDS);
        assert!(table.find_by_peer(&record(0).peer).is_none());
        assert_eq!(table.latest(), Some(&record(MAX_BONDS as u8)));
    }

    #[test]
    fn lookup_by_master_id() {
        let mut table = BondTable::new();
        table.add(record(4));
        let r = record(4);
        assert_eq!(table.find_by_master_id(r.ediv, &r.rand), Some(&r));
        assert!(table.find_by_master_id(r.ediv, &[0; 8]).is_none());
    }

    #[test]
    fn resolving_identity_needs_shared_irk() {
        let mut table = BondTable::new();
        let with_irk = record(4);
        let mut without_irk = record(5);
        without_irk.irk = [0; 16];
        table.add(with_irk);
        table.add(without_irk);

        assert_eq!(
            table.resolving_identity(&with_irk.peer),
            Some((with_irk.peer, with_irk.irk))
        );
        assert!(table.resolving_identity(&without_irk.peer).is_none());
        assert!(table
            .resolving_identity(&BondAddress::new(AddressKind::Public, [9; 6]))
            .is_none());
    }

    #[test]
    fn table_persists_and_reloads() {
        let mut table = BondTable::new();
        table.add(record(1));
        table.add(record(2));

        let mut buf = [0u8; BOND_TABLE_SIZE];
        let len = table.serialize(&mut buf);
        assert_eq!(len, 1 + 2 * BOND_RECORD_SIZE);

        let mut loaded = BondTable::new();
        loaded.load(&buf[..len]);
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.addresses().as_slice(), &[record(1).peer, record(2).peer]);
    }

    #[test]
    fn load_skips_truncated_tail() {
        let mut table = BondTable::new();
        table.add(record(1));
        table.add(record(2));
        let mut buf = [0u8; BOND_TABLE_SIZE];
        let len = table.serialize(&mut buf);

        let mut loaded = BondTable::new();
        loaded.load(&buf[..len - 1]);
        assert_eq!(loaded.len(), 1);

        loaded.load(&[]);
        assert!(loaded.is_empty());
    }

    #[test]
    fn clear_marks_dirty_only_when_needed() {
        let mut table = BondTable::new();
        table.clear();
        assert!(!table.is_dirty());

        table.add(record(1));
        table.mark_clean();
        table.clear();
        assert!(table.is_empty());
        assert!(table.is_dirty());
    }

    #[test]
    fn snapshot_keeps_dirty_flag() {
        let mut table = BondTable::new();
        table.add(record(2));
        let snapshot = table.clone();
        table.mark_clean();
        assert!(snapshot.is_dirty());
        assert!(!table.is_dirty());

        table.mark_dirty();
        assert!(table.is_dirty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn address_display() {
        let addr = BondAddress::new(AddressKind::Public, [0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(format!("{}", addr), "01:02:03:04:05:06 (public)");
    }
}
