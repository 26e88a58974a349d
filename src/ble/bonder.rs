//! Pairing and bonding backed by the persisted bond table.
//!
//! The SoftDevice asks for keys through [`SecurityHandler`]; we answer
//! from [`BONDS`], record new bonds there and wake the storage task
//! through [`PERSIST`].

use core::cell::RefCell;

use ble_gamepad::bonds::{BondRecord, BondTable};
use ble_gamepad::lifecycle::Event;
use defmt::{info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    Connection, EncryptionInfo, IdentityKey, IdentityResolutionKey, MasterId, SecurityMode,
};
use nrf_softdevice::raw;

use super::{post_event, to_address, to_bond_address};

/// Bonds known to the firmware, oldest first.
pub static BONDS: Mutex<CriticalSectionRawMutex, RefCell<BondTable>> =
    Mutex::new(RefCell::new(BondTable::new()));

/// Raised whenever [`BONDS`] changed and must be written to flash.
pub static PERSIST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Run `f` with exclusive access to the bond table.
pub fn with_bonds<R>(f: impl FnOnce(&mut BondTable) -> R) -> R {
    BONDS.lock(|bonds| f(&mut bonds.borrow_mut()))
}

/// Forget every bond and schedule the flash update.
pub fn clear_bonds() {
    with_bonds(|bonds| bonds.clear());
    PERSIST.signal(());
}

fn identity_key(record: &BondRecord) -> IdentityKey {
    IdentityKey {
        irk: IdentityResolutionKey::from_raw(raw::ble_gap_irk_t { irk: record.irk }),
        addr: to_address(&record.peer),
    }
}

fn keys(record: &BondRecord) -> (MasterId, EncryptionInfo) {
    (
        MasterId {
            ediv: record.ediv,
            rand: record.rand,
        },
        EncryptionInfo {
            ltk: record.ltk,
            flags: record.key_flags,
        },
    )
}

/// Numeric security level as reported to the lifecycle (1 = open,
/// 2 = encrypted, 3 = authenticated, 4 = LE Secure Connections).
fn security_level(mode: SecurityMode) -> u8 {
    match mode {
        SecurityMode::NoAccess => 0,
        SecurityMode::Open => 1,
        SecurityMode::JustWorks | SecurityMode::Signed => 2,
        SecurityMode::Mitm | SecurityMode::SignedMitm => 3,
        SecurityMode::LescMitm => 4,
    }
}

pub struct Bonder;

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn on_bonded(
        &self,
        _conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        let record = BondRecord {
            peer: to_bond_address(peer_id.addr),
            ediv: master_id.ediv,
            rand: master_id.rand,
            ltk: key.ltk,
            key_flags: key.flags,
            irk: peer_id.irk.as_raw().irk,
        };

        let count = with_bonds(|bonds| {
            bonds.add(record);
            bonds.len()
        });
        info!("Bonded with {}, {} bonds stored", record.peer, count);
        PERSIST.signal(());

        post_event(Event::PairingComplete {
            peer: record.peer,
            bonded: true,
        });
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        let found = with_bonds(|bonds| {
            bonds
                .find_by_master_id(master_id.ediv, &master_id.rand)
                .map(keys)
        });
        if found.is_none() {
            warn!("No key for ediv {}", master_id.ediv);
        }
        found.map(|(_, key)| key)
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        let peer = conn.peer_address();
        with_bonds(|bonds| {
            bonds
                .iter()
                .find(|record| identity_key(record).is_match(peer))
                .map(keys)
        })
    }

    fn on_security_update(&self, conn: &Connection, mode: SecurityMode) {
        post_event(Event::SecurityChanged {
            peer: to_bond_address(conn.peer_address()),
            level: security_level(mode),
            error: None,
        });
    }
}

static BONDER: Bonder = Bonder;

pub fn bonder() -> &'static Bonder {
    &BONDER
}
