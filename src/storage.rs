//! Persistent storage for bond keys.
//!
//! Uses the nRF52840's internal flash via the `sequential-storage` crate.
//! The whole [`BondTable`] is one item of a key-value map; the record codec
//! lives in the library (`ble_gamepad::bonds`).

use ble_gamepad::bonds::{BondTable, BOND_TABLE_SIZE};
use ble_gamepad::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use ble_gamepad::error::Error;
use defmt::{debug, error, info, warn};
use embedded_storage_async::nor_flash::NorFlash;
use nrf_softdevice::Flash;

use crate::ble::bonder::{with_bonds, PERSIST};

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Key of the bond table in the map storage.
const KEY_BOND_TABLE: u8 = 0x01;

/// Scratch buffer size: the table plus sequential-storage item overhead.
const BUF_SIZE: usize = BOND_TABLE_SIZE + 32;

/// Read the bond table from flash into `table`. Missing or unreadable data
/// leaves it empty.
pub async fn load_bonds(flash: &mut impl NorFlash, table: &mut BondTable) -> Result<(), Error> {
    let mut buf = [0u8; BUF_SIZE];

    match sequential_storage::map::fetch_item::<u8, &[u8], _>(
        flash,
        STORAGE_START..STORAGE_END,
        &mut sequential_storage::cache::NoCache::new(),
        &mut buf,
        &KEY_BOND_TABLE,
    )
    .await
    {
        Ok(Some(data)) => {
            table.load(data);
            info!("Loaded {} bonds from flash", table.len());
            Ok(())
        }
        Ok(None) => {
            info!("No bonds in flash");
            table.clear();
            table.mark_clean();
            Ok(())
        }
        Err(e) => {
            error!("Flash read error: {:?}", defmt::Debug2Format(&e));
            table.clear();
            table.mark_clean();
            Err(Error::Storage)
        }
    }
}

/// Write `table` to flash if it changed since the last load/save.
pub async fn save_bonds(flash: &mut impl NorFlash, table: &mut BondTable) -> Result<(), Error> {
    if !table.is_dirty() {
        debug!("Bond table: no changes to save");
        return Ok(());
    }

    let mut buf = [0u8; BUF_SIZE];
    let mut data_buf = [0u8; BOND_TABLE_SIZE];
    let len = table.serialize(&mut data_buf);
    let item = &data_buf[..len];

    match sequential_storage::map::store_item::<u8, &[u8], _>(
        flash,
        STORAGE_START..STORAGE_END,
        &mut sequential_storage::cache::NoCache::new(),
        &mut buf,
        &KEY_BOND_TABLE,
        &item,
    )
    .await
    {
        Ok(_) => {
            info!("Saved {} bonds to flash", table.len());
            table.mark_clean();
            Ok(())
        }
        Err(e) => {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            Err(Error::Storage)
        }
    }
}

/// Load the persisted bonds into the shared table before the stack starts.
pub async fn restore(flash: &mut Flash) {
    let mut table = BondTable::new();
    if load_bonds(flash, &mut table).await.is_err() {
        warn!("Starting without stored bonds");
    }
    with_bonds(|bonds| *bonds = table);
}

/// Persist the shared bond table every time it changes.
#[embassy_executor::task]
pub async fn storage_task(mut flash: Flash) -> ! {
    loop {
        PERSIST.wait().await;

        // Work on a copy so the SoftDevice callbacks never wait on flash.
        let mut snapshot = with_bonds(|bonds| {
            let copy = bonds.clone();
            bonds.mark_clean();
            copy
        });
        if save_bonds(&mut flash, &mut snapshot).await.is_err() {
            // Keep the live table dirty so the next change retries.
            with_bonds(|bonds| bonds.mark_dirty());
        }
    }
}
