//! Internal flash backend for the settings store.
//!
//! Uses the nRF52840's internal flash via the `sequential-storage` map,
//! which handles wear levelling and garbage collection across the
//! reserved pages. Writes go through the SoftDevice flash API, so they
//! are safe while the radio is active.

use defmt::{debug, error};
use embedded_storage_async::nor_flash::NorFlash;
use pageturn::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use pageturn::error::Error;
use pageturn::store::{KeyValueStore, MAX_VALUE_SIZE};
use sequential_storage::cache::NoCache;
use sequential_storage::map;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Settings store over any NOR flash; on target the SoftDevice `Flash`.
pub struct FlashStore<F> {
    flash: F,
}

impl<F: NorFlash> FlashStore<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }
}

impl<F: NorFlash> KeyValueStore for FlashStore<F> {
    type Error = Error;

    async fn fetch<'a>(
        &mut self,
        key: u8,
        buf: &'a mut [u8],
    ) -> Result<Option<&'a [u8]>, Error> {
        map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            buf,
            &key,
        )
        .await
        .map_err(|e| {
            error!("Flash read error: {:?}", defmt::Debug2Format(&e));
            Error::Storage
        })
    }

    async fn store(&mut self, key: u8, value: &[u8]) -> Result<(), Error> {
        let mut buf = [0u8; MAX_VALUE_SIZE + 16];
        map::store_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &key,
            &value,
        )
        .await
        .map_err(|e| {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            Error::Storage
        })?;
        debug!("Flash: stored key {:#04x} ({} bytes)", key, value.len());
        Ok(())
    }
}
