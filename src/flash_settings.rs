//! Flash-backed settings store.
//!
//! Each persisted record occupies one 4 KB sector at the end of internal
//! flash: magic + payload length + the key=value record text + CRC32.
//! A record that fails validation is cleared once and treated as absent,
//! so a corrupted sector costs the stored value, never the device.

use core::cell::RefCell;

use embassy_rp::Peri;
use embassy_rp::flash::{Blocking, ERASE_SIZE, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use crate::Result;
use crate::settings_store::{
    RecordText, SettingsStore, decode_credentials, decode_network_config, encode_credentials,
    encode_network_config,
};
use crate::wifi_config::{NetworkConfig, WifiCredentials};

/// Internal flash size for Raspberry Pi Pico 2 (4 MB).
#[cfg(feature = "pico2")]
pub const INTERNAL_FLASH_SIZE: usize = 4 * 1024 * 1024;

/// Internal flash size for Raspberry Pi Pico 1 W (2 MB).
#[cfg(not(feature = "pico2"))]
pub const INTERNAL_FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Sector index (from the end of flash) holding the credentials record.
const CREDENTIALS_BLOCK: u32 = 0;
/// Sector index holding the network settings record.
const NETWORK_BLOCK: u32 = 1;

const MAGIC: u32 = 0x4B56_5331; // 'KVS1'
const ERASED: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 2;
const CRC_SIZE: usize = 4;
const RECORD_CAPACITY: usize = 256;

type InternalFlash = Flash<'static, FLASH, Blocking, INTERNAL_FLASH_SIZE>;

/// Settings store over the Pico's internal flash.
pub struct FlashSettings {
    flash: Mutex<CriticalSectionRawMutex, RefCell<InternalFlash>>,
}

impl FlashSettings {
    /// Take ownership of the FLASH peripheral.
    #[must_use]
    pub fn new(flash: Peri<'static, FLASH>) -> Self {
        Self {
            flash: Mutex::new(RefCell::new(Flash::new_blocking(flash))),
        }
    }

    fn load_text(&self, block: u32) -> Option<RecordText> {
        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            match read_record(&mut flash, block) {
                Ok(text) => text,
                Err(_) => {
                    // One-shot reformat; the caller proceeds with defaults.
                    warn!("settings block {} failed validation, clearing", block);
                    if erase_record(&mut flash, block).is_err() {
                        warn!("settings block {} could not be cleared", block);
                    }
                    None
                }
            }
        })
    }

    fn save_text(&self, block: u32, text: &RecordText) -> Result<()> {
        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            write_record(&mut flash, block, text)
        })
    }

    fn clear_block(&self, block: u32) -> Result<()> {
        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            erase_record(&mut flash, block)
        })
    }
}

impl SettingsStore for FlashSettings {
    fn load_credentials(&self) -> Result<Option<WifiCredentials>> {
        Ok(self
            .load_text(CREDENTIALS_BLOCK)
            .and_then(|text| decode_credentials(&text)))
    }

    fn save_credentials(&self, credentials: &WifiCredentials) -> Result<()> {
        self.save_text(CREDENTIALS_BLOCK, &encode_credentials(credentials))
    }

    fn clear_credentials(&self) -> Result<()> {
        self.clear_block(CREDENTIALS_BLOCK)
    }

    fn load_network_config(&self) -> Result<Option<NetworkConfig>> {
        Ok(self
            .load_text(NETWORK_BLOCK)
            .map(|text| decode_network_config(&text)))
    }

    fn save_network_config(&self, config: &NetworkConfig) -> Result<()> {
        self.save_text(NETWORK_BLOCK, &encode_network_config(config))
    }

    fn clear_network_config(&self) -> Result<()> {
        self.clear_block(NETWORK_BLOCK)
    }
}

fn record_offset(block: u32) -> u32 {
    INTERNAL_FLASH_SIZE as u32 - (block + 1) * ERASE_SIZE as u32
}

fn record_crc(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

fn read_record(flash: &mut InternalFlash, block: u32) -> Result<Option<RecordText>> {
    use crate::Error;

    let offset = record_offset(block);
    let mut header = [0u8; HEADER_SIZE];
    flash.blocking_read(offset, &mut header)?;

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic == ERASED {
        return Ok(None);
    }
    if magic != MAGIC {
        return Err(Error::StorageCorrupted);
    }
    let len = u16::from_le_bytes([header[4], header[5]]) as usize;
    if len > RECORD_CAPACITY {
        return Err(Error::StorageCorrupted);
    }

    let mut body = [0u8; RECORD_CAPACITY + CRC_SIZE];
    let body_len = len + CRC_SIZE;
    flash.blocking_read(
        offset + HEADER_SIZE as u32,
        body.get_mut(..body_len).ok_or(Error::StorageCorrupted)?,
    )?;

    let payload = body.get(..len).ok_or(Error::StorageCorrupted)?;
    let stored_crc = u32::from_le_bytes([
        body[len],
        body[len + 1],
        body[len + 2],
        body[len + 3],
    ]);
    if stored_crc != record_crc(&header, payload) {
        return Err(Error::StorageCorrupted);
    }

    let text = core::str::from_utf8(payload).map_err(|_| Error::StorageCorrupted)?;
    let mut record = RecordText::new();
    record
        .push_str(text)
        .map_err(|()| Error::StorageCorrupted)?;
    Ok(Some(record))
}

fn write_record(flash: &mut InternalFlash, block: u32, text: &RecordText) -> Result<()> {
    let offset = record_offset(block);
    flash.blocking_erase(offset, offset + ERASE_SIZE as u32)?;

    // Header + payload + CRC, padded to a write-aligned length.
    let payload = text.as_bytes();
    let mut buffer = [0xFFu8; HEADER_SIZE + RECORD_CAPACITY + CRC_SIZE + 4];
    buffer[..4].copy_from_slice(&MAGIC.to_le_bytes());
    buffer[4..6].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    buffer[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    let crc = record_crc(&buffer[..HEADER_SIZE], payload);
    buffer[HEADER_SIZE + payload.len()..HEADER_SIZE + payload.len() + CRC_SIZE]
        .copy_from_slice(&crc.to_le_bytes());

    let total = HEADER_SIZE + payload.len() + CRC_SIZE;
    let aligned = total.next_multiple_of(4);
    flash.blocking_write(offset, &buffer[..aligned])?;
    Ok(())
}

fn erase_record(flash: &mut InternalFlash, block: u32) -> Result<()> {
    let offset = record_offset(block);
    flash.blocking_erase(offset, offset + ERASE_SIZE as u32)?;
    Ok(())
}
