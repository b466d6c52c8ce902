//! Game Pak ROM image and its bus-visible quirks.
//!
//! The cartridge ROM is halfword-addressable memory behind a 16-bit data
//! bus; the lower 16 address bits and the data share the AD0-15 lines.
//! When the CPU reads past the end of the chip nothing drives the bus, so
//! it still carries the halfword address it just transferred: out-of-range
//! reads return `address / 2`. The mirror mask rounds the ROM size up to a
//! power of two, which is how the address decoder wraps smaller carts.
//!
//! The backup media kind is burned into every licensed ROM as a libgba ID
//! string, which is what real carts are detected by.

use serde::{Deserialize, Serialize};

use crate::backup::{Backup, BackupKind};

/// ID strings the SDK links into the ROM image, one per backup chip family.
const BACKUP_IDS: [(&[u8], BackupKind); 5] = [
    (b"EEPROM_V", BackupKind::Eeprom8K),
    (b"SRAM_V", BackupKind::Sram),
    (b"FLASH1M_V", BackupKind::Flash128),
    (b"FLASH512_V", BackupKind::Flash64),
    (b"FLASH_V", BackupKind::Flash64),
];

#[derive(Serialize, Deserialize)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    /// Mirror mask: ROM size rounded up to a power of two, minus one.
    pub mask: u32,
    pub backup: Backup,
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::with_backup(Vec::new(), BackupKind::None)
    }
}

impl Cartridge {
    /// Load a ROM image, auto-detecting the backup kind from its ID string.
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        let kind = detect_backup(&rom);
        Self::with_backup(rom, kind)
    }

    /// Load a ROM image with an explicitly chosen backup kind (overrides
    /// detection, e.g. for the 512-byte EEPROM parts the ID string cannot
    /// distinguish).
    #[must_use]
    pub fn with_backup(rom: Vec<u8>, kind: BackupKind) -> Self {
        let mask = rom.len().next_power_of_two() as u32 - 1;
        Self {
            rom,
            mask,
            backup: Backup::new(kind),
        }
    }

    pub fn size(&self) -> u32 {
        self.rom.len() as u32
    }

    /// Whether an access in region 0x0D targets the EEPROM rather than the
    /// ROM mirror. Small carts decode the whole upper 16 MiB half; 32 MiB
    /// carts only spare the top 256 bytes.
    pub fn is_eeprom_address(&self, address: u32) -> bool {
        if !self.backup.is_eeprom() {
            return false;
        }
        if self.size() > 0x0100_0000 {
            address & 0x01FF_FF00 == 0x01FF_FF00
        } else {
            address & 0x0100_0000 != 0
        }
    }

    // The reads below take an already-masked address. The 16/32-bit
    // variants treat an access *overlapping* the end of the image as open
    // cart, not just one starting past it: an odd-sized image must not
    // index beyond the buffer. Shipped ROMs are even-sized, where both
    // checks agree.

    pub fn read_u8(&self, address: u32) -> u8 {
        if address >= self.size() {
            return (address / 2) as u8;
        }
        self.rom[address as usize]
    }

    pub fn read_u16(&self, address: u32) -> u16 {
        if (address | 1) >= self.size() {
            return (address / 2) as u16;
        }
        let offset = (address & !1) as usize;
        u16::from_le_bytes([self.rom[offset], self.rom[offset + 1]])
    }

    pub fn read_u32(&self, address: u32) -> u32 {
        if (address | 3) >= self.size() {
            return (address / 2) & 0xFFFF | ((address + 2) / 2) << 16;
        }
        let offset = (address & !3) as usize;
        u32::from_le_bytes([
            self.rom[offset],
            self.rom[offset + 1],
            self.rom[offset + 2],
            self.rom[offset + 3],
        ])
    }
}

fn detect_backup(rom: &[u8]) -> BackupKind {
    for (id, kind) in BACKUP_IDS {
        if rom.windows(id.len()).any(|window| window == id) {
            return kind;
        }
    }
    BackupKind::None
}
