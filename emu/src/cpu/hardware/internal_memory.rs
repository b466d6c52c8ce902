//! On-board memory buffers: BIOS, EWRAM, IWRAM, palette, VRAM and OAM.
//!
//! This module only stores bytes; region decoding, mirroring and cycle
//! accounting happen in the bus. The buffers are exactly hardware-sized:
//!
//! | Buffer | Size    | Bus width |
//! |--------|---------|-----------|
//! | BIOS   | 16 KiB  | 32 bit    |
//! | EWRAM  | 256 KiB | 16 bit    |
//! | IWRAM  | 32 KiB  | 32 bit    |
//! | PRAM   | 1 KiB   | 16 bit    |
//! | VRAM   | 96 KiB  | 16 bit    |
//! | OAM    | 1 KiB   | 32 bit    |
//!
//! `bios_opcode` latches the last word successfully fetched from BIOS and
//! is what BIOS reads return while the program counter is outside BIOS.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    /// From 0x00000000 to 0x00003FFF (16 KiB), read-only.
    pub bios: Vec<u8>,

    /// From 0x02000000, mirrored every 256 KiB.
    pub ewram: Vec<u8>,

    /// From 0x03000000, mirrored every 32 KiB.
    pub iwram: Vec<u8>,

    /// From 0x05000000, mirrored every 1 KiB.
    pub pram: Vec<u8>,

    /// From 0x06000000. 96 KiB mirrored in a 128 KiB window: the upper
    /// 32 KiB window maps the OBJ half again (see [`fold_vram`]).
    pub vram: Vec<u8>,

    /// From 0x07000000, mirrored every 1 KiB.
    pub oam: Vec<u8>,

    /// Last word fetched from BIOS while executing inside BIOS.
    pub bios_opcode: u32,
}

impl InternalMemory {
    #[must_use]
    pub fn new(bios: [u8; 0x4000]) -> Self {
        Self {
            bios: bios.to_vec(),
            ewram: vec![0; 0x40000],
            iwram: vec![0; 0x8000],
            pram: vec![0; 0x400],
            vram: vec![0; 0x18000],
            oam: vec![0; 0x400],
            bios_opcode: 0,
        }
    }

    /// Clear every RAM buffer and the BIOS latch; the BIOS image stays.
    pub fn clear(&mut self) {
        self.ewram.fill(0);
        self.iwram.fill(0);
        self.pram.fill(0);
        self.vram.fill(0);
        self.oam.fill(0);
        self.bios_opcode = 0;
    }
}

impl Default for InternalMemory {
    fn default() -> Self {
        Self::new([0; 0x4000])
    }
}

/// Fold a VRAM address into the 96 KiB buffer: the 128 KiB window mirrors
/// the 32 KiB OBJ half into its upper quarter.
pub(crate) const fn fold_vram(address: u32) -> u32 {
    let address = address & 0x1FFFF;
    if address >= 0x18000 {
        address & !0x8000
    } else {
        address
    }
}

// Typed little-endian accessors. The low address bits below the access
// width are ignored, as the data bus does.

pub(crate) fn read_byte(buffer: &[u8], offset: u32) -> u8 {
    buffer[offset as usize]
}

pub(crate) fn read_half(buffer: &[u8], offset: u32) -> u16 {
    let offset = (offset & !1) as usize;
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

pub(crate) fn read_word(buffer: &[u8], offset: u32) -> u32 {
    let offset = (offset & !3) as usize;
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

pub(crate) fn write_byte(buffer: &mut [u8], offset: u32, value: u8) {
    buffer[offset as usize] = value;
}

pub(crate) fn write_half(buffer: &mut [u8], offset: u32, value: u16) {
    let offset = (offset & !1) as usize;
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_word(buffer: &mut [u8], offset: u32, value: u32) {
    let offset = (offset & !3) as usize;
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_and_word_are_little_endian() {
        let mut buffer = vec![0; 8];
        write_word(&mut buffer, 0, 0x1234_5678);

        assert_eq!(buffer[0], 0x78);
        assert_eq!(buffer[3], 0x12);
        assert_eq!(read_half(&buffer, 0), 0x5678);
        assert_eq!(read_half(&buffer, 2), 0x1234);
        assert_eq!(read_word(&buffer, 0), 0x1234_5678);
    }

    #[test]
    fn unaligned_offsets_are_forced_down() {
        let mut buffer = vec![0; 8];
        write_half(&mut buffer, 5, 0xBEEF);

        assert_eq!(read_half(&buffer, 4), 0xBEEF);
        assert_eq!(read_word(&buffer, 7), 0x0000_BEEF);
    }

    #[test]
    fn vram_obj_mirror_folds() {
        assert_eq!(fold_vram(0x0001_7FFF), 0x1_7FFF);
        assert_eq!(fold_vram(0x0001_8000), 0x1_0000);
        assert_eq!(fold_vram(0x0001_FFFF), 0x1_7FFF);
        // 128 KiB mirror of the whole window
        assert_eq!(fold_vram(0x0002_0000), 0x0);
    }

    #[test]
    fn clear_keeps_bios() {
        let mut bios = [0; 0x4000];
        bios[0] = 0xEA;
        let mut memory = InternalMemory::new(bios);
        memory.ewram[0] = 1;
        memory.bios_opcode = 5;

        memory.clear();

        assert_eq!(memory.bios[0], 0xEA);
        assert_eq!(memory.ewram[0], 0);
        assert_eq!(memory.bios_opcode, 0);
    }
}
