//! Cartridge backup storage backends.
//!
//! The backup chip is a small closed set of kinds, so it is a tagged enum
//! rather than a trait object: the bus hot path stays monomorphic.
//!
//! - **SRAM**: 32 KiB of battery-backed bytes, nothing clever.
//! - **Flash**: 64 KiB or 128 KiB parts driven by a command state machine
//!   (two-byte unlock at 0x5555/0x2AAA, ID mode, chip/sector erase, single
//!   byte program that can only clear bits, bank switch on 128 KiB parts).
//! - **EEPROM**: 512 B or 8 KiB serial parts wired to the ROM bus; commands
//!   and data arrive one bit at a time through region 0x0D.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    None,
    Sram,
    Flash64,
    Flash128,
    Eeprom512,
    Eeprom8K,
}

#[derive(Serialize, Deserialize)]
pub enum Backup {
    None,
    Sram(Sram),
    Flash(Flash),
    Eeprom(Eeprom),
}

impl Backup {
    #[must_use]
    pub fn new(kind: BackupKind) -> Self {
        match kind {
            BackupKind::None => Self::None,
            BackupKind::Sram => Self::Sram(Sram::new()),
            BackupKind::Flash64 => Self::Flash(Flash::new(false)),
            BackupKind::Flash128 => Self::Flash(Flash::new(true)),
            BackupKind::Eeprom512 => Self::Eeprom(Eeprom::new(6)),
            BackupKind::Eeprom8K => Self::Eeprom(Eeprom::new(14)),
        }
    }

    pub fn kind(&self) -> BackupKind {
        match self {
            Self::None => BackupKind::None,
            Self::Sram(_) => BackupKind::Sram,
            Self::Flash(flash) if flash.banked => BackupKind::Flash128,
            Self::Flash(_) => BackupKind::Flash64,
            Self::Eeprom(eeprom) if eeprom.address_bits == 6 => BackupKind::Eeprom512,
            Self::Eeprom(_) => BackupKind::Eeprom8K,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn is_eeprom(&self) -> bool {
        matches!(self, Self::Eeprom(_))
    }

    pub fn read(&mut self, address: u32) -> u8 {
        match self {
            Self::None => 0,
            Self::Sram(sram) => sram.read(address),
            Self::Flash(flash) => flash.read(address),
            Self::Eeprom(eeprom) => eeprom.read(),
        }
    }

    pub fn write(&mut self, address: u32, value: u8) {
        match self {
            Self::None => {}
            Self::Sram(sram) => sram.write(address, value),
            Self::Flash(flash) => flash.write(address, value),
            Self::Eeprom(eeprom) => eeprom.write(value),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Sram {
    data: Vec<u8>,
}

impl Sram {
    fn new() -> Self {
        Self {
            data: vec![0xFF; 0x8000],
        }
    }

    fn read(&self, address: u32) -> u8 {
        self.data[(address & 0x7FFF) as usize]
    }

    fn write(&mut self, address: u32, value: u8) {
        self.data[(address & 0x7FFF) as usize] = value;
    }
}

/// Flash command state, advanced by writes to the command addresses.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FlashState {
    #[default]
    Ready,
    /// Received 0xAA at 0x5555.
    Command1,
    /// Received 0x55 at 0x2AAA; the next write selects the operation.
    Command2,
    /// Reads return the chip ID until the reset command.
    IdMode,
    /// Received 0x80; an erase needs a second unlock sequence.
    EraseCommand,
    EraseCommand1,
    EraseCommand2,
    /// Next write selects the active 64 KiB bank.
    BankSelect,
    /// Next write programs a byte.
    WriteCommand,
}

#[derive(Serialize, Deserialize)]
pub struct Flash {
    data: Vec<u8>,
    state: FlashState,
    bank: u8,
    banked: bool,
}

impl Flash {
    fn new(banked: bool) -> Self {
        Self {
            data: vec![0xFF; if banked { 0x20000 } else { 0x10000 }],
            state: FlashState::Ready,
            bank: 0,
            banked,
        }
    }

    /// (manufacturer, device): Sanyo for the 128 KiB part, SST for 64 KiB.
    fn chip_id(&self) -> (u8, u8) {
        if self.banked {
            (0x62, 0x13)
        } else {
            (0xBF, 0xD4)
        }
    }

    fn offset(&self, address: u32) -> usize {
        (usize::from(self.bank) << 16) | (address & 0xFFFF) as usize
    }

    fn read(&self, address: u32) -> u8 {
        let offset = address & 0xFFFF;
        if self.state == FlashState::IdMode {
            let (manufacturer, device) = self.chip_id();
            return match offset {
                0 => manufacturer,
                1 => device,
                _ => 0xFF,
            };
        }
        self.data[self.offset(address)]
    }

    fn write(&mut self, address: u32, value: u8) {
        let offset = address & 0xFFFF;
        tracing::debug!("flash write {offset:#06X} = {value:#04X} in {:?}", self.state);

        match self.state {
            FlashState::Ready => {
                if offset == 0x5555 && value == 0xAA {
                    self.state = FlashState::Command1;
                }
            }
            FlashState::Command1 => {
                self.state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::Command2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Command2 => {
                self.state = FlashState::Ready;
                if offset == 0x5555 {
                    match value {
                        0x90 => self.state = FlashState::IdMode,
                        0xF0 => {}
                        0x80 => self.state = FlashState::EraseCommand,
                        0xA0 => self.state = FlashState::WriteCommand,
                        0xB0 if self.banked => self.state = FlashState::BankSelect,
                        _ => tracing::debug!("flash: unknown command {value:#04X}"),
                    }
                }
            }
            FlashState::IdMode => {
                if value == 0xF0 {
                    self.state = FlashState::Ready;
                } else if offset == 0x5555 && value == 0xAA {
                    self.state = FlashState::Command1;
                }
            }
            FlashState::EraseCommand => {
                self.state = if offset == 0x5555 && value == 0xAA {
                    FlashState::EraseCommand1
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseCommand1 => {
                self.state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::EraseCommand2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseCommand2 => {
                if offset == 0x5555 && value == 0x10 {
                    self.data.fill(0xFF);
                } else if value == 0x30 {
                    // 4 KiB sector erase
                    let base = self.offset(address & 0xF000);
                    self.data[base..base + 0x1000].fill(0xFF);
                }
                self.state = FlashState::Ready;
            }
            FlashState::BankSelect => {
                if offset == 0 {
                    self.bank = value & 1;
                }
                self.state = FlashState::Ready;
            }
            FlashState::WriteCommand => {
                // Programming can only clear bits; erase brings them back.
                let offset = self.offset(address);
                self.data[offset] &= value;
                self.state = FlashState::Ready;
            }
        }
    }
}

/// Serial EEPROM protocol phase.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EepromState {
    #[default]
    Idle,
    /// First command bit (1) seen, waiting for the second.
    Command,
    /// Shifting in the address of a read request.
    ReadAddress,
    /// Shifting in the address of a write request.
    WriteAddress,
    /// Shifting in 64 data bits of a write request.
    WriteData,
    /// Waiting for the terminating 0 bit of a write request.
    WriteStop,
    /// Waiting for the terminating 0 bit of a read request.
    ReadStop,
    /// Shifting out 4 dummy bits plus 64 data bits.
    ReadData,
}

#[derive(Serialize, Deserialize)]
pub struct Eeprom {
    /// 8-byte blocks, addressed by block number.
    data: Vec<u8>,
    /// 6 on 512 B parts, 14 on 8 KiB parts.
    address_bits: u8,
    state: EepromState,
    shift: u64,
    bits: u8,
    address: u32,
}

impl Eeprom {
    fn new(address_bits: u8) -> Self {
        // 64 blocks of 8 bytes on the 512 B part; the 8 KiB part takes
        // 14-bit addresses but only decodes 1024 blocks.
        Self {
            data: vec![0xFF; if address_bits == 6 { 0x200 } else { 0x2000 }],
            address_bits,
            state: EepromState::Idle,
            shift: 0,
            bits: 0,
            address: 0,
        }
    }

    fn block(&self) -> usize {
        let blocks = self.data.len() / 8;
        (self.address as usize % blocks) * 8
    }

    /// Shift one bit in. Only the data bus lsb is connected.
    fn write(&mut self, value: u8) {
        let bit = u64::from(value & 1);

        match self.state {
            EepromState::Idle => {
                if bit == 1 {
                    self.state = EepromState::Command;
                }
            }
            EepromState::Command => {
                self.state = if bit == 1 {
                    EepromState::ReadAddress
                } else {
                    EepromState::WriteAddress
                };
                self.shift = 0;
                self.bits = 0;
            }
            EepromState::ReadAddress | EepromState::WriteAddress => {
                self.shift = self.shift << 1 | bit;
                self.bits += 1;
                if self.bits == self.address_bits {
                    self.address = self.shift as u32;
                    self.shift = 0;
                    self.bits = 0;
                    self.state = if self.state == EepromState::ReadAddress {
                        EepromState::ReadStop
                    } else {
                        EepromState::WriteData
                    };
                }
            }
            EepromState::WriteData => {
                self.shift = self.shift << 1 | bit;
                self.bits += 1;
                if self.bits == 64 {
                    let block = self.block();
                    self.data[block..block + 8].copy_from_slice(&self.shift.to_be_bytes());
                    tracing::debug!("eeprom write block {:#06X}", self.address);
                    self.state = EepromState::WriteStop;
                }
            }
            EepromState::WriteStop => {
                self.state = EepromState::Idle;
            }
            EepromState::ReadStop => {
                let block = self.block();
                self.shift = u64::from_be_bytes(self.data[block..block + 8].try_into().unwrap());
                self.bits = 0;
                self.state = EepromState::ReadData;
            }
            EepromState::ReadData => {
                // Stray writes mid-readout restart the command phase.
                self.state = if bit == 1 {
                    EepromState::Command
                } else {
                    EepromState::Idle
                };
            }
        }
    }

    /// Shift one bit out: 4 dummy bits, then the 64 data bits msb first.
    /// Outside a read request the chip reports ready (1).
    fn read(&mut self) -> u8 {
        if self.state != EepromState::ReadData {
            return 1;
        }

        self.bits += 1;
        if self.bits <= 4 {
            return 0;
        }

        let bit = (self.shift >> 63) as u8;
        self.shift <<= 1;
        if self.bits == 68 {
            self.state = EepromState::Idle;
        }
        bit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sram_round_trips() {
        let mut backup = Backup::new(BackupKind::Sram);
        backup.write(0x0E00_0123, 0xAB);

        assert_eq!(backup.read(0x0E00_0123), 0xAB);
        // 32 KiB mirror
        assert_eq!(backup.read(0x0E00_8123), 0xAB);
    }

    #[test]
    fn flash_id_mode() {
        let mut backup = Backup::new(BackupKind::Flash128);
        backup.write(0x5555, 0xAA);
        backup.write(0x2AAA, 0x55);
        backup.write(0x5555, 0x90);

        assert_eq!(backup.read(0x0000), 0x62);
        assert_eq!(backup.read(0x0001), 0x13);

        backup.write(0x5555, 0xF0);
        assert_eq!(backup.read(0x0000), 0xFF);
    }

    fn unlock(backup: &mut Backup, command: u8) {
        backup.write(0x5555, 0xAA);
        backup.write(0x2AAA, 0x55);
        backup.write(0x5555, command);
    }

    fn program(backup: &mut Backup, address: u32, value: u8) {
        unlock(backup, 0xA0);
        backup.write(address, value);
    }

    #[test]
    fn flash_program_clears_bits_only() {
        let mut backup = Backup::new(BackupKind::Flash64);

        program(&mut backup, 0x0100, 0xF0);
        program(&mut backup, 0x0100, 0x0F);

        assert_eq!(backup.read(0x0100), 0x00);
    }

    #[test]
    fn flash_sector_erase() {
        let mut backup = Backup::new(BackupKind::Flash64);
        program(&mut backup, 0x1200, 0x00);

        unlock(&mut backup, 0x80);
        backup.write(0x5555, 0xAA);
        backup.write(0x2AAA, 0x55);
        backup.write(0x1000, 0x30);

        assert_eq!(backup.read(0x1200), 0xFF);
    }

    #[test]
    fn flash_bank_switch() {
        let mut backup = Backup::new(BackupKind::Flash128);

        program(&mut backup, 0x0040, 0x00);

        unlock(&mut backup, 0xB0);
        backup.write(0x0000, 1);
        assert_eq!(backup.read(0x0040), 0xFF);

        unlock(&mut backup, 0xB0);
        backup.write(0x0000, 0);
        assert_eq!(backup.read(0x0040), 0x00);
    }

    fn eeprom_request(eeprom: &mut Eeprom, bits: &[u8]) {
        for bit in bits {
            eeprom.write(*bit);
        }
    }

    fn address_bits(address: u32, width: u8) -> Vec<u8> {
        (0..width)
            .rev()
            .map(|bit| ((address >> bit) & 1) as u8)
            .collect()
    }

    #[test]
    fn eeprom_write_then_read_round_trips() {
        let mut eeprom = Eeprom::new(6);
        let payload: u64 = 0xDEAD_BEEF_0BAD_F00D;

        // Write request: "10", address, 64 data bits, stop bit.
        eeprom_request(&mut eeprom, &[1, 0]);
        eeprom_request(&mut eeprom, &address_bits(3, 6));
        for bit in (0..64).rev() {
            eeprom.write(((payload >> bit) & 1) as u8);
        }
        eeprom.write(0);
        assert_eq!(eeprom.state, EepromState::Idle);

        // Read request: "11", address, stop bit.
        eeprom_request(&mut eeprom, &[1, 1]);
        eeprom_request(&mut eeprom, &address_bits(3, 6));
        eeprom.write(0);

        let mut value: u64 = 0;
        for _ in 0..4 {
            assert_eq!(eeprom.read(), 0);
        }
        for _ in 0..64 {
            value = value << 1 | u64::from(eeprom.read());
        }

        assert_eq!(value, payload);
        // Back to ready.
        assert_eq!(eeprom.read(), 1);
    }

    #[test]
    fn eeprom_reports_ready_when_idle() {
        let mut eeprom = Eeprom::new(14);
        assert_eq!(eeprom.read(), 1);
    }
}
