//! # Mikan Emulation Core
//!
//! The bus and timing core of a GBA emulator: everything between the
//! ARM7TDMI and the peripherals, with cycle accuracy as the design goal.
//! No UI code, no renderer, no instruction decoder.
//!
//! ## Module Overview
//!
//! | Module          | Description                                         |
//! |-----------------|-----------------------------------------------------|
//! | [`gba`]         | Top-level system (start here)                       |
//! | [`bus`]         | Memory bus: region dispatch, waitstates, prefetch,  |
//! |                 | the execution loop                                  |
//! | [`scheduler`]   | Event scheduler owning wall-clock time              |
//! | [`cpu`]         | The seam the external ARM7TDMI plugs into           |
//! | [`cartridge`]   | Game Pak ROM image and backup detection             |
//! | [`backup`]      | SRAM / Flash / EEPROM backends                      |
//!
//! ## Quick Start
//!
//! ```ignore
//! use emu::{cartridge::Cartridge, gba::Gba};
//!
//! let rom = std::fs::read("game.gba")?;
//! let bios: [u8; 0x4000] = std::fs::read("gba_bios.bin")?.try_into()?;
//!
//! let mut gba = Gba::new(my_arm7tdmi, bios, Cartridge::new(rom));
//! loop { gba.run_for(280_896); } // one frame
//! ```

#[allow(clippy::cast_possible_truncation)]
mod bitwise;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::missing_panics_doc)]
pub mod bus;

pub mod backup;
pub mod cartridge;
pub mod cpu;
pub mod gba;
mod mmio;
pub mod scheduler;
