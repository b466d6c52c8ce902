//! # CPU-facing seam
//!
//! The instruction decoder/executor is not part of this crate: the core
//! treats the ARM7TDMI as an opaque consumer of the memory bus. Two things
//! cross the seam:
//!
//! - [`CpuState`]: the few pieces of processor state the bus itself needs
//!   (program counter for BIOS gating and prefetch eligibility, the T bit
//!   for opcode width, the pipeline opcodes for open-bus values). The state
//!   lives *inside* the [`Bus`](crate::bus::Bus) so that every component
//!   reads it from the single shared state block instead of holding a
//!   back-pointer into the processor.
//! - [`Processor`]: the callbacks the execution loop drives. An
//!   implementation fetches opcodes and performs data accesses through the
//!   six bus entry points, updating `bus.state` as it goes.

pub mod hardware;

use serde::{Deserialize, Serialize};

use crate::bus::Bus;

/// Access kind declared by the CPU per the ARM7TDMI bus protocol.
///
/// Sequential means the previous bus access touched `address - width`;
/// the waitstate tables charge it more cheaply on the cartridge bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    NonSequential = 0,
    Sequential = 1,
}

/// Condensed program status register: only the fields the bus consults.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Psr {
    /// T bit: executing Thumb (16-bit) opcodes.
    pub thumb: bool,
    /// Current processor mode (the 5-bit CPSR mode field).
    pub mode: u8,
}

/// Processor state shared with the bus.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuState {
    /// Current fetch address (r15 points at the fetch pipeline stage).
    pub r15: u32,
    pub cpsr: Psr,
    /// Opcodes sitting in the pipeline: `pipe[n]` holds the opcode at
    /// `r15 + n * width`. Open-bus reads are derived from these.
    pub pipe: [u32; 2],
}

/// The instruction decoder/executor driving this core.
pub trait Processor {
    /// Execute a single instruction. All opcode fetches and data accesses
    /// go through the bus entry points, which charge their own cycles.
    fn step(&mut self, bus: &mut Bus);

    /// Enter the IRQ exception (update r15, CPSR and banked registers).
    fn signal_irq(&mut self, bus: &mut Bus);
}
