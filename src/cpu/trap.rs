//! Trap dispatcher.
//!
//! System services reached through `TRAP vector8`. Character I/O goes
//! through an injected [`Console`] so the core has no terminal dependency.

use crate::console::Console;
use crate::cpu::cache::Cache;
use crate::cpu::execute::CpuError;
use crate::cpu::memory::Memory;
use crate::cpu::registers::Registers;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

/// Known trap vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapVector {
    /// Read one raw character into R0.
    Getc = 0x20,
    /// Write the low byte of R0.
    Out = 0x21,
    /// Write the zero-terminated string at R0, one character per word.
    Puts = 0x22,
    /// Stop the program.
    Halt = 0x25,
}

impl TrapVector {
    pub fn from_vector(vector: u8) -> Option<Self> {
        match vector {
            0x20 => Some(TrapVector::Getc),
            0x21 => Some(TrapVector::Out),
            0x22 => Some(TrapVector::Puts),
            0x25 => Some(TrapVector::Halt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TrapVector::Getc => "GETC",
            TrapVector::Out => "OUT",
            TrapVector::Puts => "PUTS",
            TrapVector::Halt => "HALT",
        }
    }
}

/// What the engine should do after a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    Continue,
    Halt,
}

/// Run the service selected by `vector`.
///
/// PUTS reads its string through the data cache. Unknown vectors are
/// ignored.
pub fn dispatch(
    vector: u8,
    regs: &mut Registers,
    mem: &mut Memory,
    dcache: &mut Cache,
    io: &mut dyn Console,
) -> Result<TrapOutcome, CpuError> {
    let Some(trap) = TrapVector::from_vector(vector) else {
        warn!(vector = format_args!("x{:02X}", vector), "unknown trap vector, ignored");
        return Ok(TrapOutcome::Continue);
    };

    match trap {
        TrapVector::Halt => {
            info!(pc = format_args!("x{:04X}", regs.pc), "halt");
            return Ok(TrapOutcome::Halt);
        }
        TrapVector::Getc => {
            let byte = io.read_byte().map_err(console_error)?;
            regs.set(0, byte as u16);
        }
        TrapVector::Out => {
            io.write_byte(regs.get(0) as u8).map_err(console_error)?;
            io.flush().map_err(console_error)?;
        }
        TrapVector::Puts => {
            let start = regs.get(0);
            let len = string_len(start, mem, dcache)?;
            // the terminator is read too, so it lands in the cache
            for i in 0..=len {
                let offset = mem.translate(start.wrapping_add(i as u16))?;
                let word = dcache.read(offset, mem);
                if word != 0 {
                    io.write_byte(word as u8).map_err(console_error)?;
                }
            }
            io.flush().map_err(console_error)?;
        }
    }

    Ok(TrapOutcome::Continue)
}

/// Length of the zero-terminated string at `start`, as a program would
/// read it. Touches neither memory nor the cache. The walk covers memory
/// at most once, so a string with no terminator is an error, not a hang.
pub(crate) fn string_len(start: u16, mem: &Memory, dcache: &Cache) -> Result<usize, CpuError> {
    for i in 0..mem.capacity() {
        let offset = mem.translate(start.wrapping_add(i as u16))?;
        let word = dcache.probe(offset).unwrap_or_else(|| mem.load(offset));
        if word == 0 {
            return Ok(i);
        }
    }
    Err(CpuError::UnterminatedString(start))
}

fn console_error(e: std::io::Error) -> CpuError {
    CpuError::Console(e.to_string())
}
