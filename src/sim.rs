//! Simulator front door.
//!
//! [`Simulator`] is what a shell talks to: it owns the machine, the
//! breakpoint table and the console, tracks whether a program is loaded,
//! and validates every request before the engine or caches are touched.

use crate::breakpoints::{BreakpointError, Breakpoints};
use crate::config::{ConfigError, SimConfig};
use crate::console::Console;
use crate::cpu::execute::{Cpu, CpuError, StepOutcome};
use crate::cpu::memory::MemoryError;
use crate::program::image::ProgramImage;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::info;

pub use crate::cpu::execute::RunOutcome;

/// Program lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramState {
    /// Nothing loaded yet.
    Empty,
    /// A program is loaded and can be stepped.
    Loaded,
    /// The program executed HALT; load another to continue.
    Halted,
}

/// A machine plus the bookkeeping a shell needs.
pub struct Simulator {
    cpu: Cpu,
    breakpoints: Breakpoints,
    state: ProgramState,
    config: SimConfig,
    console: Box<dyn Console>,
}

impl Simulator {
    /// Create a simulator with an empty machine.
    pub fn new(config: SimConfig, console: Box<dyn Console>) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            cpu: Cpu::new(&config),
            breakpoints: Breakpoints::new(),
            state: ProgramState::Empty,
            config,
            console,
        })
    }

    /// Load `words` at `start` and reset the machine. On failure the
    /// previous program, if any, is left as it was.
    pub fn load(&mut self, words: &[u16], start: u16) -> Result<(), SimError> {
        self.cpu.load_program(start, words)?;
        self.breakpoints.clear();
        self.state = ProgramState::Loaded;
        info!(start = format_args!("x{:04X}", start), words = words.len(), "program loaded");
        Ok(())
    }

    /// Load a parsed image at its origin.
    pub fn load_image(&mut self, image: &ProgramImage) -> Result<(), SimError> {
        self.load(&image.words, image.origin)
    }

    /// Run one instruction cycle.
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        self.ensure_runnable()?;
        let outcome = self.cpu.step(self.console.as_mut())?;
        if outcome == StepOutcome::Halted {
            self.state = ProgramState::Halted;
        }
        Ok(outcome)
    }

    /// Run until HALT, a breakpoint, the PC leaving memory, or the
    /// configured cycle cap. A run that halts clears the breakpoints.
    pub fn run_until(&mut self) -> Result<RunOutcome, SimError> {
        self.run_cycles(self.config.max_cycles)
    }

    /// Like [`run_until`](Self::run_until) with an explicit cycle cap
    /// (0 = no limit). Front-ends that redraw between cycles run with a cap
    /// of 1.
    pub fn run_cycles(&mut self, max_cycles: u64) -> Result<RunOutcome, SimError> {
        self.ensure_runnable()?;
        let outcome = self.cpu.run_until(self.console.as_mut(), &self.breakpoints, max_cycles)?;

        match outcome {
            RunOutcome::Halted => {
                self.state = ProgramState::Halted;
                self.breakpoints.clear();
            }
            RunOutcome::BreakpointHit(addr) => {
                info!(addr = format_args!("x{:04X}", addr), "breakpoint reached");
            }
            RunOutcome::EndOfMemory(pc) => {
                info!(pc = format_args!("x{:04X}", pc), "program counter left memory");
            }
            RunOutcome::CycleLimit(n) => {
                info!(cycles = n, "cycle limit reached");
            }
        }
        Ok(outcome)
    }

    /// The word a program would read at `addr`.
    pub fn peek(&self, addr: u16) -> Result<u16, SimError> {
        Ok(self.cpu.peek(addr)?)
    }

    /// Overwrite the word at `addr`.
    pub fn poke(&mut self, addr: u16, value: u16) -> Result<(), SimError> {
        Ok(self.cpu.poke(addr, value)?)
    }

    /// Add a breakpoint at an address inside the loaded program's memory.
    pub fn set_breakpoint(&mut self, addr: u16) -> Result<(), SimError> {
        if self.state != ProgramState::Loaded {
            return Err(SimError::NoProgramLoaded);
        }
        self.cpu.mem.translate(addr)?;
        Ok(self.breakpoints.insert(addr)?)
    }

    /// Remove a breakpoint.
    pub fn clear_breakpoint(&mut self, addr: u16) -> Result<(), SimError> {
        Ok(self.breakpoints.remove(addr)?)
    }

    /// Words in the inclusive range `start..=end` as a program sees them
    /// (dirty cached words included). No machine state changes.
    pub fn save_range(&self, start: u16, end: u16) -> Result<Vec<u16>, SimError> {
        if start > end {
            return Err(SimError::InvalidRange { start, end });
        }
        (start..=end).map(|addr| self.peek(addr)).collect()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn console_mut(&mut self) -> &mut dyn Console {
        self.console.as_mut()
    }

    fn ensure_runnable(&self) -> Result<(), SimError> {
        match self.state {
            ProgramState::Loaded => Ok(()),
            ProgramState::Empty => Err(SimError::NoProgramLoaded),
            ProgramState::Halted => Err(SimError::ProgramHalted),
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("breakpoints", &self.breakpoints)
            .field("cpu", &self.cpu)
            .finish()
    }
}

/// Errors reported to the shell. None of them leave the machine changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("no program loaded")]
    NoProgramLoaded,

    #[error("program has halted; load another program")]
    ProgramHalted,

    #[error("invalid address range x{start:04X}..x{end:04X}")]
    InvalidRange { start: u16, end: u16 },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Breakpoint(#[from] BreakpointError),

    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
