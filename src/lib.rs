//! # SLC-3 Simulator
//!
//! An instruction-cycle simulator for a 16-bit educational load/store
//! processor. Each step walks one instruction through the six classic
//! phases (fetch, decode, evaluate address, fetch operands, execute,
//! store) so the machine can be inspected between instructions.
//!
//! Memory sits behind two direct-mapped write-back caches, one for
//! instruction fetch and one for data, so hit/miss/eviction behaviour is
//! observable while stepping.

pub mod cpu;
pub mod breakpoints;
pub mod config;
pub mod console;
pub mod program;
pub mod sim;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, Memory, Registers, Instruction, ConditionCode, Cache, StepOutcome};
pub use breakpoints::Breakpoints;
pub use config::{SimConfig, ConfigError};
pub use console::{Console, BufferConsole, TerminalConsole};
pub use program::{ProgramImage, ImageError, load_image, parse_image, save_words, disassemble};
pub use sim::{Simulator, SimError, RunOutcome, ProgramState};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
