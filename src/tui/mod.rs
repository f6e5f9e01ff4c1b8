//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Registers, condition code and cycle latches
//! - Both caches line by line, with hit/miss counters
//! - Memory view and disassembly around the PC
//! - Step/run/breakpoint controls and the program's console output

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
