//! Program files and listings.
//!
//! This module provides:
//! - The hex program image format (load and save)
//! - A disassembler for listings and the debugger views

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_instruction};
pub use image::{ProgramImage, ImageError, load_image, parse_image, save_words};
