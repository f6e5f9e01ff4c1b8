//! Register file and condition code.
//!
//! - R0-R7: 16-bit general registers (R6 doubles as stack pointer for
//!   PUSH/POP, R7 receives the return address from JSR/JSRR)
//! - PC: 16-bit program counter (absolute address)
//! - CC: one-hot N/Z/P sign class of the last value written to a register

use serde::{Serialize, Deserialize};
use std::fmt;

/// Register used as the stack pointer by PUSH/POP.
pub const STACK_POINTER: usize = 6;

/// Register receiving the return address on subroutine calls.
pub const LINK_REGISTER: usize = 7;

/// Condition code. Exactly one flag is set at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionCode {
    N,
    Z,
    P,
}

impl ConditionCode {
    /// Classify a value as a 16-bit two's-complement number.
    pub fn of(value: u16) -> Self {
        match (value as i16).signum() {
            -1 => ConditionCode::N,
            0 => ConditionCode::Z,
            _ => ConditionCode::P,
        }
    }

    /// The flag as the 3-bit `nzp` mask used by branch instructions.
    pub fn bits(self) -> u8 {
        match self {
            ConditionCode::N => 0b100,
            ConditionCode::Z => 0b010,
            ConditionCode::P => 0b001,
        }
    }

    /// Individual flags as `(n, z, p)`.
    pub fn flags(self) -> (bool, bool, bool) {
        (
            self == ConditionCode::N,
            self == ConditionCode::Z,
            self == ConditionCode::P,
        )
    }
}

impl Default for ConditionCode {
    fn default() -> Self {
        ConditionCode::Z
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, z, p) = self.flags();
        write!(f, "N:{} Z:{} P:{}", n as u8, z as u8, p as u8)
    }
}

/// The register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    pub gpr: [u16; 8],

    /// Program counter
    pub pc: u16,

    /// Condition code
    pub cc: ConditionCode,
}

impl Registers {
    /// Create a register file with every register zero, PC at `pc` and CC = Z.
    pub fn new(pc: u16) -> Self {
        Self {
            gpr: [0; 8],
            pc,
            cc: ConditionCode::Z,
        }
    }

    /// Reset all registers, placing the PC at `pc`.
    pub fn reset(&mut self, pc: u16) {
        *self = Self::new(pc);
    }

    /// Read a general register. Only the low three bits of `index` are used.
    #[inline]
    pub fn get(&self, index: u8) -> u16 {
        self.gpr[(index & 0x7) as usize]
    }

    /// Write a general register without touching CC.
    #[inline]
    pub fn set(&mut self, index: u8, value: u16) {
        self.gpr[(index & 0x7) as usize] = value;
    }

    /// Write a general register and update CC from the stored value.
    pub fn set_with_cc(&mut self, index: u8, value: u16) {
        self.set(index, value);
        self.set_cc(value);
    }

    /// Set CC from the sign of `value`.
    pub fn set_cc(&mut self, value: u16) {
        self.cc = ConditionCode::of(value);
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// PC plus a sign-extended offset.
    #[inline]
    pub fn pc_relative(&self, offset: u16) -> u16 {
        self.pc.wrapping_add(offset)
    }
}
