//! Arithmetic-logic unit.
//!
//! The ALU is combinational: it holds the two operand latches and the
//! result latch so the debugger can show them, but every operation is a
//! pure function of its inputs. Arithmetic is 16-bit two's complement with
//! silent wraparound.

use serde::{Serialize, Deserialize};

/// ALU operation selected by the decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    And,
    Not,
}

/// Operand and result latches of the ALU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alu {
    /// Operand A (always source register 1).
    pub a: u16,
    /// Operand B (source register 2 or the sign-extended immediate).
    pub b: u16,
    /// Last result.
    pub r: u16,
}

impl Alu {
    /// Latch operands, compute, and latch the result.
    pub fn compute(&mut self, op: AluOp, a: u16, b: u16) -> u16 {
        self.a = a;
        self.b = b;
        self.r = apply(op, a, b);
        self.r
    }
}

/// Compute `op` over two 16-bit operands. `b` is ignored for NOT.
#[inline]
pub fn apply(op: AluOp, a: u16, b: u16) -> u16 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::And => a & b,
        AluOp::Not => !a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps() {
        assert_eq!(apply(AluOp::Add, 0xFFFF, 1), 0);
        assert_eq!(apply(AluOp::Add, 0x7FFF, 1), 0x8000);
        assert_eq!(apply(AluOp::Add, 0, 0xFFFF), 0xFFFF);
    }

    #[test]
    fn test_and_not() {
        assert_eq!(apply(AluOp::And, 0x0F0F, 0x00FF), 0x000F);
        assert_eq!(apply(AluOp::Not, 0x00FF, 0xDEAD), 0xFF00);
    }

    #[test]
    fn test_latches() {
        let mut alu = Alu::default();
        let r = alu.compute(AluOp::Add, 3, 4);
        assert_eq!(r, 7);
        assert_eq!((alu.a, alu.b, alu.r), (3, 4, 7));
    }
}
