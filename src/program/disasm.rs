//! Disassembler.
//!
//! Converts instruction words back to assembly text. PC-relative targets
//! are shown as absolute addresses when the word's own address is known.

use crate::cpu::decode::{decode, Instruction, Operand};
use crate::cpu::trap::TrapVector;

/// Disassemble a single word located at `addr`.
pub fn disassemble_instruction(word: u16, addr: u16) -> String {
    format_instruction(&decode(word), addr.wrapping_add(1))
}

/// Disassemble a slice of words loaded at `origin`.
pub fn disassemble(origin: u16, words: &[u16]) -> String {
    let mut output = String::new();
    output.push_str("; Disassembly\n");
    output.push_str("; -----------\n\n");

    for (i, word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        let line = disassemble_instruction(*word, addr);
        output.push_str(&format!("x{:04X}: x{:04X}  {}\n", addr, word, line));
    }

    output
}

/// Format a decoded instruction. `pc` is the incremented PC the
/// instruction would see.
fn format_instruction(instr: &Instruction, pc: u16) -> String {
    let target = |offset: u16| format!("x{:04X}", pc.wrapping_add(offset));

    match *instr {
        Instruction::Add { dr, sr1, operand } => format!("ADD R{}, R{}, {}", dr, sr1, format_operand(operand)),
        Instruction::And { dr, sr1, operand } => format!("AND R{}, R{}, {}", dr, sr1, format_operand(operand)),
        Instruction::Not { dr, sr } => format!("NOT R{}, R{}", dr, sr),

        Instruction::Ld { dr, offset } => format!("LD R{}, {}", dr, target(offset)),
        Instruction::Ldi { dr, offset } => format!("LDI R{}, {}", dr, target(offset)),
        Instruction::Ldr { dr, base, offset } => format!("LDR R{}, R{}, #{}", dr, base, offset as i16),
        Instruction::Lea { dr, offset } => format!("LEA R{}, {}", dr, target(offset)),
        Instruction::St { sr, offset } => format!("ST R{}, {}", sr, target(offset)),
        Instruction::Sti { sr, offset } => format!("STI R{}, {}", sr, target(offset)),
        Instruction::Str { sr, base, offset } => format!("STR R{}, R{}, #{}", sr, base, offset as i16),

        Instruction::Br { nzp: 0, .. } => "NOP".to_string(),
        Instruction::Br { nzp, offset } => format!("BR{} {}", format_nzp(nzp), target(offset)),
        Instruction::Jmp { base: 7 } => "RET".to_string(),
        Instruction::Jmp { base } => format!("JMP R{}", base),
        Instruction::Jsr { offset } => format!("JSR {}", target(offset)),
        Instruction::Jsrr { base } => format!("JSRR R{}", base),
        Instruction::Trap { vector } => match TrapVector::from_vector(vector) {
            Some(trap) => trap.name().to_string(),
            None => format!("TRAP x{:02X}", vector),
        },

        Instruction::Push { sr } => format!("PUSH R{}", sr),
        Instruction::Pop { dr } => format!("POP R{}", dr),

        Instruction::Reserved { word } => format!(".FILL x{:04X}", word),
    }
}

fn format_operand(operand: Operand) -> String {
    match operand {
        Operand::Reg(sr2) => format!("R{}", sr2),
        Operand::Imm(imm) => format!("#{}", imm as i16),
    }
}

fn format_nzp(nzp: u8) -> String {
    let mut s = String::new();
    if nzp & 0b100 != 0 {
        s.push('n');
    }
    if nzp & 0b010 != 0 {
        s.push('z');
    }
    if nzp & 0b001 != 0 {
        s.push('p');
    }
    s
}
