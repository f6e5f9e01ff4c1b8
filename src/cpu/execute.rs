//! Instruction-cycle engine.
//!
//! One call to [`Cpu::step`] drives a single instruction through
//! FETCH → DECODE → EVAL_ADDR → FETCH_OPERANDS → EXECUTE → STORE. The only
//! early exit is a HALT trap, which returns from EXECUTE. Instruction
//! fetch goes through the instruction cache and every data access of the
//! standard loads and stores goes through the data cache.
//!
//! PUSH and POP read and write main memory directly, bypassing the data
//! cache. A POP can therefore observe a stale word when the data cache
//! holds a dirty line for the same address, and a PUSH leaves any cached
//! copy of its target untouched.

use crate::breakpoints::Breakpoints;
use crate::config::SimConfig;
use crate::console::Console;
use crate::cpu::alu::{Alu, AluOp};
use crate::cpu::cache::{Cache, CacheKind};
use crate::cpu::decode::{self, Instruction, Operand};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::{Registers, LINK_REGISTER, STACK_POINTER};
use crate::cpu::trap::{self, TrapOutcome, TrapVector};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{trace, warn};

/// Phases of the instruction cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Fetch,
    Decode,
    EvalAddr,
    FetchOperands,
    Execute,
    Store,
    Done,
}

/// Result of one instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The cycle ran to completion.
    Continue,
    /// A HALT trap ended the program.
    Halted,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// A HALT trap was executed.
    Halted,
    /// The PC reached a breakpoint. The instruction there has not run.
    BreakpointHit(u16),
    /// The PC left memory.
    EndOfMemory(u16),
    /// The cycle cap was reached.
    CycleLimit(u64),
}

/// Transient registers that carry values between phases of one cycle.
/// They are kept after the cycle only so they can be displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latches {
    /// Instruction register.
    pub ir: u16,
    /// Memory address register.
    pub mar: u16,
    /// Memory data register.
    pub mdr: u16,
    /// Branch enable: CC & IR[11:9] is non-zero.
    pub ben: bool,
    /// ALU operand and result latches.
    pub alu: Alu,
}

/// The simulated machine: registers, memory and both caches.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Register file and condition code.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Instruction cache (fetch only).
    pub icache: Cache,
    /// Data cache.
    pub dcache: Cache,
    /// Cycle latches.
    pub latches: Latches,
    /// Completed instruction cycles (including a halting one).
    pub cycles: u64,
    /// Phase most recently entered.
    phase: Phase,
    /// Last decoded instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Build a machine from a validated configuration.
    pub fn new(config: &SimConfig) -> Self {
        let latency = config.latency();
        Self {
            regs: Registers::new(config.start_address),
            mem: Memory::new(config.start_address, config.memory_words),
            icache: Cache::new(CacheKind::Instruction, config.icache_lines, latency),
            dcache: Cache::new(CacheKind::Data, config.dcache_lines, latency),
            latches: Latches::default(),
            cycles: 0,
            phase: Phase::Done,
            last_instr: None,
        }
    }

    /// Load a program at `start`, resetting registers, caches and latches.
    ///
    /// Nothing changes when the image does not fit.
    pub fn load_program(&mut self, start: u16, program: &[u16]) -> Result<(), MemoryError> {
        self.mem.load_program(start, program)?;
        self.regs.reset(start);
        self.icache.reset();
        self.dcache.reset();
        self.latches = Latches::default();
        self.cycles = 0;
        self.phase = Phase::Done;
        self.last_instr = None;
        Ok(())
    }

    /// Execute one instruction cycle.
    ///
    /// A failed cycle leaves the machine as it was, so stepping again
    /// retries the same instruction. Every address the cycle will touch is
    /// checked before FETCH; a console failure rolls back the registers
    /// and latches.
    pub fn step(&mut self, io: &mut dyn Console) -> Result<StepOutcome, CpuError> {
        self.check_access()?;

        let saved = (self.regs.clone(), self.latches, self.phase);
        let result = self.cycle(io);
        if result.is_err() {
            (self.regs, self.latches, self.phase) = saved;
        }
        result
    }

    fn cycle(&mut self, io: &mut dyn Console) -> Result<StepOutcome, CpuError> {
        self.enter(Phase::Fetch);
        self.fetch()?;

        self.enter(Phase::Decode);
        let instr = self.decode();

        self.enter(Phase::EvalAddr);
        self.eval_addr(&instr)?;

        self.enter(Phase::FetchOperands);
        self.fetch_operands(&instr)?;

        self.enter(Phase::Execute);
        let outcome = self.execute(&instr, io)?;
        if outcome == TrapOutcome::Halt {
            self.finish(instr);
            return Ok(StepOutcome::Halted);
        }

        self.enter(Phase::Store);
        self.store(&instr)?;

        self.finish(instr);
        Ok(StepOutcome::Continue)
    }

    /// Step until a halt, a breakpoint, the PC leaving memory, or
    /// `max_cycles` cycles (0 = no limit).
    ///
    /// At least one cycle always runs, so a run started on a breakpoint
    /// moves past it. Breakpoints are checked only between cycles.
    pub fn run_until(
        &mut self,
        io: &mut dyn Console,
        breakpoints: &Breakpoints,
        max_cycles: u64,
    ) -> Result<RunOutcome, CpuError> {
        let mut executed = 0u64;
        loop {
            if !self.mem.contains(self.regs.pc) {
                return Ok(RunOutcome::EndOfMemory(self.regs.pc));
            }
            if self.step(io)? == StepOutcome::Halted {
                return Ok(RunOutcome::Halted);
            }
            executed += 1;

            let pc = self.regs.pc;
            if breakpoints.contains(pc) {
                return Ok(RunOutcome::BreakpointHit(pc));
            }
            if max_cycles != 0 && executed >= max_cycles {
                return Ok(RunOutcome::CycleLimit(executed));
            }
        }
    }

    // ==================== Phases ====================

    /// MAR := PC; PC := PC + 1; IR := I-cache[MAR]
    fn fetch(&mut self) -> Result<(), CpuError> {
        let offset = self.mem.translate(self.regs.pc)?;
        self.latches.mar = self.regs.advance_pc();
        self.latches.mdr = self.icache.read(offset, &mut self.mem);
        self.latches.ir = self.latches.mdr;
        Ok(())
    }

    fn decode(&mut self) -> Instruction {
        let ir = self.latches.ir;
        self.latches.ben = self.regs.cc.bits() & decode::dr(ir) != 0;
        decode::decode(ir)
    }

    fn eval_addr(&mut self, instr: &Instruction) -> Result<(), CpuError> {
        match *instr {
            Instruction::Trap { vector } => {
                self.latches.mar = vector as u16;
            }
            Instruction::Ld { offset, .. } | Instruction::St { offset, .. } => {
                self.latches.mar = self.regs.pc_relative(offset);
            }
            Instruction::Ldr { base, offset, .. } | Instruction::Str { base, offset, .. } => {
                self.latches.mar = self.regs.get(base).wrapping_add(offset);
            }
            Instruction::Br { offset, .. } => {
                if self.latches.ben {
                    self.regs.pc = self.regs.pc_relative(offset);
                }
            }
            Instruction::Ldi { offset, .. } | Instruction::Sti { offset, .. } => {
                self.latches.mar = self.regs.pc_relative(offset);
                self.latches.mdr = self.read_data(self.latches.mar)?;
                self.latches.mar = self.latches.mdr;
            }
            _ => {}
        }
        Ok(())
    }

    fn fetch_operands(&mut self, instr: &Instruction) -> Result<(), CpuError> {
        match *instr {
            Instruction::Add { sr1, operand, .. } | Instruction::And { sr1, operand, .. } => {
                self.latches.alu.a = self.regs.get(sr1);
                self.latches.alu.b = match operand {
                    Operand::Reg(sr2) => self.regs.get(sr2),
                    Operand::Imm(imm) => imm,
                };
            }
            Instruction::Not { sr, .. } => {
                self.latches.alu.a = self.regs.get(sr);
            }
            Instruction::Ld { .. } | Instruction::Ldr { .. } | Instruction::Ldi { .. } => {
                self.latches.mdr = self.read_data(self.latches.mar)?;
            }
            Instruction::St { sr, .. } | Instruction::Str { sr, .. } | Instruction::Sti { sr, .. } => {
                self.latches.mdr = self.regs.get(sr);
            }
            _ => {}
        }
        Ok(())
    }

    fn execute(&mut self, instr: &Instruction, io: &mut dyn Console) -> Result<TrapOutcome, CpuError> {
        let Latches { alu, .. } = self.latches;
        match *instr {
            Instruction::Add { .. } => {
                let r = self.latches.alu.compute(AluOp::Add, alu.a, alu.b);
                self.regs.set_cc(r);
            }
            Instruction::And { .. } => {
                let r = self.latches.alu.compute(AluOp::And, alu.a, alu.b);
                self.regs.set_cc(r);
            }
            Instruction::Not { .. } => {
                let r = self.latches.alu.compute(AluOp::Not, alu.a, 0);
                self.regs.set_cc(r);
            }
            Instruction::Trap { .. } => {
                let vector = self.latches.mar as u8;
                return trap::dispatch(vector, &mut self.regs, &mut self.mem, &mut self.dcache, io);
            }
            Instruction::Jmp { base } => {
                self.regs.pc = self.regs.get(base);
            }
            Instruction::Jsr { offset } => {
                self.regs.set(LINK_REGISTER as u8, self.regs.pc);
                self.regs.pc = self.regs.pc_relative(offset);
            }
            Instruction::Jsrr { base } => {
                // read the base first so JSRR R7 jumps to the old R7
                let target = self.regs.get(base);
                self.regs.set(LINK_REGISTER as u8, self.regs.pc);
                self.regs.pc = target;
            }
            Instruction::Push { sr } => {
                let sp = self.regs.gpr[STACK_POINTER].wrapping_sub(1);
                let offset = self.mem.translate(sp)?;
                self.mem.store(offset, self.regs.get(sr));
                self.regs.gpr[STACK_POINTER] = sp;
            }
            Instruction::Pop { dr } => {
                let sp = self.regs.gpr[STACK_POINTER];
                let value = self.mem.load(self.mem.translate(sp)?);
                self.regs.gpr[STACK_POINTER] = sp.wrapping_add(1);
                self.regs.set_with_cc(dr, value);
            }
            Instruction::Reserved { word } => {
                warn!(
                    pc = format_args!("x{:04X}", self.latches.mar),
                    word = format_args!("x{:04X}", word),
                    "invalid opcode, executed as no-op"
                );
            }
            _ => {}
        }
        Ok(TrapOutcome::Continue)
    }

    fn store(&mut self, instr: &Instruction) -> Result<(), CpuError> {
        match *instr {
            Instruction::Add { dr, .. } | Instruction::And { dr, .. } | Instruction::Not { dr, .. } => {
                self.regs.set(dr, self.latches.alu.r);
            }
            Instruction::Ld { dr, .. } | Instruction::Ldr { dr, .. } | Instruction::Ldi { dr, .. } => {
                self.regs.set_with_cc(dr, self.latches.mdr);
            }
            Instruction::St { .. } | Instruction::Str { .. } | Instruction::Sti { .. } => {
                let offset = self.mem.translate(self.latches.mar)?;
                self.dcache.write(offset, self.latches.mdr, &mut self.mem);
            }
            Instruction::Lea { dr, offset } => {
                self.regs.set_with_cc(dr, self.regs.pc_relative(offset));
            }
            _ => {}
        }
        Ok(())
    }

    // ==================== Helpers ====================

    /// Validate the addresses the next cycle will use without changing
    /// anything. The instruction and any pointer are read the way the
    /// cycle would read them: through the caches when a line holds them.
    fn check_access(&self) -> Result<(), CpuError> {
        let pc_offset = self.mem.translate(self.regs.pc)?;
        let ir = self.icache.probe(pc_offset).unwrap_or_else(|| self.mem.load(pc_offset));
        let next = self.regs.pc.wrapping_add(1);
        let sp = self.regs.gpr[STACK_POINTER];

        match decode::decode(ir) {
            Instruction::Ld { offset, .. } | Instruction::St { offset, .. } => {
                self.mem.translate(next.wrapping_add(offset))?;
            }
            Instruction::Ldr { base, offset, .. } | Instruction::Str { base, offset, .. } => {
                self.mem.translate(self.regs.get(base).wrapping_add(offset))?;
            }
            Instruction::Ldi { offset, .. } | Instruction::Sti { offset, .. } => {
                let pointer = self.peek(next.wrapping_add(offset))?;
                self.mem.translate(pointer)?;
            }
            Instruction::Push { .. } => {
                self.mem.translate(sp.wrapping_sub(1))?;
            }
            Instruction::Pop { .. } => {
                self.mem.translate(sp)?;
            }
            Instruction::Trap { vector } if TrapVector::from_vector(vector) == Some(TrapVector::Puts) => {
                trap::string_len(self.regs.get(0), &self.mem, &self.dcache)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        trace!(
            ?phase,
            pc = format_args!("x{:04X}", self.regs.pc),
            ir = format_args!("x{:04X}", self.latches.ir),
            mar = format_args!("x{:04X}", self.latches.mar),
            mdr = format_args!("x{:04X}", self.latches.mdr),
            cc = %self.regs.cc,
        );
    }

    fn finish(&mut self, instr: Instruction) {
        self.enter(Phase::Done);
        self.cycles += 1;
        self.last_instr = Some(instr);
    }

    /// Read through the data cache.
    fn read_data(&mut self, addr: u16) -> Result<u16, CpuError> {
        let offset = self.mem.translate(addr)?;
        Ok(self.dcache.read(offset, &mut self.mem))
    }

    /// The value a program would observe at `addr`: a cached data word if
    /// the data cache holds one, otherwise memory. No cache state changes.
    pub fn peek(&self, addr: u16) -> Result<u16, MemoryError> {
        let offset = self.mem.translate(addr)?;
        Ok(self.dcache.probe(offset).unwrap_or_else(|| self.mem.load(offset)))
    }

    /// Overwrite memory at `addr`, dropping any cached copy of that word.
    pub fn poke(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        let offset = self.mem.translate(addr)?;
        self.mem.store(offset, value);
        self.icache.invalidate(offset);
        self.dcache.invalidate(offset);
        Ok(())
    }

    /// Write every dirty data line back to memory.
    pub fn flush_caches(&mut self) -> usize {
        self.dcache.flush(&mut self.mem)
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Phase most recently entered.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(&SimConfig::default())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("latches", &self.latches)
            .field("icache", &self.icache)
            .field("dcache", &self.dcache)
            .finish()
    }
}

/// Errors that can occur during an instruction cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("console error: {0}")]
    Console(String),

    #[error("no string terminator in memory after x{0:04X}")]
    UnterminatedString(u16),
}
