//! End-to-end runs through the public simulator interface.

use slc3::cpu::cache::Access;
use slc3::cpu::decode::{encode, Instruction, Operand};
use slc3::{
    parse_image, BufferConsole, ConditionCode, RunOutcome, SimConfig, SimError, Simulator,
    StepOutcome,
};

const START: u16 = 0x3000;
const HALT: Instruction = Instruction::Trap { vector: 0x25 };

fn simulator() -> Simulator {
    Simulator::new(SimConfig::default(), Box::new(BufferConsole::default())).unwrap()
}

fn load(sim: &mut Simulator, program: &[Instruction]) {
    let words: Vec<u16> = program.iter().map(encode).collect();
    sim.load(&words, START).unwrap();
}

#[test]
fn lea_then_halt_from_image_text() {
    let image = parse_image("3000\nE005\nF025\n").unwrap();
    let mut sim = simulator();
    sim.load_image(&image).unwrap();

    assert_eq!(sim.step(), Ok(StepOutcome::Continue));
    assert_eq!(sim.cpu().regs.pc, START + 1);
    assert_eq!(sim.cpu().regs.get(0), START + 6);
    assert_eq!(sim.cpu().regs.cc, ConditionCode::P);

    assert_eq!(sim.step(), Ok(StepOutcome::Halted));
    assert_eq!(sim.step(), Err(SimError::ProgramHalted));
}

#[test]
fn add_minus_one_to_zero() {
    let mut sim = simulator();
    load(&mut sim, &[
        Instruction::Add { dr: 1, sr1: 1, operand: Operand::Imm(0xFFFF) },
        HALT,
    ]);

    sim.step().unwrap();
    assert_eq!(sim.cpu().regs.get(1), 0xFFFF);
    assert_eq!(sim.cpu().regs.cc, ConditionCode::N);
}

#[test]
fn store_then_reload_single_miss() {
    let mut sim = simulator();
    load(&mut sim, &[
        Instruction::Add { dr: 0, sr1: 0, operand: Operand::Imm(7) },
        Instruction::St { sr: 0, offset: 2 },
        Instruction::Ld { dr: 3, offset: 1 },
        HALT,
    ]);
    let x = START + 4;

    assert_eq!(sim.run_until(), Ok(RunOutcome::Halted));
    assert_eq!(sim.cpu().regs.get(3), 7);

    let stats = sim.cpu().dcache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.write_backs, 0);

    let offset = sim.cpu().mem.translate(x).unwrap();
    assert_eq!(sim.cpu().dcache.last_access(), Some((offset, Access::Hit)));
    // the store is still only in the cache
    assert_eq!(sim.cpu().mem.read(x), Ok(0));
    assert_eq!(sim.peek(x), Ok(7));
}

#[test]
fn breakpoint_stops_before_instruction() {
    let mut sim = simulator();
    load(&mut sim, &[
        Instruction::Add { dr: 0, sr1: 0, operand: Operand::Imm(1) },
        Instruction::Add { dr: 0, sr1: 0, operand: Operand::Imm(1) },
        Instruction::Add { dr: 2, sr1: 2, operand: Operand::Imm(1) },
        HALT,
    ]);
    sim.set_breakpoint(START + 2).unwrap();

    assert_eq!(sim.run_until(), Ok(RunOutcome::BreakpointHit(START + 2)));
    assert_eq!(sim.cpu().regs.pc, START + 2);
    assert_eq!(sim.cpu().regs.get(0), 2);
    assert_eq!(sim.cpu().regs.get(2), 0);

    assert_eq!(sim.run_until(), Ok(RunOutcome::Halted));
    assert_eq!(sim.cpu().regs.get(2), 1);
    assert!(sim.breakpoints().is_empty());
}

#[test]
fn hello_world_with_subroutine_and_stack() {
    //        LEA R6, x3100 ; LEA R0, MSG ; JSR PRINT ; HALT
    // PRINT: PUSH R7 ; PUTS ; POP R7 ; RET
    // MSG:   "Hi\n"
    let mut program = vec![
        Instruction::Lea { dr: 6, offset: 0xFF },
        Instruction::Lea { dr: 0, offset: 6 },
        Instruction::Jsr { offset: 1 },
        HALT,
        Instruction::Push { sr: 7 },
        Instruction::Trap { vector: 0x22 },
        Instruction::Pop { dr: 7 },
        Instruction::Jmp { base: 7 },
    ];
    program.extend("Hi\n".bytes().map(|b| Instruction::Reserved { word: b as u16 }));

    let console = BufferConsole::default();
    let config = SimConfig { max_cycles: 100, ..SimConfig::default() };
    let mut sim = Simulator::new(config, Box::new(console.clone())).unwrap();
    load(&mut sim, &program);

    assert_eq!(sim.run_until(), Ok(RunOutcome::Halted));
    assert_eq!(console.output(), "Hi\n");
    assert_eq!(sim.cpu().regs.get(6), START + 0x100);
    assert_eq!(sim.cpu().regs.get(7), START + 3);
    // the pushed return address went straight to memory
    assert_eq!(sim.cpu().mem.read(START + 0xFF), Ok(START + 3));
}

#[test]
fn console_echo() {
    let console = BufferConsole::with_input("a");
    let mut sim = Simulator::new(SimConfig::default(), Box::new(console.clone())).unwrap();
    load(&mut sim, &[
        Instruction::Trap { vector: 0x20 },
        Instruction::Trap { vector: 0x21 },
        HALT,
    ]);

    assert_eq!(sim.run_until(), Ok(RunOutcome::Halted));
    assert_eq!(sim.cpu().regs.get(0), 'a' as u16);
    assert_eq!(console.output(), "a");
}

#[test]
fn getc_without_input_reports_error() {
    let mut sim = simulator();
    load(&mut sim, &[Instruction::Trap { vector: 0x20 }, HALT]);
    assert!(matches!(sim.step(), Err(SimError::Cpu(_))));
}

#[test]
fn running_off_memory() {
    let config = SimConfig { memory_words: 4, ..SimConfig::default() };
    let mut sim = Simulator::new(config, Box::new(BufferConsole::default())).unwrap();
    sim.load(&[0, 0, 0, 0], START).unwrap();
    assert_eq!(sim.run_until(), Ok(RunOutcome::EndOfMemory(START + 4)));
    assert!(matches!(sim.step(), Err(SimError::Cpu(_))));
}

#[test]
fn demo_image_prints_greeting() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/hello.hex");
    let image = slc3::load_image(path).unwrap();
    let console = BufferConsole::default();
    let mut sim = Simulator::new(SimConfig::default(), Box::new(console.clone())).unwrap();
    sim.load_image(&image).unwrap();

    assert_eq!(sim.run_until(), Ok(RunOutcome::Halted));
    assert_eq!(console.output(), "Hi!\n");
}
