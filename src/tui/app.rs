//! Debugger application state and logic.

use crate::console::Console;
use crate::program::disasm::disassemble_instruction;
use crate::{ProgramImage, ProgramState, RunOutcome, SimConfig, SimError, Simulator, StepOutcome};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Console wired into the debugger: output is kept for the console panel,
/// GETC waits for the next key press.
#[derive(Debug, Default, Clone)]
pub struct TuiConsole {
    output: Rc<RefCell<String>>,
}

impl TuiConsole {
    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }

    pub fn clear(&self) {
        self.output.borrow_mut().clear();
    }
}

impl Console for TuiConsole {
    fn read_byte(&mut self) -> io::Result<u8> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind};

        loop {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char(c) if c.is_ascii() => return Ok(c as u8),
                    KeyCode::Enter => return Ok(b'\n'),
                    _ => {}
                }
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.borrow_mut().push(byte as char);
        Ok(())
    }
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The simulator being debugged.
    pub sim: Simulator,
    /// Loaded image, kept for reset.
    pub image: ProgramImage,
    /// Program console.
    pub console: TuiConsole,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset (words from the base).
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(image: ProgramImage, config: SimConfig) -> Result<Self, SimError> {
        let console = TuiConsole::default();
        let mut sim = Simulator::new(config, Box::new(console.clone()))?;
        sim.load_image(&image)?;

        Ok(Self {
            sim,
            image,
            console,
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        })
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        let pc = self.sim.cpu().regs.pc;
        let word = self.sim.peek(pc).unwrap_or(0);
        match self.sim.step() {
            Ok(StepOutcome::Continue) => {
                self.status = format!("x{:04X}: {}", pc, disassemble_instruction(word, pc));
            }
            Ok(StepOutcome::Halted) => {
                self.running = false;
                self.status = format!("Halted after {} cycles", self.sim.cpu().cycles);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        if self.sim.state() != ProgramState::Loaded {
            self.status = "Program has halted. Press 'x' to reset.".into();
            return;
        }
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution: a single cycle through
    /// the simulator's run loop, so halts, breakpoints and the PC leaving
    /// memory are reported the same way as a full run.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        match self.sim.run_cycles(1) {
            Ok(RunOutcome::CycleLimit(_)) => {}
            Ok(RunOutcome::Halted) => {
                self.running = false;
                self.status = format!("Halted after {} cycles", self.sim.cpu().cycles);
            }
            Ok(RunOutcome::BreakpointHit(addr)) => {
                self.running = false;
                self.status = format!("Breakpoint at x{:04X}", addr);
            }
            Ok(RunOutcome::EndOfMemory(pc)) => {
                self.running = false;
                self.status = format!("PC left memory at x{:04X}", pc);
            }
            Err(e) => {
                self.running = false;
                self.status = format!("Error: {}", e);
            }
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.sim.cpu().regs.pc;
        let result = if self.sim.breakpoints().contains(pc) {
            self.sim.clear_breakpoint(pc).map(|_| format!("Removed breakpoint at x{:04X}", pc))
        } else {
            self.sim.set_breakpoint(pc).map(|_| format!("Set breakpoint at x{:04X}", pc))
        };
        self.status = result.unwrap_or_else(|e| format!("Error: {}", e));
    }

    /// Reload the program.
    pub fn reset(&mut self) {
        self.console.clear();
        self.running = false;
        self.status = match self.sim.load_image(&self.image) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Error: {}", e),
        };
    }

    /// Disassembly around the current PC as `(addr, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let cpu = self.sim.cpu();
        let pc = cpu.regs.pc;
        let base = cpu.mem.base();
        let back = (lines as u16 / 2).min(pc.wrapping_sub(base));
        let start = pc.wrapping_sub(back);

        cpu.mem
            .dump(start, lines)
            .into_iter()
            .map(|(addr, _)| {
                let word = self.sim.peek(addr).unwrap_or(0);
                (addr, disassemble_instruction(word, addr), addr == pc)
            })
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(image: ProgramImage, config: SimConfig) -> io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Create app before touching the terminal so errors print normally
    let mut app = DebuggerApp::new(image, config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.sim.cpu().mem.capacity() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
