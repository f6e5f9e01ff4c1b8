//! SLC-3 Simulator - CLI Entry Point
//!
//! Commands:
//! - `slc3-sim run <image>` - Run a program image
//! - `slc3-sim menu` - Numbered interactive menu
//! - `slc3-sim debug <image>` - Interactive TUI debugger
//! - `slc3-sim disasm <image>` - Disassemble an image
//! - `slc3-sim dump <image>` - Print (and optionally save) a memory range

use clap::{Parser, Subcommand};
use slc3::cpu::MemoryError;
use slc3::{
    BufferConsole, Console, ProgramImage, RunOutcome, SimConfig, Simulator, StepOutcome,
    TerminalConsole,
};
use std::fmt::Display;
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(name = "slc3-sim")]
#[command(version = "0.1.0")]
#[command(about = "Instruction-cycle simulator for a 16-bit load/store CPU with split caches")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,
    /// Cache hit latency in milliseconds
    #[arg(long, global = true)]
    hit_latency: Option<u64>,
    /// Additional cache miss latency in milliseconds
    #[arg(long, global = true)]
    miss_latency: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the hex image to execute
        image: String,
        /// Maximum number of cycles to run (0 = unlimited)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Log every phase of every cycle to stderr
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Numbered interactive menu
    Menu {
        /// Log every phase of every cycle to stderr
        #[arg(short, long)]
        trace: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the hex image to debug
        image: String,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the hex image
        image: String,
    },
    /// Print a memory range after loading an image
    Dump {
        /// Path to the hex image
        image: String,
        /// First address (hex)
        #[arg(short, long, value_parser = parse_hex)]
        start: u16,
        /// Last address, inclusive (hex)
        #[arg(short, long, value_parser = parse_hex)]
        end: u16,
        /// Save the range to this file, one word per line
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = build_config(&cli);

    match cli.command {
        Some(Commands::Run { image, max_cycles, trace, json }) => {
            init_tracing(trace);
            run_program(&image, config, max_cycles, json);
        }
        Some(Commands::Menu { trace }) => {
            init_tracing(trace);
            run_menu(config);
        }
        Some(Commands::Debug { image }) => {
            debug_program(&image, config);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Dump { image, start, end, output }) => {
            init_tracing(false);
            dump_range(&image, config, start, end, output);
        }
        None => {
            println!("SLC-3 Simulator v0.1.0");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Print an error and exit.
fn fail(context: &str, err: impl Display) -> ! {
    eprintln!("❌ {}: {}", context, err);
    std::process::exit(1);
}

/// Log to stderr. `RUST_LOG` picks the filter unless `--trace` forces it.
fn init_tracing(trace: bool) {
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

    let filter = if trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> SimConfig {
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_file(path).unwrap_or_else(|e| fail("Bad config", e)),
        None => SimConfig::default(),
    };
    if let Some(ms) = cli.hit_latency {
        config.hit_latency_ms = ms;
    }
    if let Some(ms) = cli.miss_latency {
        config.miss_latency_ms = ms;
    }
    config
}

/// Parse `x3000`, `0x3000` or `3000` as a hex word.
fn parse_hex(text: &str) -> Result<u16, String> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix('x'))
        .or_else(|| text.strip_prefix('X'))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{}' is not a hex word: {}", text, e))
}

fn load_or_exit(path: &str) -> ProgramImage {
    let image = slc3::load_image(path).unwrap_or_else(|e| fail("Failed to load image", e));
    if image.is_empty() {
        fail("Failed to load image", "no words after the origin");
    }
    image
}

fn run_program(path: &str, mut config: SimConfig, max_cycles: Option<u64>, json: bool) {
    let image = load_or_exit(path);
    if let Some(n) = max_cycles {
        config.max_cycles = n;
    }

    let mut sim = Simulator::new(config, Box::new(TerminalConsole::new()))
        .unwrap_or_else(|e| fail("Bad config", e));
    sim.load_image(&image).unwrap_or_else(|e| fail("Failed to load program", e));

    let outcome = sim.run_until().unwrap_or_else(|e| {
        fail(&format!("CPU error at PC=x{:04X}", sim.cpu().regs.pc), e)
    });
    let _ = sim.console_mut().flush();

    if json {
        match serde_json::to_string_pretty(sim.cpu()) {
            Ok(text) => println!("{}", text),
            Err(e) => fail("Failed to serialize state", e),
        }
        return;
    }

    println!();
    println!("━━━ Result ━━━");
    match outcome {
        RunOutcome::Halted => println!("Halted"),
        RunOutcome::BreakpointHit(addr) => println!("Stopped at breakpoint x{:04X}", addr),
        RunOutcome::EndOfMemory(pc) => println!("PC left memory at x{:04X}", pc),
        RunOutcome::CycleLimit(n) => {
            println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", n)
        }
    }
    print_machine(&sim);
    print_cache_stats(&sim);
}

fn print_machine(sim: &Simulator) {
    let cpu = sim.cpu();
    println!("Cycles: {}", cpu.cycles);
    for row in 0..2u8 {
        let regs: Vec<String> = (row * 4..row * 4 + 4)
            .map(|r| format!("R{}: x{:04X}", r, cpu.regs.get(r)))
            .collect();
        println!("{}", regs.join("  "));
    }
    println!(
        "PC: x{:04X}  IR: x{:04X}  MAR: x{:04X}  MDR: x{:04X}  CC: {}",
        cpu.regs.pc, cpu.latches.ir, cpu.latches.mar, cpu.latches.mdr, cpu.regs.cc
    );
}

fn print_cache_stats(sim: &Simulator) {
    for cache in [&sim.cpu().icache, &sim.cpu().dcache] {
        let stats = cache.stats();
        let rate = stats
            .hit_rate()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".into());
        println!(
            "{}: {} hits, {} misses, {} write-backs ({} hit rate)",
            cache.kind(), stats.hits, stats.misses, stats.write_backs, rate
        );
    }
}

fn print_memory(sim: &Simulator, start: u16, count: usize) {
    for (addr, _) in sim.cpu().mem.dump(start, count) {
        let value = sim.peek(addr).unwrap_or(0);
        let marker = if addr == sim.cpu().regs.pc { "◀ PC" } else { "" };
        println!("  x{:04X}: x{:04X}  {}", addr, value, marker);
    }
}

/// Start of a memory window. The address must lie in memory.
fn show_window(sim: &Simulator, addr: u16) -> Result<u16, MemoryError> {
    sim.cpu().mem.translate(addr).map(|_| addr)
}

/// Read one trimmed line after printing `prompt`. `None` on end of input.
fn prompt(input: &mut impl BufRead, text: &str) -> Option<String> {
    print!("{}", text);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn prompt_hex(input: &mut impl BufRead, text: &str) -> Option<Result<u16, String>> {
    prompt(input, text).map(|line| parse_hex(&line))
}

fn run_menu(config: SimConfig) {
    let mut sim = Simulator::new(config, Box::new(TerminalConsole::new()))
        .unwrap_or_else(|e| fail("Bad config", e));
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut window = sim.config().start_address;

    loop {
        println!();
        print_machine(&sim);
        print_memory(&sim, window, 8);
        println!();
        println!("1) Load  2) Save  3) Step  4) Run  5) Display Mem");
        println!("6) Edit  7) Set Bkpt  8) Unset Bkpt  9) Exit");

        let Some(choice) = prompt(&mut input, "> ") else { break };
        let result: Result<String, String> = match choice.as_str() {
            "1" => match prompt(&mut input, "Image file: ") {
                Some(path) => slc3::load_image(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|image| sim.load_image(&image).map_err(|e| e.to_string()))
                    .map(|_| {
                        window = sim.cpu().regs.pc;
                        format!("Loaded {}", path)
                    }),
                None => break,
            },
            "2" => {
                let (Some(start), Some(end), Some(path)) = (
                    prompt_hex(&mut input, "Start address: "),
                    prompt_hex(&mut input, "End address: "),
                    prompt(&mut input, "Output file: "),
                ) else { break };
                start
                    .and_then(|s| end.map(|e| (s, e)))
                    .and_then(|(s, e)| sim.save_range(s, e).map_err(|e| e.to_string()))
                    .and_then(|words| {
                        slc3::save_words(&path, &words)
                            .map(|_| format!("Saved {} words to {}", words.len(), path))
                            .map_err(|e| e.to_string())
                    })
            }
            "3" => sim
                .step()
                .map(|outcome| match outcome {
                    StepOutcome::Continue => "Stepped".to_string(),
                    StepOutcome::Halted => "Halted".to_string(),
                })
                .map_err(|e| e.to_string()),
            "4" => sim
                .run_until()
                .map(|outcome| format!("{:?}", outcome))
                .map_err(|e| e.to_string()),
            "5" => match prompt_hex(&mut input, "Start address: ") {
                Some(addr) => addr.and_then(|a| match show_window(&sim, a) {
                    Ok(start) => {
                        window = start;
                        Ok(format!("Showing memory from x{:04X}", start))
                    }
                    Err(e) => Err(e.to_string()),
                }),
                None => break,
            },
            "6" => {
                let (Some(addr), Some(value)) = (
                    prompt_hex(&mut input, "Address: "),
                    prompt_hex(&mut input, "Value: "),
                ) else { break };
                addr.and_then(|a| value.map(|v| (a, v))).and_then(|(a, v)| {
                    sim.poke(a, v)
                        .map(|_| format!("x{:04X} <- x{:04X}", a, v))
                        .map_err(|e| e.to_string())
                })
            }
            "7" => match prompt_hex(&mut input, "Breakpoint address: ") {
                Some(addr) => addr.and_then(|a| {
                    sim.set_breakpoint(a)
                        .map(|_| format!("Breakpoint set at x{:04X}", a))
                        .map_err(|e| e.to_string())
                }),
                None => break,
            },
            "8" => match prompt_hex(&mut input, "Breakpoint address: ") {
                Some(addr) => addr.and_then(|a| {
                    sim.clear_breakpoint(a)
                        .map(|_| format!("Breakpoint removed at x{:04X}", a))
                        .map_err(|e| e.to_string())
                }),
                None => break,
            },
            "9" => break,
            other => Err(format!("unknown choice '{}'", other)),
        };
        let _ = sim.console_mut().flush();

        match result {
            Ok(message) => println!("{}", message),
            Err(message) => println!("Error: {}", message),
        }
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: SimConfig) {
    let image = load_or_exit(path);
    if let Err(e) = slc3::run_debugger(image, config) {
        fail("Debugger error", e);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: SimConfig) {
    fail("Debugger unavailable", "built without the `tui` feature");
}

fn disassemble_file(path: &str) {
    let image = load_or_exit(path);
    println!("{}", slc3::disassemble(image.origin, &image.words));
}

fn dump_range(path: &str, config: SimConfig, start: u16, end: u16, output: Option<String>) {
    let image = load_or_exit(path);
    let mut sim = Simulator::new(config, Box::new(BufferConsole::default()))
        .unwrap_or_else(|e| fail("Bad config", e));
    sim.load_image(&image).unwrap_or_else(|e| fail("Failed to load program", e));

    let words = sim.save_range(start, end).unwrap_or_else(|e| fail("Bad range", e));
    for (i, word) in words.iter().enumerate() {
        println!("x{:04X}: x{:04X}", start.wrapping_add(i as u16), word);
    }

    if let Some(out) = output {
        slc3::save_words(&out, &words).unwrap_or_else(|e| fail("Failed to save", e));
        println!("✓ Saved {} words to {}", words.len(), out);
    }
}
