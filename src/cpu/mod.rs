//! The simulated processor.
//!
//! - eight 16-bit general registers plus a one-hot N/Z/P condition code
//! - word-addressed main memory behind instruction and data caches
//! - a six-phase instruction cycle with a trap dispatcher for system calls

pub mod alu;
pub mod cache;
pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;
pub mod trap;

pub use alu::Alu;
pub use cache::{Cache, CacheKind, CacheLine, CacheStats, Access, Latency};
pub use decode::{Instruction, Operand, Opcode};
pub use execute::{Cpu, CpuError, Phase, StepOutcome, Latches};
pub use memory::{Memory, MemoryError, Offset};
pub use registers::{Registers, ConditionCode};
pub use trap::TrapVector;
