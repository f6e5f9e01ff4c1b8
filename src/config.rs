//! Simulator configuration.
//!
//! Loaded from JSON; every field has a default so a config file only needs
//! the values it changes:
//!
//! ```json
//! { "memory_words": 512, "dcache_lines": 4, "miss_latency_ms": 40 }
//! ```

use crate::cpu::cache::Latency;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Default load and start address.
pub const DEFAULT_START_ADDRESS: u16 = 0x3000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Where memory is mapped before the first program is loaded.
    pub start_address: u16,
    /// Main memory size in words.
    pub memory_words: usize,
    /// Instruction cache lines (power of two).
    pub icache_lines: usize,
    /// Data cache lines (power of two).
    pub dcache_lines: usize,
    /// Delay paid by every cache access.
    pub hit_latency_ms: u64,
    /// Extra delay paid by a cache miss.
    pub miss_latency_ms: u64,
    /// Cycle cap for a run (0 = unlimited).
    pub max_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_address: DEFAULT_START_ADDRESS,
            memory_words: 1024,
            icache_lines: 8,
            dcache_lines: 8,
            hit_latency_ms: 0,
            miss_latency_ms: 0,
            max_cycles: 0,
        }
    }
}

impl SimConfig {
    /// Read and validate a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the machine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_words == 0 || self.memory_words > 0x1_0000 {
            return Err(ConfigError::MemorySize(self.memory_words));
        }
        for (name, lines) in [("icache_lines", self.icache_lines), ("dcache_lines", self.dcache_lines)] {
            if !lines.is_power_of_two() {
                return Err(ConfigError::CacheLines { name, lines });
            }
        }
        Ok(())
    }

    /// Cache latency model.
    pub fn latency(&self) -> Latency {
        Latency::from_millis(self.hit_latency_ms, self.miss_latency_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("memory size {0} must be between 1 and 65536 words")]
    MemorySize(usize),

    #[error("{name} = {lines} is not a power of two")]
    CacheLines { name: &'static str, lines: usize },
}
