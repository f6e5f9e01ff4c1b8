//! Breakpoint table.
//!
//! A small ordered set of absolute addresses with a fixed capacity. The
//! run loop checks it between instruction cycles.

use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Maximum number of breakpoints.
pub const MAX_BREAKPOINTS: usize = 4;

/// A capacity-bounded set of breakpoint addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoints {
    addrs: BTreeSet<u16>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Fails without changing the table when the address
    /// is already present or the table is full.
    pub fn insert(&mut self, addr: u16) -> Result<(), BreakpointError> {
        if self.addrs.contains(&addr) {
            return Err(BreakpointError::Duplicate(addr));
        }
        if self.addrs.len() >= MAX_BREAKPOINTS {
            return Err(BreakpointError::TableFull(MAX_BREAKPOINTS));
        }
        self.addrs.insert(addr);
        Ok(())
    }

    /// Remove a breakpoint.
    pub fn remove(&mut self, addr: u16) -> Result<(), BreakpointError> {
        if self.addrs.remove(&addr) {
            Ok(())
        } else {
            Err(BreakpointError::NotFound(addr))
        }
    }

    #[inline]
    pub fn contains(&self, addr: u16) -> bool {
        self.addrs.contains(&addr)
    }

    pub fn clear(&mut self) {
        self.addrs.clear();
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.addrs.len() >= MAX_BREAKPOINTS
    }

    /// Addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.addrs.iter().copied()
    }
}

/// Errors from breakpoint table updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakpointError {
    #[error("breakpoint table is full ({0} breakpoints)")]
    TableFull(usize),

    #[error("breakpoint already set at x{0:04X}")]
    Duplicate(u16),

    #[error("no breakpoint at x{0:04X}")]
    NotFound(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut bps = Breakpoints::new();
        bps.insert(0x3004).unwrap();
        bps.insert(0x3001).unwrap();

        assert!(bps.contains(0x3004));
        assert_eq!(bps.iter().collect::<Vec<_>>(), vec![0x3001, 0x3004]);

        bps.remove(0x3004).unwrap();
        assert!(!bps.contains(0x3004));
        assert_eq!(bps.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut bps = Breakpoints::new();
        bps.insert(0x3000).unwrap();
        assert_eq!(bps.insert(0x3000), Err(BreakpointError::Duplicate(0x3000)));
        assert_eq!(bps.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut bps = Breakpoints::new();
        for addr in 0..MAX_BREAKPOINTS as u16 {
            bps.insert(addr).unwrap();
        }
        assert!(bps.is_full());
        assert_eq!(bps.insert(0x100), Err(BreakpointError::TableFull(MAX_BREAKPOINTS)));
        // a duplicate is reported as such even when full
        assert_eq!(bps.insert(0), Err(BreakpointError::Duplicate(0)));
        assert_eq!(bps.len(), MAX_BREAKPOINTS);
    }

    #[test]
    fn test_remove_missing() {
        let mut bps = Breakpoints::new();
        assert_eq!(bps.remove(0x3000), Err(BreakpointError::NotFound(0x3000)));
    }
}
