//! Main memory.
//!
//! A fixed number of 16-bit words mapped at a configurable base address.
//! Absolute addresses are translated to internal offsets with
//! [`Memory::translate`]; everything below the engine (the caches in
//! particular) works on the validated [`Offset`] and never sees an address
//! outside the array.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A validated index into main memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset(usize);

impl Offset {
    /// Built only by [`Memory::translate`] and cache write-back, which
    /// reconstructs an offset that was valid when the line was filled.
    #[inline]
    pub(crate) const fn new_unchecked(index: usize) -> Self {
        Self(index)
    }

    /// The raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Word-addressed main memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    base: u16,
    cells: Vec<u16>,
}

impl Memory {
    /// Create zeroed memory of `words` cells mapped at `base`.
    pub fn new(base: u16, words: usize) -> Self {
        Self {
            base,
            cells: vec![0; words],
        }
    }

    /// Absolute address of offset 0.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Number of words.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Absolute address of the last word.
    pub fn last_address(&self) -> u16 {
        self.base.wrapping_add(self.cells.len().saturating_sub(1) as u16)
    }

    /// Translate an absolute address to an offset, rejecting anything
    /// outside `[base, base + capacity)`.
    #[inline]
    pub fn translate(&self, addr: u16) -> Result<Offset, MemoryError> {
        let index = addr.wrapping_sub(self.base) as usize;
        if index >= self.cells.len() {
            return Err(MemoryError::OutOfRange(addr));
        }
        Ok(Offset(index))
    }

    /// Whether `addr` maps into memory.
    pub fn contains(&self, addr: u16) -> bool {
        self.translate(addr).is_ok()
    }

    /// Absolute address of an offset.
    pub fn address_of(&self, offset: Offset) -> u16 {
        self.base.wrapping_add(offset.0 as u16)
    }

    /// Read a word by offset.
    #[inline]
    pub fn load(&self, offset: Offset) -> u16 {
        self.cells[offset.0]
    }

    /// Write a word by offset.
    #[inline]
    pub fn store(&mut self, offset: Offset, value: u16) {
        self.cells[offset.0] = value;
    }

    /// Read by absolute address.
    pub fn read(&self, addr: u16) -> Result<u16, MemoryError> {
        Ok(self.load(self.translate(addr)?))
    }

    /// Write by absolute address.
    pub fn write(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        let offset = self.translate(addr)?;
        self.store(offset, value);
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Remap memory at `base` and fill it from `program`, zeroing the rest.
    ///
    /// Nothing is modified when the program does not fit.
    pub fn load_program(&mut self, base: u16, program: &[u16]) -> Result<(), MemoryError> {
        if program.len() > self.cells.len() {
            return Err(MemoryError::ImageTooLarge {
                size: program.len(),
                capacity: self.cells.len(),
            });
        }

        self.base = base;
        self.clear();
        self.cells[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Copy of the inclusive absolute range `start..=end`.
    pub fn range(&self, start: u16, end: u16) -> Result<Vec<u16>, MemoryError> {
        let first = self.translate(start)?;
        let last = self.translate(end)?;
        if first > last {
            return Ok(Vec::new());
        }
        Ok(self.cells[first.0..=last.0].to_vec())
    }

    /// Dump memory contents as `(address, word)` pairs (for display).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let first = match self.translate(start) {
            Ok(offset) => offset.0,
            Err(_) => return Vec::new(),
        };
        let end = (first + count).min(self.cells.len());
        (first..end)
            .map(|i| (self.base.wrapping_add(i as u16), self.cells[i]))
            .collect()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();

        f.debug_struct("Memory")
            .field("base", &format_args!("x{:04X}", self.base))
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside the mapped range.
    #[error("address x{0:04X} is outside memory")]
    OutOfRange(u16),

    /// Program image is larger than memory.
    #[error("program of {size} words exceeds memory capacity of {capacity} words")]
    ImageTooLarge { size: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new(0x3000, 16);
        mem.write(0x3004, 0xBEEF).unwrap();
        assert_eq!(mem.read(0x3004).unwrap(), 0xBEEF);
    }

    #[test]
    fn test_memory_bounds() {
        let mem = Memory::new(0x3000, 16);

        assert!(mem.read(0x3000).is_ok());
        assert!(mem.read(0x300F).is_ok());

        assert_eq!(mem.read(0x2FFF), Err(MemoryError::OutOfRange(0x2FFF)));
        assert_eq!(mem.read(0x3010), Err(MemoryError::OutOfRange(0x3010)));
        assert_eq!(mem.last_address(), 0x300F);
    }

    #[test]
    fn test_translate_wraps_below_base() {
        let mem = Memory::new(0x0000, 4);
        assert!(mem.translate(0xFFFF).is_err());
        assert_eq!(mem.translate(3).unwrap().index(), 3);
    }

    #[test]
    fn test_load_program() {
        let mut mem = Memory::new(0x3000, 8);
        mem.write(0x3007, 0x1234).unwrap();

        mem.load_program(0x4000, &[1, 2, 3]).unwrap();

        assert_eq!(mem.base(), 0x4000);
        assert_eq!(mem.read(0x4000).unwrap(), 1);
        assert_eq!(mem.read(0x4002).unwrap(), 3);
        // the rest is cleared
        assert_eq!(mem.read(0x4007).unwrap(), 0);
    }

    #[test]
    fn test_load_program_too_large_leaves_memory() {
        let mut mem = Memory::new(0x3000, 2);
        mem.write(0x3000, 7).unwrap();

        let err = mem.load_program(0x4000, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, MemoryError::ImageTooLarge { size: 3, capacity: 2 });
        assert_eq!(mem.base(), 0x3000);
        assert_eq!(mem.read(0x3000).unwrap(), 7);
    }

    #[test]
    fn test_range_and_dump() {
        let mut mem = Memory::new(0x3000, 8);
        mem.load_program(0x3000, &[10, 11, 12, 13]).unwrap();

        assert_eq!(mem.range(0x3001, 0x3003).unwrap(), vec![11, 12, 13]);
        assert!(mem.range(0x3001, 0x3010).is_err());

        let dump = mem.dump(0x3006, 10);
        assert_eq!(dump, vec![(0x3006, 0), (0x3007, 0)]);
    }
}
