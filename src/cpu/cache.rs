//! Direct-mapped write-back cache.
//!
//! Each line holds a single word. For a cache of `L` lines (a power of
//! two) an offset maps to line `offset % L` with tag `offset / L`.
//!
//! Reads fill on miss. Writes only touch the line and set its dirty bit;
//! memory sees the value when the line is evicted by a conflicting access
//! or explicitly flushed. The same type backs the instruction cache, which
//! is only ever read, so its dirty bits stay clear.

use crate::cpu::memory::{Memory, Offset};
use serde::{Serialize, Deserialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Which cache this is (for logging and display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheKind {
    Instruction,
    Data,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Instruction => write!(f, "I-cache"),
            CacheKind::Data => write!(f, "D-cache"),
        }
    }
}

/// One cache line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLine {
    pub valid: bool,
    pub dirty: bool,
    pub tag: usize,
    pub data: u16,
}

/// How an access was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Line valid with a matching tag.
    Hit,
    /// Line was invalid (first touch).
    Miss,
    /// Line held another tag and was replaced. `written_back` is set when
    /// the old word was dirty and had to be copied to memory first.
    Evict { written_back: bool },
}

impl Access {
    pub fn is_hit(self) -> bool {
        self == Access::Hit
    }
}

/// Simulated access latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    /// Paid by every access.
    pub hit: Duration,
    /// Added on top of `hit` when the access misses.
    pub miss: Duration,
}

impl Latency {
    pub const ZERO: Latency = Latency { hit: Duration::ZERO, miss: Duration::ZERO };

    pub fn from_millis(hit: u64, miss: u64) -> Self {
        Self {
            hit: Duration::from_millis(hit),
            miss: Duration::from_millis(miss),
        }
    }

    fn pause(&self, access: Access) {
        let mut delay = self.hit;
        if !access.is_hit() {
            delay += self.miss;
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Access counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub write_backs: u64,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`, or `None` before the first access.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

/// A direct-mapped write-back cache.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cache {
    kind: CacheKind,
    lines: Vec<CacheLine>,
    index_bits: u32,
    latency: Latency,
    stats: CacheStats,
    last: Option<(Offset, Access)>,
}

impl Cache {
    /// Create an all-invalid cache of `lines` lines.
    ///
    /// # Panics
    /// Panics if `lines` is not a non-zero power of two. Configuration
    /// validation rejects such values before a cache is built.
    pub fn new(kind: CacheKind, lines: usize, latency: Latency) -> Self {
        assert!(lines.is_power_of_two(), "cache line count {} is not a power of two", lines);
        Self {
            kind,
            lines: vec![CacheLine::default(); lines],
            index_bits: lines.trailing_zeros(),
            latency,
            stats: CacheStats::default(),
            last: None,
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// All lines, indexed by line number.
    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// The most recent access and how it resolved.
    pub fn last_access(&self) -> Option<(Offset, Access)> {
        self.last
    }

    pub fn set_latency(&mut self, latency: Latency) {
        self.latency = latency;
    }

    /// Invalidate every line and zero the counters. Dirty data is dropped.
    pub fn reset(&mut self) {
        self.lines.fill(CacheLine::default());
        self.stats = CacheStats::default();
        self.last = None;
    }

    /// Split an offset into `(line index, tag)`.
    #[inline]
    pub fn locate(&self, offset: Offset) -> (usize, usize) {
        let mask = self.lines.len() - 1;
        (offset.index() & mask, offset.index() >> self.index_bits)
    }

    /// Read a word, filling the line from memory on a miss.
    pub fn read(&mut self, offset: Offset, mem: &mut Memory) -> u16 {
        self.stats.reads += 1;
        let (index, access) = self.claim(offset, mem);
        let line = &mut self.lines[index];
        if !access.is_hit() {
            line.data = mem.load(offset);
        }
        let value = line.data;
        self.finish(offset, access);
        value
    }

    /// Write a word into the cache. Memory is updated only when the line
    /// is later evicted or flushed.
    pub fn write(&mut self, offset: Offset, value: u16, mem: &mut Memory) {
        debug_assert_eq!(self.kind, CacheKind::Data, "the instruction cache is read-only");
        self.stats.writes += 1;
        let (index, access) = self.claim(offset, mem);
        let line = &mut self.lines[index];
        line.data = value;
        line.dirty = true;
        self.finish(offset, access);
    }

    /// Look up a word without side effects: no fill, no eviction, no
    /// latency and no counters.
    pub fn probe(&self, offset: Offset) -> Option<u16> {
        let (index, tag) = self.locate(offset);
        let line = &self.lines[index];
        (line.valid && line.tag == tag).then_some(line.data)
    }

    /// Drop the line holding `offset`, if any, without writing it back.
    pub fn invalidate(&mut self, offset: Offset) {
        let (index, tag) = self.locate(offset);
        let line = &mut self.lines[index];
        if line.valid && line.tag == tag {
            *line = CacheLine::default();
        }
    }

    /// Write every dirty line back to memory. Lines stay valid.
    /// Returns the number of words written.
    pub fn flush(&mut self, mem: &mut Memory) -> usize {
        let mut written = 0;
        for index in 0..self.lines.len() {
            let line = self.lines[index];
            if line.valid && line.dirty {
                mem.store(self.rebuild(index, line.tag), line.data);
                self.lines[index].dirty = false;
                written += 1;
            }
        }
        self.stats.write_backs += written as u64;
        if written > 0 {
            debug!(cache = %self.kind, written, "flushed dirty lines");
        }
        written
    }

    /// Make the line for `offset` belong to it, evicting (and writing back)
    /// whatever occupied it. The line's data is left for the caller.
    fn claim(&mut self, offset: Offset, mem: &mut Memory) -> (usize, Access) {
        let (index, tag) = self.locate(offset);
        let line = self.lines[index];

        let access = if !line.valid {
            Access::Miss
        } else if line.tag == tag {
            Access::Hit
        } else {
            let written_back = line.dirty;
            if written_back {
                let victim = self.rebuild(index, line.tag);
                mem.store(victim, line.data);
                self.stats.write_backs += 1;
                debug!(
                    cache = %self.kind,
                    line = index,
                    victim = victim.index(),
                    value = line.data,
                    "write-back"
                );
            }
            Access::Evict { written_back }
        };

        if !access.is_hit() {
            self.lines[index] = CacheLine { valid: true, dirty: false, tag, data: line.data };
        }
        (index, access)
    }

    fn finish(&mut self, offset: Offset, access: Access) {
        if access.is_hit() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        debug!(cache = %self.kind, offset = offset.index(), ?access, "access");
        self.last = Some((offset, access));
        self.latency.pause(access);
    }

    /// Offset cached by line `index` under `tag`.
    fn rebuild(&self, index: usize, tag: usize) -> Offset {
        Offset::new_unchecked((tag << self.index_bits) | index)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.lines.iter().filter(|l| l.valid).count();
        let dirty = self.lines.iter().filter(|l| l.dirty).count();

        f.debug_struct("Cache")
            .field("kind", &self.kind)
            .field("lines", &self.lines.len())
            .field("valid", &valid)
            .field("dirty", &dirty)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn setup(words: usize, lines: usize) -> (Memory, Cache) {
        let mut mem = Memory::new(0, words);
        let image: Vec<u16> = (0..words as u16).map(|i| 0x1000 + i).collect();
        mem.load_program(0, &image).unwrap();
        (mem, Cache::new(CacheKind::Data, lines, Latency::ZERO))
    }

    fn at(mem: &Memory, addr: u16) -> Offset {
        mem.translate(addr).unwrap()
    }

    #[test]
    fn test_first_touch_then_hit() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 5);

        assert_eq!(cache.read(a, &mut mem), 0x1005);
        assert_eq!(cache.last_access(), Some((a, Access::Miss)));

        assert_eq!(cache.read(a, &mut mem), 0x1005);
        assert_eq!(cache.last_access(), Some((a, Access::Hit)));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(cache.locate(a), (1, 1));
    }

    #[test]
    fn test_hit_does_not_read_memory() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 2);
        cache.read(a, &mut mem);

        // change memory behind the cache's back
        mem.store(a, 0xAAAA);
        assert_eq!(cache.read(a, &mut mem), 0x1002);
    }

    #[test]
    fn test_write_is_deferred() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 3);

        cache.write(a, 0xBEEF, &mut mem);
        assert_eq!(mem.load(a), 0x1003);
        assert_eq!(cache.read(a, &mut mem), 0xBEEF);
        assert!(cache.lines()[3].dirty);
    }

    #[test]
    fn test_conflict_writes_back_dirty_line() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 1);
        let b = at(&mem, 9); // same line, different tag

        cache.write(a, 0xCAFE, &mut mem);
        assert_eq!(cache.read(b, &mut mem), 0x1009);
        assert_eq!(cache.last_access(), Some((b, Access::Evict { written_back: true })));

        assert_eq!(mem.load(a), 0xCAFE);
        assert!(!cache.lines()[1].dirty);
        assert_eq!(cache.stats().write_backs, 1);
    }

    #[test]
    fn test_conflict_clean_line_no_write_back() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 0);
        let b = at(&mem, 4);

        cache.read(a, &mut mem);
        mem.store(a, 0x5555);
        cache.read(b, &mut mem);

        assert_eq!(cache.last_access(), Some((b, Access::Evict { written_back: false })));
        assert_eq!(mem.load(a), 0x5555);
    }

    #[test]
    fn test_write_conflict_evicts_previous_writer() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 2);
        let b = at(&mem, 6);

        cache.write(a, 1, &mut mem);
        cache.write(b, 2, &mut mem);

        assert_eq!(mem.load(a), 1);
        assert_eq!(mem.load(b), 0x1006);
        assert_eq!(cache.probe(b), Some(2));
        assert_eq!(cache.probe(a), None);
    }

    #[test]
    fn test_flush_and_invalidate() {
        let (mut mem, mut cache) = setup(32, 4);
        let a = at(&mem, 7);

        cache.write(a, 77, &mut mem);
        assert_eq!(cache.flush(&mut mem), 1);
        assert_eq!(mem.load(a), 77);
        assert_eq!(cache.flush(&mut mem), 0);

        cache.invalidate(a);
        assert_eq!(cache.probe(a), None);
    }

    #[test]
    fn test_reset() {
        let (mut mem, mut cache) = setup(8, 2);
        cache.write(at(&mem, 1), 9, &mut mem);
        cache.reset();
        assert!(cache.lines().iter().all(|l| !l.valid && !l.dirty));
        assert_eq!(cache.stats(), CacheStats::default());
    }

    proptest! {
        #[test]
        fn prop_read_after_write(ops in prop::collection::vec((0u16..64, any::<u16>()), 1..40), probe in 0u16..64) {
            let (mut mem, mut cache) = setup(64, 8);
            let mut model: Vec<u16> = (0..64u16).map(|i| 0x1000 + i).collect();

            for (addr, value) in ops {
                cache.write(at(&mem, addr), value, &mut mem);
                model[addr as usize] = value;
            }
            prop_assert_eq!(cache.read(at(&mem, probe), &mut mem), model[probe as usize]);
        }

        #[test]
        fn prop_flushed_memory_matches(ops in prop::collection::vec((0u16..64, any::<u16>()), 1..40)) {
            let (mut mem, mut cache) = setup(64, 8);
            let mut model: Vec<u16> = (0..64u16).map(|i| 0x1000 + i).collect();

            for (addr, value) in ops {
                cache.write(at(&mem, addr), value, &mut mem);
                model[addr as usize] = value;
            }
            cache.flush(&mut mem);
            for addr in 0..64u16 {
                prop_assert_eq!(mem.load(at(&mem, addr)), model[addr as usize]);
            }
        }
    }
}
