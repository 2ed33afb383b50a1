//! Fixed-capacity audio memory pool.
//!
//! One contiguous block is reserved when the pool is created and never grows.
//! Blocks are carved out first-fit from a sorted list of free ranges and can
//! be handed back one at a time with [`AudioMemoryPool::free`], which merges
//! neighbouring ranges again. [`AudioMemoryPool::cleanup`] drops everything at
//! once and starts a new generation. Blocks handed out before a cleanup carry
//! the old generation and are rejected on access and on free, so a stale block
//! can never read or release memory that was re-allocated after the reset.

use crate::error::{Result, SonarchError};
use std::ops::Range;

const BLOCK_ALIGNMENT: usize = 16;

/// Handle to a region of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBlock {
    offset: usize,
    len: usize,
    generation: u64,
}

impl PoolBlock {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes the block occupies in the pool, padding included.
    fn reserved(&self) -> usize {
        reserved_len(self.len)
    }
}

/// Snapshot of the pool usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub used: usize,
    pub peak: usize,
    /// Blocks currently handed out
    pub allocations: usize,
    pub failed_allocations: usize,
    pub generation: u64,
}

pub struct AudioMemoryPool {
    name: String,
    memory: Box<[u8]>,
    /// Sorted by start, never empty and never touching each other
    free_ranges: Vec<Range<usize>>,
    used: usize,
    peak: usize,
    allocations: usize,
    failed_allocations: usize,
    generation: u64,
}

impl AudioMemoryPool {
    /// Reserves `capacity` bytes up front.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SonarchError::Configuration(format!(
                "Audio memory pool '{}' needs a non-zero capacity",
                name
            )));
        }

        log::info!(
            "Reserving audio memory pool '{}' ({} KiB)",
            name,
            capacity / 1024
        );

        Ok(Self {
            name: name.to_string(),
            memory: vec![0u8; capacity].into_boxed_slice(),
            free_ranges: vec![0..capacity],
            used: 0,
            peak: 0,
            allocations: 0,
            failed_allocations: 0,
            generation: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.used
    }

    /// Size of the biggest block that can currently be allocated.
    pub fn largest_free_block(&self) -> usize {
        self.free_ranges.iter().map(|range| range.len()).max().unwrap_or(0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Highest number of bytes in use since the pool was created.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            used: self.used,
            peak: self.peak,
            allocations: self.allocations,
            failed_allocations: self.failed_allocations,
            generation: self.generation,
        }
    }

    /// Carves `size` bytes out of the pool.
    ///
    /// Fails with [`SonarchError::PoolExhausted`] when no free range can hold
    /// the request; existing blocks are left untouched in that case.
    pub fn allocate(&mut self, size: usize) -> Result<PoolBlock> {
        let reserved = reserved_len(size);
        let slot = self
            .free_ranges
            .iter()
            .position(|range| range.len() >= reserved);

        let Some(index) = slot else {
            self.failed_allocations += 1;
            let available = self.largest_free_block();
            log::error!(
                "Audio memory pool '{}' exhausted: requested {} bytes, {} available",
                self.name,
                size,
                available
            );
            return Err(SonarchError::PoolExhausted {
                pool: self.name.clone(),
                requested: size,
                available,
            });
        };

        let range = &mut self.free_ranges[index];
        let offset = range.start;
        range.start += reserved;
        if range.is_empty() {
            self.free_ranges.remove(index);
        }

        self.used += reserved;
        self.peak = self.peak.max(self.used);
        self.allocations += 1;

        Ok(PoolBlock {
            offset,
            len: size,
            generation: self.generation,
        })
    }

    /// Hands a block back to the pool.
    ///
    /// Returns false, without changing anything, for a block from an earlier
    /// generation or one that is already free.
    pub fn free(&mut self, block: PoolBlock) -> bool {
        if !self.is_live(&block) {
            log::debug!(
                "Ignoring free of a block from generation {} in pool '{}' (generation {})",
                block.generation,
                self.name,
                self.generation
            );
            return false;
        }

        let start = block.offset;
        let end = start + block.reserved();
        let index = self.free_ranges.partition_point(|range| range.start < start);

        let overlaps_previous = index > 0 && self.free_ranges[index - 1].end > start;
        let overlaps_next = self
            .free_ranges
            .get(index)
            .is_some_and(|range| range.start < end);
        if overlaps_previous || overlaps_next {
            log::error!(
                "Block at offset {} of pool '{}' was freed twice",
                start,
                self.name
            );
            return false;
        }

        let joins_previous = index > 0 && self.free_ranges[index - 1].end == start;
        let joins_next = self
            .free_ranges
            .get(index)
            .is_some_and(|range| range.start == end);
        match (joins_previous, joins_next) {
            (true, true) => {
                let next = self.free_ranges.remove(index);
                self.free_ranges[index - 1].end = next.end;
            }
            (true, false) => self.free_ranges[index - 1].end = end,
            (false, true) => self.free_ranges[index].start = start,
            (false, false) => self.free_ranges.insert(index, start..end),
        }

        self.used -= block.reserved();
        self.allocations -= 1;
        true
    }

    /// Resets the pool to empty and invalidates every outstanding block.
    pub fn cleanup(&mut self) {
        log::debug!(
            "Cleaning up audio memory pool '{}' (generation {}, {} bytes in use)",
            self.name,
            self.generation,
            self.used
        );
        self.free_ranges.clear();
        self.free_ranges.push(0..self.capacity());
        self.used = 0;
        self.allocations = 0;
        self.generation += 1;
    }

    /// Returns true if the block belongs to the current generation.
    pub fn is_live(&self, block: &PoolBlock) -> bool {
        block.generation == self.generation
    }

    pub fn bytes(&self, block: &PoolBlock) -> Result<&[u8]> {
        self.check_live(block)?;
        Ok(&self.memory[block.offset..block.offset + block.len])
    }

    pub fn bytes_mut(&mut self, block: &PoolBlock) -> Result<&mut [u8]> {
        self.check_live(block)?;
        Ok(&mut self.memory[block.offset..block.offset + block.len])
    }

    fn check_live(&self, block: &PoolBlock) -> Result<()> {
        if self.is_live(block) {
            Ok(())
        } else {
            Err(SonarchError::StalePoolBlock {
                block_generation: block.generation,
                pool_generation: self.generation,
            })
        }
    }
}

/// Zero-sized requests still take one aligned slot so every block has its own offset.
fn reserved_len(size: usize) -> usize {
    size.max(1).next_multiple_of(BLOCK_ALIGNMENT)
}

impl std::fmt::Debug for AudioMemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMemoryPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(AudioMemoryPool::new("test", 0).is_err());
    }

    #[test]
    fn test_allocations_are_aligned_and_disjoint() {
        let mut pool = AudioMemoryPool::new("test", 256).unwrap();
        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(10).unwrap();

        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset() % BLOCK_ALIGNMENT, 0);
        assert!(b.offset() >= a.offset() + a.len());
    }

    #[test]
    fn test_exhaustion_keeps_existing_contents() {
        let mut pool = AudioMemoryPool::new("test", 64).unwrap();
        let block = pool.allocate(32).unwrap();
        pool.bytes_mut(&block).unwrap().fill(0xAB);

        let err = pool.allocate(64).unwrap_err();
        assert!(matches!(err, SonarchError::PoolExhausted { requested: 64, .. }));
        assert_eq!(pool.stats().failed_allocations, 1);
        assert!(pool.bytes(&block).unwrap().iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn test_cleanup_then_full_allocation_succeeds() {
        let mut pool = AudioMemoryPool::new("test", 128).unwrap();
        let before = pool.allocate(100).unwrap();
        assert!(pool.allocate(100).is_err());

        pool.cleanup();
        let after = pool.allocate(pool.capacity()).unwrap();

        assert_eq!(after.len(), 128);
        assert_ne!(before.generation(), after.generation());
    }

    #[test]
    fn test_stale_block_cannot_alias_new_memory() {
        let mut pool = AudioMemoryPool::new("test", 128).unwrap();
        let stale = pool.allocate(16).unwrap();
        pool.cleanup();
        let fresh = pool.allocate(16).unwrap();

        // Same offsets, but the old handle is refused.
        assert_eq!(stale.offset(), fresh.offset());
        assert!(matches!(
            pool.bytes(&stale),
            Err(SonarchError::StalePoolBlock { .. })
        ));
        assert!(pool.bytes_mut(&fresh).is_ok());
    }

    #[test]
    fn test_stats_track_peak_across_cleanup() {
        let mut pool = AudioMemoryPool::new("test", 1024).unwrap();
        pool.allocate(500).unwrap();
        pool.cleanup();
        pool.allocate(100).unwrap();

        let stats = pool.stats();
        // Sizes are rounded up to the block alignment.
        assert_eq!(stats.used, 112);
        assert_eq!(stats.peak, 512);
        assert_eq!(stats.generation, 1);
    }

    #[test]
    fn test_freed_blocks_are_reused_without_cleanup() {
        let mut pool = AudioMemoryPool::new("test", 256).unwrap();
        for _ in 0..1000 {
            let block = pool.allocate(96).unwrap();
            assert!(pool.free(block));
        }

        let stats = pool.stats();
        assert_eq!(stats.used, 0);
        assert_eq!(stats.allocations, 0);
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.failed_allocations, 0);
    }

    #[test]
    fn test_free_merges_neighbouring_ranges() {
        let mut pool = AudioMemoryPool::new("test", 96).unwrap();
        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();
        assert!(pool.allocate(1).is_err());

        // A hole in the middle only fits its own size.
        assert!(pool.free(b));
        assert!(pool.allocate(48).is_err());
        let reused = pool.allocate(32).unwrap();
        assert_eq!(reused.offset(), b.offset());

        assert!(pool.free(a));
        assert!(pool.free(c));
        assert!(pool.free(reused));
        assert_eq!(pool.largest_free_block(), 96);
        assert_eq!(pool.allocate(96).unwrap().offset(), 0);
    }

    #[test]
    fn test_double_and_stale_free_are_refused() {
        let mut pool = AudioMemoryPool::new("test", 128).unwrap();
        let block = pool.allocate(16).unwrap();
        let kept = pool.allocate(16).unwrap();
        assert!(pool.free(block));
        assert!(!pool.free(block));
        assert_eq!(pool.used(), 16);

        pool.cleanup();
        let fresh = pool.allocate(16).unwrap();
        assert!(!pool.free(kept));
        assert_eq!(pool.used(), 16);
        assert!(pool.bytes(&fresh).is_ok());
    }
}
