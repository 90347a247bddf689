use crate::fs::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage, MemoryBlockEmulator};
use log::debug;
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// Tracks one bit per item, 0 meaning free and 1 meaning in use.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    /// Number of items tracked. Bits past this point are never handed out.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, nr: usize) -> State {
        assert!(nr < self.len, "bit {} outside bitmap of {}", nr, self.len);
        // Grab the u64 containing the significant bit.
        let outer_offset = self.bitmap[nr / 64];

        let inner_offset = nr % 64;
        let mask = 0b01_u64 << inner_offset;
        let state = (outer_offset & mask) >> inner_offset;
        match state {
            0 => State::Free,
            1 => State::Used,
            _ => unreachable!("bit state other than 0 or 1, the mask is wrong"),
        }
    }

    pub fn set_reserved(&mut self, nr: usize) {
        assert!(nr < self.len, "bit {} outside bitmap of {}", nr, self.len);
        self.bitmap[nr / 64] |= 0b01_u64 << (nr % 64);
    }

    pub fn set_free(&mut self, nr: usize) {
        assert!(nr < self.len, "bit {} outside bitmap of {}", nr, self.len);
        self.bitmap[nr / 64] &= !(0b01_u64 << (nr % 64));
    }

    /// Lowest free bit, if any.
    pub fn first_free(&self) -> Option<usize> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(i, word)| i * 64 + (!word).trailing_zeros() as usize)
            .filter(|&nr| nr < self.len)
    }

}

/// First-in first-out pool of free block numbers in `[0, capacity)`.
///
/// Blocks are handed out from the head and returned to the tail, so a freshly
/// freed block is the last one to be reused. A bitmap mirrors the queue to
/// reject double frees without scanning.
#[derive(Debug, Clone)]
pub struct FreeList {
    queue: VecDeque<BlockNumber>,
    used: Bitmap,
}

impl FreeList {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: (0..cap).collect(),
            used: Bitmap::new(cap),
        }
    }

    /// Pops the head of the list.
    ///
    /// # Errors
    ///
    /// Returns `DiskFull` once every block is owned.
    pub fn allocate(&mut self) -> Result<BlockNumber> {
        let blocknr = self.queue.pop_front().ok_or(FsError::DiskFull)?;
        self.used.set_reserved(blocknr);
        Ok(blocknr)
    }

    /// Pushes `blocknr` back onto the tail.
    ///
    /// # Errors
    ///
    /// Block numbers outside the pool, or already free, leave the list untouched.
    pub fn free(&mut self, blocknr: BlockNumber) -> Result<()> {
        if blocknr >= self.capacity() {
            return Err(FsError::InvalidArgument(format!(
                "block {} is outside the pool",
                blocknr
            )));
        }
        if self.used.get(blocknr) == State::Free {
            return Err(FsError::InvalidArgument(format!(
                "block {} is already free",
                blocknr
            )));
        }
        self.used.set_free(blocknr);
        self.queue.push_back(blocknr);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    /// Free block numbers in the order they will be allocated.
    pub fn iter(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.queue.iter().copied()
    }
}

/// A block device paired with its free list. Allocating a block stores the
/// payload; freeing one drops the payload before the number is recycled.
pub struct BlockPool<L> {
    dev: MemoryBlockEmulator<L>,
    free: FreeList,
}

impl<L: Default> BlockPool<L> {
    pub fn new(dev: MemoryBlockEmulator<L>) -> Self {
        let free = FreeList::new(dev.block_count());
        Self { dev, free }
    }

    /// Takes the next free block and fills it with `chunk`.
    pub fn allocate(&mut self, chunk: &[u8]) -> Result<BlockNumber> {
        let blocknr = self.free.allocate()?;
        if let Err(e) = self.dev.write_block(blocknr, chunk) {
            // Put the number back so a failed write never leaks a block.
            self.free.free(blocknr)?;
            return Err(e.into());
        }
        debug!("allocated block {} ({} bytes)", blocknr, chunk.len());
        Ok(blocknr)
    }

    /// Releases a block back to the free list.
    pub fn free(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.free.free(blocknr)?;
        self.dev.clear_block(blocknr);
        debug!("freed block {}", blocknr);
        Ok(())
    }

    pub fn device(&self) -> &MemoryBlockEmulator<L> {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut MemoryBlockEmulator<L> {
        &mut self.dev
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    pub fn block_size(&self) -> usize {
        self.dev.block_size()
    }

    /// Number of blocks holding `bytes` bytes of content.
    pub fn blocks_for(&self, bytes: usize) -> usize {
        let block_size = self.block_size();
        bytes / block_size + (bytes % block_size != 0) as usize
    }
}
