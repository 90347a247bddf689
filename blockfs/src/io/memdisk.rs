use crate::io::block::{BlockNumber, BlockStorage};
use crate::sb::SuperBlock;
use std::io::{Error, ErrorKind};

struct Slot<L> {
    data: Vec<u8>,
    /// Per-block metadata stored alongside the payload, e.g. the next block of a chain.
    link: L,
}

/// Emulates a block device in memory as a flat arena of fixed-size slots.
///
/// Each slot may carry a small piece of metadata `L` next to its payload. Layouts
/// that address blocks purely from an index use `()`; linked layouts store the
/// number of the following block there.
pub struct MemoryBlockEmulator<L = ()> {
    slots: Vec<Option<Slot<L>>>,
    block_size: usize,
}

impl<L> MemoryBlockEmulator<L> {
    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.slots.len() {
            return Err(Error::new(ErrorKind::InvalidInput, "block out of range"));
        }
        Ok(())
    }

    /// Returns the metadata attached to a written block.
    pub fn link(&self, blocknr: BlockNumber) -> Option<&L> {
        self.slots.get(blocknr)?.as_ref().map(|slot| &slot.link)
    }

    /// Attaches metadata to a block that already holds a payload.
    ///
    /// # Errors
    ///
    /// Fails when the block is out of range or has never been written.
    pub fn set_link(&mut self, blocknr: BlockNumber, link: L) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        match self.slots[blocknr].as_mut() {
            Some(slot) => {
                slot.link = link;
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NotFound, "block holds no data")),
        }
    }

    /// Number of blocks currently holding a payload.
    pub fn blocks_in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl<L: Default> BlockStorage for MemoryBlockEmulator<L> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.slots.len()
    }

    fn read_block(&self, blocknr: BlockNumber) -> Option<&[u8]> {
        self.slots
            .get(blocknr)?
            .as_ref()
            .map(|slot| slot.data.as_slice())
    }

    /// Rewriting a block keeps its link so a chain can be refilled in place.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() > self.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer exceeds the block size",
            ));
        }

        match self.slots[blocknr].as_mut() {
            Some(slot) => {
                slot.data.clear();
                slot.data.extend_from_slice(buf);
            }
            None => {
                self.slots[blocknr] = Some(Slot {
                    data: buf.to_vec(),
                    link: L::default(),
                })
            }
        }
        Ok(())
    }

    fn clear_block(&mut self, blocknr: BlockNumber) {
        if let Some(slot) = self.slots.get_mut(blocknr) {
            *slot = None;
        }
    }
}

pub struct MemoryBlockEmulatorBuilder {
    block_count: usize,
    block_size: usize,
}

impl Default for MemoryBlockEmulatorBuilder {
    fn default() -> Self {
        let sb = SuperBlock::default();
        Self {
            block_count: sb.blocks_count,
            block_size: sb.block_size,
        }
    }
}

impl From<&SuperBlock> for MemoryBlockEmulatorBuilder {
    fn from(sb: &SuperBlock) -> Self {
        Self {
            block_count: sb.blocks_count,
            block_size: sb.block_size,
        }
    }
}

impl MemoryBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the payload capacity of each block in bytes.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Builds an empty device. Every slot starts without a payload.
    pub fn build<L>(self) -> std::io::Result<MemoryBlockEmulator<L>> {
        if self.block_count == 0 || self.block_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "block count and block size must be non-zero",
            ));
        }
        let mut slots = Vec::with_capacity(self.block_count);
        slots.resize_with(self.block_count, || None);
        Ok(MemoryBlockEmulator {
            slots,
            block_size: self.block_size,
        })
    }
}
