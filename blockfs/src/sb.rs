use crate::fs::{FsError, Result};
use crate::node::Ino;
use std::fmt;

/// Payload capacity of a block when nothing else is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 64;
/// Number of data blocks when nothing else is configured.
pub const DEFAULT_BLOCKS_COUNT: usize = 1024;
/// Inode table capacity when nothing else is configured.
pub const DEFAULT_INODES_COUNT: usize = 1024;

/// Describes the geometry of a volume and, when returned from
/// [`FileSystem::statfs`](crate::FileSystem::statfs), its current usage.
///
/// The number of inodes available in the file system ultimately sets the upper
/// bound on how many files and directories can exist on an indexed volume.
/// Chained volumes keep no inode table and report zero for both inode counters.
///
/// Empty files and directories don't allocate any data blocks but do allocate
/// inodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Size in bytes of each data block.
    pub block_size: usize,
    /// All blocks of the data region.
    pub blocks_count: usize,
    /// All blocks available to be allocated by the system.
    pub free_blocks_count: usize,
    /// Capacity of the inode table.
    pub inodes_count: usize,
    /// The number of remaining available inodes.
    pub free_inodes_count: usize,
}

impl Default for SuperBlock {
    fn default() -> Self {
        SuperBlock::new(DEFAULT_BLOCKS_COUNT, DEFAULT_BLOCK_SIZE)
    }
}

impl SuperBlock {
    /// A fresh volume layout with every block and inode free.
    pub fn new(blocks_count: usize, block_size: usize) -> Self {
        Self {
            block_size,
            blocks_count,
            free_blocks_count: blocks_count,
            inodes_count: DEFAULT_INODES_COUNT,
            free_inodes_count: DEFAULT_INODES_COUNT,
        }
    }

    /// Sets the inode table capacity.
    pub fn with_inodes(mut self, inodes_count: usize) -> Self {
        self.inodes_count = inodes_count;
        self.free_inodes_count = inodes_count;
        self
    }

    /// Rejects layouts no volume can be built on.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(FsError::InvalidArgument(
                "block size must be at least one byte".to_string(),
            ));
        }
        if self.blocks_count == 0 {
            return Err(FsError::InvalidArgument(
                "volume needs at least one data block".to_string(),
            ));
        }
        // Inode numbers run from 0 to inodes_count - 1.
        if self.inodes_count.saturating_sub(1) > Ino::MAX as usize {
            return Err(FsError::InvalidArgument(format!(
                "at most {} inodes can be numbered",
                u64::from(Ino::MAX) + 1
            )));
        }
        Ok(())
    }

    /// Bytes that can still be written before the volume is full, capped at
    /// `usize::MAX`.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks_count.saturating_mul(self.block_size)
    }
}

impl fmt::Display for SuperBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block size:   {} bytes", self.block_size)?;
        writeln!(
            f,
            "blocks:       {} free of {} ({} bytes free)",
            self.free_blocks_count,
            self.blocks_count,
            self.free_bytes()
        )?;
        write!(
            f,
            "inodes:       {} free of {}",
            self.free_inodes_count, self.inodes_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_starts_empty() {
        let sb = SuperBlock::default();
        assert_eq!(sb.block_size, 64);
        assert_eq!(sb.blocks_count, 1024);
        assert_eq!(sb.free_blocks_count, sb.blocks_count);
        assert_eq!(sb.free_inodes_count, sb.inodes_count);
        assert!(sb.validate().is_ok());
    }

    #[test]
    fn with_inodes_resets_free_counter() {
        let sb = SuperBlock::new(8, 4).with_inodes(3);
        assert_eq!(sb.inodes_count, 3);
        assert_eq!(sb.free_inodes_count, 3);
        assert_eq!(sb.free_bytes(), 32);
    }

    #[test]
    fn zero_sized_layouts_are_invalid() {
        match SuperBlock::new(0, 4).validate() {
            Err(FsError::InvalidArgument(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(SuperBlock::new(4, 0).validate().is_err());
    }

    #[test]
    fn free_bytes_saturates_on_huge_blocks() {
        let sb = SuperBlock::new(4, usize::MAX);
        assert!(sb.validate().is_ok());
        assert_eq!(sb.free_bytes(), usize::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn inode_count_must_fit_inode_numbers() {
        let max = Ino::MAX as usize + 1;
        assert!(SuperBlock::new(4, 4).with_inodes(max).validate().is_ok());
        match SuperBlock::new(4, 4).with_inodes(max + 1).validate() {
            Err(FsError::InvalidArgument(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
