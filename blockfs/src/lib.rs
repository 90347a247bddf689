//! In-memory volumes built on two classic block layouts:
//!
//! * **indexed**: every node owns an inode listing its blocks in order, and an
//!   inode table of fixed capacity maps inode numbers to nodes;
//! * **chained**: every file records its first block and each block links to
//!   the next.
//!
//! Both sit under the same directory tree and expose the same [`FileSystem`]
//! operations, so the layouts can be swapped and compared under identical
//! workloads. The layout is picked when a volume is created and never changes.
//!
//! ```
//! use blockfs::{Backend, FileSystem, SuperBlock};
//!
//! let mut fs = blockfs::create(Backend::Chained, &SuperBlock::new(16, 4)).unwrap();
//! fs.touch("notes").unwrap();
//! fs.write("notes", b"hello world").unwrap();
//! assert_eq!(fs.read("notes").unwrap(), b"hello world");
//! ```

mod alloc;
pub mod chained;
pub mod command;
mod fs;
pub mod indexed;
pub mod io;
mod node;
mod path;
mod sb;
mod tree;

pub use crate::alloc::{Bitmap, FreeList, State};
pub use crate::chained::ChainedAllocator;
pub use crate::command::{run_session, Command, Outcome};
pub use crate::fs::{
    Allocator, Backend, DirEntry, FileSystem, FsError, InodeRecord, Metadata, Result, Volume,
};
pub use crate::indexed::IndexedAllocator;
pub use crate::node::{FileType, Ino, InodeTable, Node, NodeId, ROOT_INO};
pub use crate::path::validate_name;
pub use crate::sb::{SuperBlock, DEFAULT_BLOCKS_COUNT, DEFAULT_BLOCK_SIZE, DEFAULT_INODES_COUNT};
pub use crate::tree::DirTree;

/// A volume using the inode layout.
pub type IndexedFs = Volume<IndexedAllocator>;
/// A volume using the linked-block layout.
pub type ChainedFs = Volume<ChainedAllocator>;

impl IndexedFs {
    pub fn create(sb: &SuperBlock) -> Result<Self> {
        Volume::new(IndexedAllocator::new(sb)?)
    }
}

impl ChainedFs {
    pub fn create(sb: &SuperBlock) -> Result<Self> {
        Volume::new(ChainedAllocator::new(sb)?)
    }
}

/// Builds an empty volume with the requested layout.
pub fn create(backend: Backend, sb: &SuperBlock) -> Result<Box<dyn FileSystem>> {
    Ok(match backend {
        Backend::Indexed => Box::new(IndexedFs::create(sb)?),
        Backend::Chained => Box::new(ChainedFs::create(sb)?),
    })
}
