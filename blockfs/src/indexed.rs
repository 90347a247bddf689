//! Indexed allocation: each node owns an inode whose block list records the
//! file's blocks in content order.
//!
//! Locating byte `k` of a file is a single index into that list
//! (`k / block_size`), whatever the file length.

use std::cmp;
use std::mem;

use log::{debug, warn};

use crate::alloc::BlockPool;
use crate::fs::{Allocator, Backend, FsError, InodeRecord, Result};
use crate::io::{BlockNumber, BlockStorage, MemoryBlockEmulatorBuilder};
use crate::node::{Ino, InodeTable, Node, NodeId};
use crate::sb::SuperBlock;
use crate::tree::DirTree;

/// Layout record of a node on an indexed volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    ino: Ino,
    /// Pointers to the data blocks that belong to the file, in content order.
    blocks: Vec<BlockNumber>,
}

impl Inode {
    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn blocks(&self) -> &[BlockNumber] {
        &self.blocks
    }
}

pub struct IndexedAllocator {
    pool: BlockPool<()>,
    inodes: InodeTable,
}

impl IndexedAllocator {
    pub fn new(sb: &SuperBlock) -> Result<Self> {
        sb.validate()?;
        if sb.inodes_count == 0 {
            return Err(FsError::InvalidArgument(
                "the inode table needs room for the root directory".to_string(),
            ));
        }
        let dev = MemoryBlockEmulatorBuilder::from(sb).build()?;
        Ok(Self {
            pool: BlockPool::new(dev),
            inodes: InodeTable::new(sb.inodes_count),
        })
    }

    pub fn inode_table(&self) -> &InodeTable {
        &self.inodes
    }

    fn release_blocks(&mut self, blocks: Vec<BlockNumber>) {
        for blocknr in blocks {
            if let Err(e) = self.pool.free(blocknr) {
                warn!("could not release block {}: {}", blocknr, e);
            }
        }
    }
}

impl Allocator for IndexedAllocator {
    type Meta = Inode;

    fn backend(&self) -> Backend {
        Backend::Indexed
    }

    fn attach(&mut self, id: NodeId) -> Result<Inode> {
        let ino = self.inodes.insert(id)?;
        debug!("inode {} assigned to node {}", ino, id);
        Ok(Inode {
            ino,
            blocks: Vec::new(),
        })
    }

    /// New blocks are claimed before the old ones are given back. If the pool
    /// runs dry halfway, the blocks claimed so far are returned and the file
    /// keeps its previous content.
    fn write(&mut self, node: &mut Node<Inode>, data: &[u8]) -> Result<()> {
        let block_size = self.pool.block_size();
        let needed = self.pool.blocks_for(data.len());
        let mut fresh = Vec::with_capacity(needed);

        for chunk in data.chunks(block_size) {
            match self.pool.allocate(chunk) {
                Ok(blocknr) => fresh.push(blocknr),
                Err(e) => {
                    warn!(
                        "inode {}: allocation failed after {} of {} blocks, rolling back",
                        node.meta.ino,
                        fresh.len(),
                        needed
                    );
                    self.release_blocks(fresh);
                    return Err(e);
                }
            }
        }

        let old = mem::replace(&mut node.meta.blocks, fresh);
        self.release_blocks(old);
        node.size = data.len();
        debug!(
            "inode {} now holds {} bytes in blocks {:?}",
            node.meta.ino, node.size, node.meta.blocks
        );
        Ok(())
    }

    fn read(&self, node: &Node<Inode>) -> Vec<u8> {
        let dev = self.pool.device();
        let mut content = Vec::with_capacity(node.size);
        for &blocknr in &node.meta.blocks {
            // A block missing from the store contributes nothing.
            if let Some(data) = dev.read_block(blocknr) {
                content.extend_from_slice(data);
            }
        }
        content
    }

    fn read_at(&self, node: &Node<Inode>, offset: usize, len: usize) -> Vec<u8> {
        if len == 0 || offset >= node.size {
            return Vec::new();
        }
        let block_size = self.pool.block_size();
        let end = cmp::min(offset.saturating_add(len), node.size);
        let first = offset / block_size;
        let last = (end - 1) / block_size;

        let dev = self.pool.device();
        let mut out = Vec::with_capacity(end - offset);
        let span = &node.meta.blocks[first..=last];
        for (index, &blocknr) in span.iter().enumerate() {
            let data = dev.read_block(blocknr).unwrap_or(&[]);
            let block_start = (first + index) * block_size;
            let from = offset.saturating_sub(block_start);
            let to = cmp::min(end - block_start, data.len());
            if from < to {
                out.extend_from_slice(&data[from..to]);
            }
        }
        out
    }

    fn release(&mut self, node: &mut Node<Inode>) {
        let blocks = mem::take(&mut node.meta.blocks);
        debug!("inode {}: releasing {} blocks", node.meta.ino, blocks.len());
        self.release_blocks(blocks);
        self.inodes.remove(node.meta.ino);
        node.size = 0;
    }

    fn blocks(&self, node: &Node<Inode>) -> Vec<BlockNumber> {
        node.meta.blocks.clone()
    }

    fn inode(&self, node: &Node<Inode>) -> Option<Ino> {
        Some(node.meta.ino)
    }

    fn free_blocks(&self) -> Vec<BlockNumber> {
        self.pool.free_list().iter().collect()
    }

    fn statfs(&self) -> SuperBlock {
        let free = self.pool.free_list();
        SuperBlock {
            block_size: self.pool.block_size(),
            blocks_count: free.capacity(),
            free_blocks_count: free.len(),
            inodes_count: self.inodes.capacity(),
            free_inodes_count: self.inodes.free_count(),
        }
    }

    fn inodes(&self, tree: &DirTree<Inode>) -> Result<Vec<InodeRecord>> {
        self.inodes
            .iter()
            .map(|(ino, id)| {
                let node = tree.get(id).ok_or_else(|| {
                    FsError::Inconsistent(format!("inode {} points at dead node {}", ino, id))
                })?;
                Ok(InodeRecord {
                    ino,
                    file_type: node.file_type(),
                    size: node.size(),
                    blocks: node.meta.blocks.clone(),
                    path: tree.path(id),
                })
            })
            .collect()
    }

    fn verify(&self, tree: &DirTree<Inode>) -> Result<()> {
        if self.inodes.total_nodes() != tree.len() {
            return Err(FsError::Inconsistent(format!(
                "{} inodes for {} nodes",
                self.inodes.total_nodes(),
                tree.len()
            )));
        }
        for (id, node) in tree.iter() {
            if self.inodes.get(node.meta.ino) != Some(id) {
                return Err(FsError::Inconsistent(format!(
                    "inode {} does not map back to node {}",
                    node.meta.ino, id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileType;

    fn allocator(blocks: usize, block_size: usize) -> IndexedAllocator {
        IndexedAllocator::new(&SuperBlock::new(blocks, block_size).with_inodes(8)).unwrap()
    }

    fn file(alloc: &mut IndexedAllocator, id: usize) -> Node<Inode> {
        let meta = alloc.attach(NodeId(id)).unwrap();
        Node::new("f", Some(NodeId(0)), FileType::Regular, meta)
    }

    #[test]
    fn write_splits_data_into_ceiling_divided_blocks() {
        let mut alloc = allocator(8, 4);
        let mut f = file(&mut alloc, 1);

        alloc.write(&mut f, b"abcdefghij").unwrap();

        assert_eq!(f.meta.blocks, vec![0, 1, 2]);
        assert_eq!(f.size(), 10);
        assert_eq!(alloc.read(&f), b"abcdefghij".to_vec());
        assert_eq!(alloc.statfs().free_blocks_count, 5);
    }

    #[test]
    fn rewrite_frees_old_blocks_after_new_ones_are_claimed() {
        let mut alloc = allocator(8, 4);
        let mut f = file(&mut alloc, 1);
        alloc.write(&mut f, b"abcdefgh").unwrap();

        alloc.write(&mut f, b"xyz").unwrap();

        assert_eq!(f.meta.blocks, vec![2]);
        assert_eq!(alloc.read(&f), b"xyz".to_vec());
        assert_eq!(alloc.free_blocks(), vec![3, 4, 5, 6, 7, 0, 1]);
    }

    #[test]
    fn disk_full_rolls_back_and_keeps_old_content() {
        let mut alloc = allocator(3, 2);
        let mut f = file(&mut alloc, 1);
        alloc.write(&mut f, b"ab").unwrap();

        match alloc.write(&mut f, b"cdefgh") {
            Err(FsError::DiskFull) => (),
            other => panic!("expected DiskFull, got {:?}", other),
        }

        assert_eq!(alloc.read(&f), b"ab".to_vec());
        assert_eq!(f.size(), 2);
        assert_eq!(f.meta.blocks, vec![0]);
        assert_eq!(alloc.statfs().free_blocks_count, 2);
    }

    #[test]
    fn read_skips_blocks_missing_from_the_store() {
        let mut alloc = allocator(8, 4);
        let mut f = file(&mut alloc, 1);
        alloc.write(&mut f, b"AAAABBBBCC").unwrap();

        alloc.pool.device_mut().clear_block(f.meta.blocks[1]);

        assert_eq!(alloc.read(&f), b"AAAACC".to_vec());
    }

    #[test]
    fn read_at_indexes_blocks_directly() {
        let mut alloc = allocator(8, 4);
        let mut f = file(&mut alloc, 1);
        alloc.write(&mut f, b"ABCDEFGHIJKLMNOP").unwrap();

        assert_eq!(alloc.read_at(&f, 0, 4), b"ABCD".to_vec());
        assert_eq!(alloc.read_at(&f, 3, 6), b"DEFGHI".to_vec());
        assert_eq!(alloc.read_at(&f, 14, 10), b"OP".to_vec());
        assert_eq!(alloc.read_at(&f, 16, 1), Vec::<u8>::new());
        assert_eq!(alloc.read_at(&f, 5, 0), Vec::<u8>::new());
    }

    #[test]
    fn release_returns_blocks_and_inode() {
        let mut alloc = allocator(4, 4);
        let mut f = file(&mut alloc, 1);
        alloc.write(&mut f, b"abcdefgh").unwrap();
        assert_eq!(alloc.inode_table().total_nodes(), 1);

        alloc.release(&mut f);

        assert_eq!(alloc.statfs().free_blocks_count, 4);
        assert_eq!(alloc.inode_table().total_nodes(), 0);
        assert!(f.meta.blocks.is_empty());
    }

    #[test]
    fn exhausted_inode_table_refuses_attach() {
        let mut alloc = IndexedAllocator::new(&SuperBlock::new(4, 4).with_inodes(1)).unwrap();
        alloc.attach(NodeId(0)).unwrap();

        assert!(matches!(alloc.attach(NodeId(1)), Err(FsError::TableFull)));
    }

    #[test]
    fn empty_inode_table_is_rejected() {
        let result = IndexedAllocator::new(&SuperBlock::new(4, 4).with_inodes(0));
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }
}
