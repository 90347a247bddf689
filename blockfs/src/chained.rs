//! Linked allocation: a file records only its first block and every block
//! stores the number of the one after it.
//!
//! Reaching byte `k` means following `k / block_size` links from the head of
//! the chain, so random access grows with the offset.

use std::cmp;

use log::{debug, warn};

use crate::alloc::BlockPool;
use crate::fs::{Allocator, Backend, FsError, Result};
use crate::io::{BlockNumber, BlockStorage, MemoryBlockEmulator, MemoryBlockEmulatorBuilder};
use crate::node::{Node, NodeId};
use crate::sb::SuperBlock;
use crate::tree::DirTree;

type Link = Option<BlockNumber>;

/// Layout record of a node on a chained volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainHead {
    start_block: Option<BlockNumber>,
}

impl ChainHead {
    pub fn start_block(&self) -> Option<BlockNumber> {
        self.start_block
    }
}

/// Walks a chain from its head. Stops after as many steps as there are blocks
/// so a corrupted, cyclic chain cannot loop forever.
struct Chain<'a> {
    dev: &'a MemoryBlockEmulator<Link>,
    next: Option<BlockNumber>,
    remaining: usize,
}

impl<'a> Iterator for Chain<'a> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let blocknr = self.next?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.next = self.dev.link(blocknr).copied().flatten();
        Some(blocknr)
    }
}

pub struct ChainedAllocator {
    pool: BlockPool<Link>,
}

impl ChainedAllocator {
    pub fn new(sb: &SuperBlock) -> Result<Self> {
        sb.validate()?;
        let dev = MemoryBlockEmulatorBuilder::from(sb).build()?;
        Ok(Self {
            pool: BlockPool::new(dev),
        })
    }

    fn chain(&self, start: Option<BlockNumber>) -> Chain<'_> {
        let dev = self.pool.device();
        Chain {
            dev,
            next: start,
            remaining: dev.block_count(),
        }
    }

    /// Returns every block of the chain starting at `start` to the free list.
    fn free_chain(&mut self, start: Option<BlockNumber>) {
        let blocks: Vec<BlockNumber> = self.chain(start).collect();
        for blocknr in blocks {
            if let Err(e) = self.pool.free(blocknr) {
                warn!("could not release block {}: {}", blocknr, e);
            }
        }
    }

    /// Allocates one block per chunk, pointing each block at its successor.
    /// On failure the partial chain is released before the error is returned.
    fn build_chain(&mut self, data: &[u8]) -> Result<Option<BlockNumber>> {
        let block_size = self.pool.block_size();
        let mut first = None;
        let mut prev = None;

        for chunk in data.chunks(block_size) {
            let blocknr = match self.pool.allocate(chunk) {
                Ok(blocknr) => blocknr,
                Err(e) => {
                    self.free_chain(first);
                    return Err(e);
                }
            };
            match prev {
                Some(prev) => {
                    if let Err(e) = self.pool.device_mut().set_link(prev, Some(blocknr)) {
                        self.free_chain(first);
                        self.free_chain(Some(blocknr));
                        return Err(e.into());
                    }
                }
                None => first = Some(blocknr),
            }
            prev = Some(blocknr);
        }
        Ok(first)
    }
}

impl Allocator for ChainedAllocator {
    type Meta = ChainHead;

    fn backend(&self) -> Backend {
        Backend::Chained
    }

    fn attach(&mut self, _id: NodeId) -> Result<ChainHead> {
        Ok(ChainHead::default())
    }

    /// The old chain is released before the new one is built. If the pool runs
    /// dry, the file is left empty: its previous content is already gone.
    fn write(&mut self, node: &mut Node<ChainHead>, data: &[u8]) -> Result<()> {
        let old = node.meta.start_block.take();
        self.free_chain(old);
        node.size = 0;

        match self.build_chain(data) {
            Ok(first) => {
                node.meta.start_block = first;
                node.size = data.len();
                debug!("chain for {} starts at {:?}", node.name(), first);
                Ok(())
            }
            Err(e) => {
                warn!("{}: chain allocation failed, file left empty", node.name());
                Err(e)
            }
        }
    }

    fn read(&self, node: &Node<ChainHead>) -> Vec<u8> {
        let dev = self.pool.device();
        let mut content = Vec::with_capacity(node.size);
        for blocknr in self.chain(node.meta.start_block) {
            if let Some(data) = dev.read_block(blocknr) {
                content.extend_from_slice(data);
            }
        }
        content
    }

    fn read_at(&self, node: &Node<ChainHead>, offset: usize, len: usize) -> Vec<u8> {
        if len == 0 || offset >= node.size {
            return Vec::new();
        }
        let block_size = self.pool.block_size();
        let end = cmp::min(offset.saturating_add(len), node.size);
        let skip = offset / block_size;

        let dev = self.pool.device();
        let mut out = Vec::with_capacity(end - offset);
        // Every block before the one holding `offset` still has to be visited.
        for (index, blocknr) in self.chain(node.meta.start_block).enumerate().skip(skip) {
            let block_start = index * block_size;
            if block_start >= end {
                break;
            }
            let data = dev.read_block(blocknr).unwrap_or(&[]);
            let from = offset.saturating_sub(block_start);
            let to = cmp::min(end - block_start, data.len());
            if from < to {
                out.extend_from_slice(&data[from..to]);
            }
        }
        out
    }

    fn release(&mut self, node: &mut Node<ChainHead>) {
        let start = node.meta.start_block.take();
        self.free_chain(start);
        node.size = 0;
    }

    fn blocks(&self, node: &Node<ChainHead>) -> Vec<BlockNumber> {
        self.chain(node.meta.start_block).collect()
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
            inodes_count: 0,
            free_inodes_count: 0,
        }
    }

    fn verify(&self, tree: &DirTree<ChainHead>) -> Result<()> {
        for (id, node) in tree.iter() {
            let length = self.chain(node.meta.start_block).count();
            let expected = self.pool.blocks_for(node.size);
            if length != expected {
                return Err(FsError::Inconsistent(format!(
                    "node {} has {} chained blocks for {} bytes",
                    id, length, node.size
                )));
            }
            let tail = self.chain(node.meta.start_block).last();
            if let Some(tail) = tail {
                if self.pool.device().link(tail).copied().flatten().is_some() {
                    return Err(FsError::Inconsistent(format!(
                        "chain of node {} does not terminate",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileType;

    fn allocator(blocks: usize, block_size: usize) -> ChainedAllocator {
        ChainedAllocator::new(&SuperBlock::new(blocks, block_size)).unwrap()
    }

    fn file() -> Node<ChainHead> {
        Node::new("f", Some(NodeId(0)), FileType::Regular, ChainHead::default())
    }

    fn links(alloc: &ChainedAllocator, start: BlockNumber) -> Vec<Option<BlockNumber>> {
        alloc
            .chain(Some(start))
            .map(|b| alloc.pool.device().link(b).copied().flatten())
            .collect()
    }

    #[test]
    fn write_links_blocks_in_order() {
        let mut alloc = allocator(8, 4);
        let mut f = file();

        alloc.write(&mut f, b"abcdefghij").unwrap();

        assert_eq!(f.meta.start_block(), Some(0));
        assert_eq!(links(&alloc, 0), vec![Some(1), Some(2), None]);
        assert_eq!(alloc.read(&f), b"abcdefghij".to_vec());
        assert_eq!(f.size(), 10);
    }

    #[test]
    fn rewrite_frees_old_chain_first() {
        let mut alloc = allocator(4, 4);
        let mut f = file();
        alloc.write(&mut f, b"abcdefgh").unwrap();

        // Needs all four blocks, which only works because the old two are freed first.
        alloc.write(&mut f, b"ABCDEFGHIJKLMNOP").unwrap();

        assert_eq!(alloc.read(&f), b"ABCDEFGHIJKLMNOP".to_vec());
        assert_eq!(alloc.statfs().free_blocks_count, 0);
        assert_eq!(alloc.blocks(&f), vec![2, 3, 0, 1]);
    }

    #[test]
    fn disk_full_discards_old_content() {
        let mut alloc = allocator(3, 2);
        let mut f = file();
        alloc.write(&mut f, b"ab").unwrap();

        match alloc.write(&mut f, b"cdefghij") {
            Err(FsError::DiskFull) => (),
            other => panic!("expected DiskFull, got {:?}", other),
        }

        assert_eq!(f.meta.start_block(), None);
        assert_eq!(f.size(), 0);
        assert!(alloc.read(&f).is_empty());
        assert_eq!(alloc.statfs().free_blocks_count, 3);
    }

    #[test]
    fn read_at_walks_from_the_head() {
        let mut alloc = allocator(8, 4);
        let mut f = file();
        alloc.write(&mut f, b"ABCDEFGHIJKLMNOP").unwrap();

        assert_eq!(alloc.read_at(&f, 0, 4), b"ABCD".to_vec());
        assert_eq!(alloc.read_at(&f, 3, 6), b"DEFGHI".to_vec());
        assert_eq!(alloc.read_at(&f, 14, 10), b"OP".to_vec());
        assert!(alloc.read_at(&f, 20, 1).is_empty());
    }

    #[test]
    fn release_returns_whole_chain() {
        let mut alloc = allocator(4, 2);
        let mut f = file();
        alloc.write(&mut f, b"abcdef").unwrap();

        alloc.release(&mut f);

        assert_eq!(alloc.statfs().free_blocks_count, 4);
        assert_eq!(f.meta.start_block(), None);
        assert_eq!(alloc.pool.device().blocks_in_use(), 0);
    }

    #[test]
    fn empty_write_leaves_no_chain() {
        let mut alloc = allocator(2, 2);
        let mut f = file();
        alloc.write(&mut f, b"ab").unwrap();

        alloc.write(&mut f, b"").unwrap();

        assert_eq!(f.meta.start_block(), None);
        assert_eq!(f.size(), 0);
        assert_eq!(alloc.statfs().free_blocks_count, 2);
    }
}
