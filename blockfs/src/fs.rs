use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use log::info;
use thiserror::Error;

use crate::io::BlockNumber;
use crate::node::{FileType, Ino, Node, NodeId};
use crate::path;
use crate::sb::SuperBlock;
use crate::tree::DirTree;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0}: no such file or directory")]
    NotFound(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("{0} is a directory")]
    IsADirectory(String),
    #[error("invalid target directory: {0}")]
    InvalidTarget(String),
    #[error("{0} already exists in the target directory")]
    NameCollision(String),
    #[error("inode table is full")]
    TableFull,
    #[error("disk full: no free blocks")]
    DiskFull,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("`{op}` is not available on the {backend} backend")]
    Unsupported { op: &'static str, backend: Backend },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("volume is inconsistent: {0}")]
    Inconsistent(String),
    #[error("invalid block access")]
    InvalidBlock(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// The storage layout a volume is built on. Chosen once, when the volume is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Every file keeps an ordered list of its blocks in an inode.
    Indexed,
    /// Every file keeps its first block; each block points at the next one.
    Chained,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Indexed => f.write_str("indexed"),
            Backend::Chained => f.write_str("chained"),
        }
    }
}

impl FromStr for Backend {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "indexed" | "inode" | "inodes" => Ok(Backend::Indexed),
            "2" | "chained" | "linked" | "linked-list" => Ok(Backend::Chained),
            other => Err(FsError::InvalidArgument(format!(
                "unknown backend {:?} (expected indexed or chained)",
                other
            ))),
        }
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file_type {
            FileType::Directory => write!(f, "{}/", self.name),
            FileType::Regular => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: NodeId,
    /// Only indexed volumes number their nodes.
    pub ino: Option<Ino>,
    pub file_type: FileType,
    pub size: usize,
    /// Owned blocks in content order.
    pub blocks: Vec<BlockNumber>,
    pub path: String,
}

/// An entry of an indexed volume's inode table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub ino: Ino,
    pub file_type: FileType,
    pub size: usize,
    pub blocks: Vec<BlockNumber>,
    pub path: String,
}

impl fmt::Display for InodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4}  {:<4}  {:>8}  {:<24}  {:?}",
            self.ino, self.file_type, self.size, self.path, self.blocks
        )
    }
}

/// Block layout strategy of a volume.
///
/// The volume owns the directory tree and hands nodes to the allocator; the
/// allocator owns the block pool and whatever per-node layout data (`Meta`)
/// it needs to find a file's blocks again.
pub trait Allocator {
    type Meta;

    fn backend(&self) -> Backend;

    /// Builds the layout data for a node about to be inserted under handle
    /// `id`. Returning an error aborts the insertion.
    fn attach(&mut self, id: NodeId) -> Result<Self::Meta>;

    /// Replaces the content of a regular file and sets its size.
    fn write(&mut self, node: &mut Node<Self::Meta>, data: &[u8]) -> Result<()>;

    /// Reassembles the whole content of a regular file.
    fn read(&self, node: &Node<Self::Meta>) -> Vec<u8>;

    /// Reads at most `len` bytes starting at byte `offset`.
    fn read_at(&self, node: &Node<Self::Meta>, offset: usize, len: usize) -> Vec<u8>;

    /// Returns every block and identifier the node owns to the pool. Called for
    /// each node of a subtree right before it is dropped from the tree.
    fn release(&mut self, node: &mut Node<Self::Meta>);

    /// Blocks owned by the node, in content order.
    fn blocks(&self, node: &Node<Self::Meta>) -> Vec<BlockNumber>;

    fn inode(&self, _node: &Node<Self::Meta>) -> Option<Ino> {
        None
    }

    /// Free block numbers, next to be allocated first.
    fn free_blocks(&self) -> Vec<BlockNumber>;

    fn statfs(&self) -> SuperBlock;

    fn inodes(&self, _tree: &DirTree<Self::Meta>) -> Result<Vec<InodeRecord>> {
        Err(FsError::Unsupported {
            op: "inodes",
            backend: self.backend(),
        })
    }

    /// Layout specific consistency checks.
    fn verify(&self, _tree: &DirTree<Self::Meta>) -> Result<()> {
        Ok(())
    }
}

/// Operations shared by every volume, whatever its block layout.
///
/// Paths may be absolute or relative to the current directory. The cursor is
/// part of the volume state, like a shell's working directory.
pub trait FileSystem {
    fn backend(&self) -> Backend;

    /// Creates a directory. Fails with `AlreadyExists` on a taken name.
    fn mkdir(&mut self, path: &str) -> Result<NodeId>;

    /// Creates an empty regular file. Fails with `AlreadyExists` on a taken name.
    fn touch(&mut self, path: &str) -> Result<NodeId>;

    /// Children of the current directory in insertion order.
    fn ls(&self) -> Vec<DirEntry>;

    /// Changes the current directory.
    fn cd(&mut self, path: &str) -> Result<()>;

    /// Absolute path of the current directory.
    fn pwd(&self) -> String;

    /// Moves `source` into `target_dir`, a directory directly under the
    /// current directory. Either the whole move happens or nothing changes.
    fn move_node(&mut self, source: &str, target_dir: &str) -> Result<()>;

    /// Replaces the content of a regular file.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Reads at most `len` bytes starting at `offset`. Offsets past the end of
    /// the file read nothing.
    fn read_at(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Deletes a file or a whole directory subtree, returning its blocks.
    fn delete(&mut self, path: &str) -> Result<()>;

    fn stat(&self, path: &str) -> Result<Metadata>;

    fn lookup(&self, path: &str) -> Result<NodeId>;

    /// Absolute path of a live node.
    fn path_of(&self, id: NodeId) -> Option<String>;

    fn free_blocks(&self) -> Vec<BlockNumber>;

    fn statfs(&self) -> SuperBlock;

    /// Inode table dump, for layouts that have one.
    fn inodes(&self) -> Result<Vec<InodeRecord>>;

    /// Checks tree links, block ownership and layout metadata.
    fn verify(&self) -> Result<()>;
}

/// A directory tree, its cursor and a block allocator.
pub struct Volume<A: Allocator> {
    tree: DirTree<A::Meta>,
    cwd: NodeId,
    alloc: A,
}

impl<A: Allocator> Volume<A> {
    pub fn new(mut alloc: A) -> Result<Self> {
        let tree = DirTree::with_root(|id| alloc.attach(id))?;
        let cwd = tree.root();
        info!("created {} volume", alloc.backend());
        Ok(Self { tree, cwd, alloc })
    }

    fn create_node(&mut self, path: &str, file_type: FileType) -> Result<NodeId> {
        let (parent, name) = path::resolve(&self.tree, self.cwd, path)?;
        path::validate_name(name)?;
        let alloc = &mut self.alloc;
        let id = self
            .tree
            .insert_with(parent, name, file_type, |id| alloc.attach(id))?;
        info!("created {} {}", file_type, self.tree.path(id));
        Ok(id)
    }

    /// Resolves a path that must name a regular file.
    fn regular(&self, path: &str) -> Result<NodeId> {
        let id = path::lookup(&self.tree, self.cwd, path)?;
        if self.tree[id].is_dir() {
            return Err(FsError::IsADirectory(self.tree.path(id)));
        }
        Ok(id)
    }

    fn verify_tree(&self) -> Result<()> {
        let root = self.tree.root();
        for (id, node) in self.tree.iter() {
            match node.parent() {
                None if id != root => {
                    return Err(FsError::Inconsistent(format!("{} has no parent", id)))
                }
                Some(_) if id == root => {
                    return Err(FsError::Inconsistent("the root has a parent".into()))
                }
                None => (),
                Some(parent) => {
                    let listed = self
                        .tree
                        .get(parent)
                        .map(|p| p.children().iter().filter(|&&c| c == id).count())
                        .unwrap_or(0);
                    if listed != 1 {
                        return Err(FsError::Inconsistent(format!(
                            "{} is listed {} times by its parent",
                            id, listed
                        )));
                    }
                }
            }

            let mut names = HashSet::new();
            for &child in node.children() {
                let entry = self.tree.get(child).ok_or_else(|| {
                    FsError::Inconsistent(format!("{} lists a dead child {}", id, child))
                })?;
                if entry.parent() != Some(id) {
                    return Err(FsError::Inconsistent(format!(
                        "{} does not point back to {}",
                        child, id
                    )));
                }
                if !names.insert(entry.name()) {
                    return Err(FsError::Inconsistent(format!(
                        "duplicate name {} under {}",
                        entry.name(),
                        id
                    )));
                }
            }
        }

        let reachable = self.tree.subtree(root).len();
        if reachable != self.tree.len() {
            return Err(FsError::Inconsistent(format!(
                "{} of {} nodes are reachable from the root",
                reachable,
                self.tree.len()
            )));
        }
        Ok(())
    }

    fn verify_blocks(&self) -> Result<()> {
        let capacity = self.alloc.statfs().blocks_count;
        let free: HashSet<BlockNumber> = self.alloc.free_blocks().into_iter().collect();
        let mut owned = HashSet::new();
        for (id, node) in self.tree.iter() {
            for blocknr in self.alloc.blocks(node) {
                if blocknr >= capacity || free.contains(&blocknr) || !owned.insert(blocknr) {
                    return Err(FsError::Inconsistent(format!(
                        "block {} of {} is free, shared or out of range",
                        blocknr, id
                    )));
                }
            }
        }
        if free.len() + owned.len() != capacity {
            return Err(FsError::Inconsistent(format!(
                "{} free + {} owned blocks != {}",
                free.len(),
                owned.len(),
                capacity
            )));
        }
        Ok(())
    }
}

impl<A: Allocator> FileSystem for Volume<A> {
    fn backend(&self) -> Backend {
        self.alloc.backend()
    }

    fn mkdir(&mut self, path: &str) -> Result<NodeId> {
        self.create_node(path, FileType::Directory)
    }

    fn touch(&mut self, path: &str) -> Result<NodeId> {
        self.create_node(path, FileType::Regular)
    }

    fn ls(&self) -> Vec<DirEntry> {
        self.tree[self.cwd]
            .children()
            .iter()
            .map(|&child| {
                let node = &self.tree[child];
                DirEntry {
                    name: node.name().to_string(),
                    file_type: node.file_type(),
                }
            })
            .collect()
    }

    fn cd(&mut self, path: &str) -> Result<()> {
        let id = path::lookup(&self.tree, self.cwd, path)?;
        if !self.tree[id].is_dir() {
            return Err(FsError::NotADirectory(self.tree.path(id)));
        }
        self.cwd = id;
        Ok(())
    }

    fn pwd(&self) -> String {
        self.tree.path(self.cwd)
    }

    fn move_node(&mut self, source: &str, target_dir: &str) -> Result<()> {
        let (parent, name) = path::resolve(&self.tree, self.cwd, source)?;
        let src = self
            .tree
            .child(parent, name)
            .ok_or_else(|| FsError::NotFound(source.to_string()))?;
        let target = self
            .tree
            .child(self.cwd, target_dir)
            .ok_or_else(|| FsError::InvalidTarget(format!("{} does not exist", target_dir)))?;

        self.tree.relocate(src, target)?;
        info!("moved {} to {}", source, self.tree.path(src));
        Ok(())
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let id = self.regular(path)?;
        self.alloc.write(&mut self.tree[id], data)?;
        info!("wrote {} bytes to {}", data.len(), self.tree.path(id));
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let id = self.regular(path)?;
        Ok(self.alloc.read(&self.tree[id]))
    }

    fn read_at(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        let id = self.regular(path)?;
        Ok(self.alloc.read_at(&self.tree[id], offset, len))
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        let id = path::lookup(&self.tree, self.cwd, path)?;
        if self.tree.is_ancestor(id, self.cwd) {
            return Err(FsError::InvalidTarget(format!(
                "{} contains the current directory",
                self.tree.path(id)
            )));
        }

        let path = self.tree.path(id);
        let doomed = self.tree.subtree(id);
        for &nr in &doomed {
            self.alloc.release(&mut self.tree[nr]);
        }
        self.tree.remove(id)?;
        info!("deleted {} ({} nodes)", path, doomed.len());
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let id = path::lookup(&self.tree, self.cwd, path)?;
        let node = &self.tree[id];
        Ok(Metadata {
            id,
            ino: self.alloc.inode(node),
            file_type: node.file_type(),
            size: node.size(),
            blocks: self.alloc.blocks(node),
            path: self.tree.path(id),
        })
    }

    fn lookup(&self, path: &str) -> Result<NodeId> {
        path::lookup(&self.tree, self.cwd, path)
    }

    fn path_of(&self, id: NodeId) -> Option<String> {
        if self.tree.contains(id) {
            Some(self.tree.path(id))
        } else {
            None
        }
    }

    fn free_blocks(&self) -> Vec<BlockNumber> {
        self.alloc.free_blocks()
    }

    fn statfs(&self) -> SuperBlock {
        self.alloc.statfs()
    }

    fn inodes(&self) -> Result<Vec<InodeRecord>> {
        self.alloc.inodes(&self.tree)
    }

    fn verify(&self) -> Result<()> {
        self.verify_tree()?;
        self.verify_blocks()?;
        self.alloc.verify(&self.tree)
    }
}
