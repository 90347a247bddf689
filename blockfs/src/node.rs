use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use crate::alloc::Bitmap;
use crate::fs::{FsError, Result};

/// Inode number of the root directory on indexed volumes.
pub const ROOT_INO: Ino = 0;

/// Handle to a node in a volume's directory tree. Handles of deleted nodes may
/// be reused by later creations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inode number within an indexed volume's inode table.
pub type Ino = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Directory,
    Regular,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Directory => f.write_str("dir"),
            FileType::Regular => f.write_str("file"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Children in insertion order. The parent owns them.
    Directory(Vec<NodeId>),
    Regular,
}

/// A file or directory. `M` is whatever layout data the volume's allocator keeps
/// per node (an inode with its block list, or the head of a block chain).
#[derive(Debug, Clone)]
pub struct Node<M> {
    pub(crate) name: String,
    /// Non-owning back-reference. Only the root has none.
    pub(crate) parent: Option<NodeId>,
    /// The total size of the file in bytes. Always zero for directories.
    pub(crate) size: usize,
    pub(crate) kind: NodeKind,
    pub(crate) meta: M,
}

impl<M> Node<M> {
    pub(crate) fn new(name: &str, parent: Option<NodeId>, file_type: FileType, meta: M) -> Self {
        let kind = match file_type {
            FileType::Directory => NodeKind::Directory(Vec::new()),
            FileType::Regular => NodeKind::Regular,
        };
        Self {
            name: name.to_string(),
            parent,
            size: 0,
            kind,
            meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            NodeKind::Directory(_) => FileType::Directory,
            NodeKind::Regular => FileType::Regular,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    /// Child handles in insertion order; empty for regular files.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Directory(children) => children.as_slice(),
            NodeKind::Regular => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Directory(children) => Some(children),
            NodeKind::Regular => None,
        }
    }
}

/// Maps inode numbers to the nodes they describe.
///
/// The table has a fixed capacity. Numbers are handed out lowest-first and
/// return to the pool when their node is deleted.
#[derive(Debug)]
pub struct InodeTable {
    nodes: BTreeMap<Ino, NodeId>,
    alloc_tracker: Bitmap,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: BTreeMap::new(),
            alloc_tracker: Bitmap::new(capacity),
        }
    }

    /// Registers `node` under the lowest free inode number.
    ///
    /// # Errors
    ///
    /// Returns `TableFull` when every inode number is taken.
    pub fn insert(&mut self, node: NodeId) -> Result<Ino> {
        let free = self.alloc_tracker.first_free().ok_or(FsError::TableFull)?;
        let ino = Ino::try_from(free).map_err(|_| FsError::TableFull)?;
        self.alloc_tracker.set_reserved(free);
        self.nodes.insert(ino, node);
        Ok(ino)
    }

    /// Drops an entry, making its number available again.
    pub fn remove(&mut self, ino: Ino) -> Option<NodeId> {
        let node = self.nodes.remove(&ino)?;
        self.alloc_tracker.set_free(ino as usize);
        Some(node)
    }

    pub fn get(&self, ino: Ino) -> Option<NodeId> {
        self.nodes.get(&ino).copied()
    }

    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn capacity(&self) -> usize {
        self.alloc_tracker.len()
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.total_nodes()
    }

    /// Entries in inode number order.
    pub fn iter(&self) -> impl Iterator<Item = (Ino, NodeId)> + '_ {
        self.nodes.iter().map(|(&ino, &node)| (ino, node))
    }
}
