//! Arena-backed directory hierarchy.
//!
//! Nodes live in a flat table and refer to each other through [`NodeId`]
//! handles. A directory owns its children; each child keeps a plain handle back
//! to its parent, so there is no cyclic ownership anywhere in the tree.

use std::ops::{Index, IndexMut};

use crate::fs::{FsError, Result};
use crate::node::{FileType, Node, NodeId};

pub struct DirTree<M> {
    nodes: Vec<Option<Node<M>>>,
    /// Slots released by deletions, reused before the table grows.
    vacant: Vec<usize>,
    root: NodeId,
}

impl<M> DirTree<M> {
    /// Creates a tree holding only the root directory. `make_meta` receives the
    /// root's handle and builds its layout data.
    pub fn with_root<F>(make_meta: F) -> Result<Self>
    where
        F: FnOnce(NodeId) -> Result<M>,
    {
        let root = NodeId(0);
        let meta = make_meta(root)?;
        Ok(Self {
            nodes: vec![Some(Node::new("/", None, FileType::Directory, meta))],
            vacant: Vec::new(),
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<M>> {
        self.nodes.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<M>> {
        self.nodes.get_mut(id.0)?.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.vacant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks `name` up among the children of `dir`.
    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.get(dir)?
            .children()
            .iter()
            .copied()
            .find(|&child| self[child].name == name)
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.vacant.last().copied().unwrap_or(self.nodes.len()))
    }

    /// Adds a new child under `parent`.
    ///
    /// `make_meta` is handed the handle the node will receive and may refuse the
    /// insertion (for instance when an inode table is exhausted), in which case
    /// the tree is left untouched.
    pub fn insert_with<F>(
        &mut self,
        parent: NodeId,
        name: &str,
        file_type: FileType,
        make_meta: F,
    ) -> Result<NodeId>
    where
        F: FnOnce(NodeId) -> Result<M>,
    {
        let dir = self
            .get(parent)
            .ok_or_else(|| FsError::NotFound(parent.to_string()))?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(self.path(parent)));
        }
        if self.child(parent, name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let id = self.next_id();
        let meta = make_meta(id)?;
        let node = Node::new(name, Some(parent), file_type, meta);
        if id.0 == self.nodes.len() {
            self.nodes.push(Some(node));
        } else {
            self.vacant.pop();
            self.nodes[id.0] = Some(node);
        }
        if let Some(children) = self[parent].children_mut() {
            children.push(id);
        }
        Ok(id)
    }

    /// True when `ancestor` is `node` or lies on its path to the root.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Re-parents `id` under `target`, appending it to the target's children.
    ///
    /// Every check happens before anything is modified: on error the tree is
    /// exactly as it was.
    pub fn relocate(&mut self, id: NodeId, target: NodeId) -> Result<()> {
        let node = self
            .get(id)
            .ok_or_else(|| FsError::NotFound(id.to_string()))?;
        let old_parent = node
            .parent
            .ok_or_else(|| FsError::InvalidTarget("the root directory cannot be moved".into()))?;
        match self.get(target) {
            Some(dir) if dir.is_dir() => (),
            Some(_) => return Err(FsError::InvalidTarget(self.path(target))),
            None => return Err(FsError::InvalidTarget(target.to_string())),
        }
        if self.is_ancestor(id, target) {
            return Err(FsError::InvalidTarget(format!(
                "{} is inside {}",
                self.path(target),
                self.path(id)
            )));
        }
        let name = self[id].name.clone();
        if self.child(target, &name).is_some() {
            return Err(FsError::NameCollision(name));
        }

        if let Some(siblings) = self[old_parent].children_mut() {
            siblings.retain(|&child| child != id);
        }
        if let Some(children) = self[target].children_mut() {
            children.push(id);
        }
        self[id].parent = Some(target);
        Ok(())
    }

    /// Handles of `id` and every node below it, children before their parents.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current, true));
            if let Some(node) = self.get(current) {
                for &child in node.children().iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    /// Unlinks `id` from its parent and drops it together with all of its
    /// descendants. The removed nodes are returned children first.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<Node<M>>> {
        let parent = self
            .get(id)
            .ok_or_else(|| FsError::NotFound(id.to_string()))?
            .parent
            .ok_or_else(|| FsError::InvalidTarget("the root directory cannot be deleted".into()))?;

        if let Some(siblings) = self[parent].children_mut() {
            siblings.retain(|&child| child != id);
        }
        let mut removed = Vec::new();
        for nr in self.subtree(id) {
            if let Some(node) = self.nodes[nr.0].take() {
                self.vacant.push(nr.0);
                removed.push(node);
            }
        }
        Ok(removed)
    }

    /// Absolute path of a node. The root renders as `/`.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = id;
        while let Some(node) = self.get(cursor) {
            match node.parent {
                Some(parent) => {
                    parts.push(node.name.as_str());
                    cursor = parent;
                }
                None => break,
            }
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Live nodes in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<M>)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId(i), node)))
    }
}

impl<M> Index<NodeId> for DirTree<M> {
    type Output = Node<M>;

    fn index(&self, id: NodeId) -> &Node<M> {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node handle {}", id),
        }
    }
}

impl<M> IndexMut<NodeId> for DirTree<M> {
    fn index_mut(&mut self, id: NodeId) -> &mut Node<M> {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node handle {}", id),
        }
    }
}
