//! Path resolution relative to a cursor directory.
//!
//! Paths are split on `/`. Absolute paths start at the root, relative ones at
//! the cursor. Empty segments are skipped, `.` stays put and `..` climbs one
//! level (staying at the root when already there).

use crate::fs::{FsError, Result};
use crate::node::NodeId;
use crate::tree::DirTree;

pub const CURRENT_DIR: &str = ".";
pub const PARENT_DIR: &str = "..";

/// Splits a path into its starting point and non-empty segments.
fn split<'p, M>(tree: &DirTree<M>, cursor: NodeId, path: &'p str) -> (NodeId, Vec<&'p str>) {
    let start = if path.starts_with('/') {
        tree.root()
    } else {
        cursor
    };
    let parts = path.split('/').filter(|part| !part.is_empty()).collect();
    (start, parts)
}

/// Applies one segment to `current`. Anything other than `.` or `..` must
/// name an existing child.
fn step<M>(tree: &DirTree<M>, current: NodeId, part: &str) -> Option<NodeId> {
    match part {
        CURRENT_DIR => Some(current),
        PARENT_DIR => Some(tree[current].parent().unwrap_or(current)),
        name => tree.child(current, name),
    }
}

/// Resolves everything but the last segment of `path`.
///
/// Returns the directory that should hold the leaf along with the leaf name,
/// left uninterpreted for the caller. A path without segments (such as `/` or
/// the empty string) yields its starting directory and an empty leaf.
///
/// # Errors
///
/// `NotFound` when an intermediate segment is missing or is not a directory.
pub fn resolve<'p, M>(
    tree: &DirTree<M>,
    cursor: NodeId,
    path: &'p str,
) -> Result<(NodeId, &'p str)> {
    let (mut current, parts) = split(tree, cursor, path);
    let (leaf, dirs) = match parts.split_last() {
        Some((leaf, dirs)) => (*leaf, dirs),
        None => return Ok((current, "")),
    };

    for part in dirs {
        current = match step(tree, current, part) {
            Some(next) if tree[next].is_dir() => next,
            _ => return Err(FsError::NotFound(path.to_string())),
        };
    }
    Ok((current, leaf))
}

/// Resolves `path` all the way down to a node.
pub fn lookup<M>(tree: &DirTree<M>, cursor: NodeId, path: &str) -> Result<NodeId> {
    let (dir, leaf) = resolve(tree, cursor, path)?;
    if leaf.is_empty() {
        return Ok(dir);
    }
    step(tree, dir, leaf).ok_or_else(|| FsError::NotFound(path.to_string()))
}

/// Checks that `name` can be stored as a single directory entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::InvalidArgument("name must not be empty".to_string()));
    }
    if name == CURRENT_DIR || name == PARENT_DIR {
        return Err(FsError::InvalidArgument(format!("{} is reserved", name)));
    }
    if name.contains('/') {
        return Err(FsError::InvalidArgument(format!(
            "{} must not contain '/'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileType;

    struct Fixture {
        tree: DirTree<()>,
        a: NodeId,
        b: NodeId,
        f: NodeId,
    }

    /// /a/b/f plus /g
    fn fixture() -> Fixture {
        let mut tree = DirTree::with_root(|_| Ok(())).unwrap();
        let root = tree.root();
        let a = tree.insert_with(root, "a", FileType::Directory, |_| Ok(())).unwrap();
        let b = tree.insert_with(a, "b", FileType::Directory, |_| Ok(())).unwrap();
        let f = tree.insert_with(b, "f", FileType::Regular, |_| Ok(())).unwrap();
        tree.insert_with(root, "g", FileType::Regular, |_| Ok(())).unwrap();
        Fixture { tree, a, b, f }
    }

    #[test]
    fn absolute_paths_start_at_root() {
        let fx = fixture();
        let (dir, leaf) = resolve(&fx.tree, fx.b, "/a/b/f").unwrap();
        assert_eq!(dir, fx.b);
        assert_eq!(leaf, "f");
        assert_eq!(lookup(&fx.tree, fx.b, "/a").unwrap(), fx.a);
    }

    #[test]
    fn relative_paths_start_at_cursor() {
        let fx = fixture();
        let (dir, leaf) = resolve(&fx.tree, fx.a, "b/new").unwrap();
        assert_eq!(dir, fx.b);
        assert_eq!(leaf, "new");
    }

    #[test]
    fn dot_segments_are_honoured() {
        let fx = fixture();
        let root = fx.tree.root();
        assert_eq!(lookup(&fx.tree, fx.b, "..").unwrap(), fx.a);
        assert_eq!(lookup(&fx.tree, fx.b, "./f").unwrap(), fx.f);
        assert_eq!(lookup(&fx.tree, fx.b, "../../../..").unwrap(), root);
        assert_eq!(lookup(&fx.tree, fx.b, "../b/./f").unwrap(), fx.f);
    }

    #[test]
    fn empty_segments_are_ignored() {
        let fx = fixture();
        assert_eq!(lookup(&fx.tree, fx.b, "//a///b/").unwrap(), fx.b);
    }

    #[test]
    fn bare_root_resolves_to_empty_leaf() {
        let fx = fixture();
        let root = fx.tree.root();
        assert_eq!(resolve(&fx.tree, fx.b, "/").unwrap(), (root, ""));
        assert_eq!(resolve(&fx.tree, fx.b, "").unwrap(), (fx.b, ""));
        assert_eq!(lookup(&fx.tree, fx.b, "/").unwrap(), root);
    }

    #[test]
    fn missing_or_regular_intermediate_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            resolve(&fx.tree, fx.a, "nope/x"),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            resolve(&fx.tree, fx.a, "/g/x"),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            lookup(&fx.tree, fx.a, "missing"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn rendered_paths_resolve_back_to_their_node() {
        let fx = fixture();
        for id in vec![fx.tree.root(), fx.a, fx.b, fx.f] {
            let path = fx.tree.path(id);
            assert_eq!(lookup(&fx.tree, fx.b, &path).unwrap(), id);
        }
    }

    #[test]
    fn reserved_and_empty_names_are_invalid() {
        assert!(validate_name("ok.txt").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
