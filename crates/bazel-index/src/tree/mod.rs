//
// tree/mod.rs
//
// Hierarchical index of the packages reachable from the workspace root.
//
// Nodes live in an arena and are addressed by `NodeId`. A node's parent is
// stored as an id back-link used only for upward lookup; children are owned by
// the arena and keyed by package name in the parent.
//

mod package;

pub use package::{BuildTarget, Package, SourceFile};

use indexmap::IndexMap;

use crate::error::{IndexError, Result};
use crate::label::path_segments;

/// Name of the package at the workspace root.
pub const ROOT_PACKAGE_NAME: &str = "/";

/// Handle to a node slot in a [`WorkspaceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct NodeData {
    package: Package,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
}

/// The workspace tree.
///
/// Invariants: slot 0 is the root and has no parent; sibling names are
/// unique; every live slot is reachable from the root by exactly one path.
#[derive(Debug)]
pub struct WorkspaceTree {
    nodes: Vec<Option<NodeData>>,
    free: Vec<usize>,
}

impl Default for WorkspaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceTree {
    pub fn new() -> Self {
        Self::with_root(Package::new(ROOT_PACKAGE_NAME))
    }

    pub fn with_root(root: Package) -> Self {
        Self {
            nodes: vec![Some(NodeData {
                package: root,
                parent: None,
                children: IndexMap::new(),
            })],
            free: Vec::new(),
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> Node<'_> {
        Node {
            tree: self,
            id: self.root_id(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<Node<'_>> {
        self.data(id).map(|_| Node { tree: self, id })
    }

    /// Attach a new child package below `parent`.
    ///
    /// Fails with `DuplicateChild` if a sibling already has that name. This is
    /// advisory; callers that may race on the same name check
    /// [`Node::child`] first.
    pub fn add_child(&mut self, parent: NodeId, package: Package) -> Result<NodeId> {
        let name = package.name().to_string();
        let Some(parent_data) = self.data(parent) else {
            return Err(IndexError::InvalidPath(format!(
                "parent node for package {name:?} does not exist"
            )));
        };
        if parent_data.children.contains_key(&name) {
            return Err(IndexError::DuplicateChild(name));
        }

        let data = NodeData {
            package,
            parent: Some(parent),
            children: IndexMap::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(data);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(data));
                NodeId(self.nodes.len() - 1)
            }
        };

        if let Some(parent_data) = self.data_mut(parent) {
            parent_data.children.insert(name, id);
        }
        Ok(id)
    }

    pub fn child_id(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.data(parent)?.children.get(name).copied()
    }

    pub fn package_mut(&mut self, id: NodeId) -> Option<&mut Package> {
        self.data_mut(id).map(|data| &mut data.package)
    }

    /// Exact lookup of a package by its segments.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        segments.iter().try_fold(self.root_id(), |node, segment| {
            self.child_id(node, segment.as_ref())
        })
    }

    /// Walk `segments` from the root, creating missing packages on the way.
    pub fn ensure_path<S: AsRef<str>>(&mut self, segments: &[S]) -> NodeId {
        let mut current = self.root_id();
        for segment in segments {
            let segment = segment.as_ref();
            current = match self.child_id(current, segment) {
                Some(child) => child,
                None => match self.add_child(current, Package::new(segment)) {
                    Ok(child) => child,
                    // `current` is live and the name was just checked.
                    Err(_) => unreachable!("fresh child could not be attached"),
                },
            };
        }
        current
    }

    /// Attach a target to the package named by its path.
    pub fn insert_build_target(&mut self, target: BuildTarget) -> NodeId {
        let id = self.ensure_path(target.path());
        if let Some(package) = self.package_mut(id) {
            package.add_build_target(target);
        }
        id
    }

    /// Attach a source file to its package: the one it was declared in, or for
    /// a bare path the directory part minus any segment containing a `.`.
    /// `main/hello.cc` lands in `main`.
    pub fn insert_source_file(&mut self, file: SourceFile) -> NodeId {
        let segments: Vec<String> = file
            .package_segments()
            .into_iter()
            .map(str::to_string)
            .collect();
        let id = self.ensure_path(&segments);
        if let Some(package) = self.package_mut(id) {
            package.add_source_file(file);
        }
        id
    }

    /// Discard every package below `path` and empty the package at `path`,
    /// so the subtree can be re-populated. `"/"` resets the whole tree.
    pub fn clear_below_path(&mut self, path: &str) -> Result<()> {
        let segments = path_segments(path);
        let Some(start) = self.find(&segments) else {
            return Err(IndexError::InvalidPath(path.to_string()));
        };

        let mut stack: Vec<NodeId> = match self.data_mut(start) {
            Some(data) => {
                data.package.clear();
                std::mem::take(&mut data.children).into_values().collect()
            }
            None => Vec::new(),
        };
        let mut removed = 0usize;
        while let Some(id) = stack.pop() {
            if let Some(data) = self.nodes[id.0].take() {
                stack.extend(data.children.into_values());
                self.free.push(id.0);
                removed += 1;
            }
        }
        log::debug!("Cleared {} packages below {:?}", removed, path);
        Ok(())
    }

    /// Number of live packages, including the root.
    pub fn package_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Pre-order walk from the root; siblings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> {
        let mut stack = vec![self.root()];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            let children: Vec<Node<'_>> = node.children().collect();
            stack.extend(children.into_iter().rev());
            Some(node)
        })
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }
}

/// Read-only view of one node, borrowed from its tree.
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t WorkspaceTree,
    id: NodeId,
}

impl<'t> Node<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn package(&self) -> &'t Package {
        &self.slot().package
    }

    pub fn name(&self) -> &'t str {
        self.package().name()
    }

    pub fn parent(&self) -> Option<Node<'t>> {
        self.slot().parent.map(|id| Node {
            tree: self.tree,
            id,
        })
    }

    pub fn child(&self, name: &str) -> Option<Node<'t>> {
        self.slot().children.get(name).map(|&id| Node {
            tree: self.tree,
            id,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        self.slot()
            .children
            .values()
            .map(move |&id| Node { tree, id })
    }

    pub fn child_count(&self) -> usize {
        self.slot().children.len()
    }

    pub fn is_root(&self) -> bool {
        self.slot().parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.slot().children.is_empty()
    }

    /// Segments from the root down to this node (empty for the root).
    pub fn path(&self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = *self;
        while let Some(parent) = current.parent() {
            segments.push(current.name().to_string());
            current = parent;
        }
        segments.reverse();
        segments
    }

    fn slot(&self) -> &'t NodeData {
        match self.tree.data(self.id) {
            Some(data) => data,
            // A handle borrows the tree, so its slot cannot be freed under it.
            None => unreachable!("node handle refers to a freed slot"),
        }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("children", &self.child_count())
            .finish()
    }
}
