//! Hierarchical composite containers
//!
//! Blocks are addressed by a flat preorder index: the container itself is
//! index 0, its first child is 1, and so on depth-first through groups. Flat
//! indices are what producers advertise under `COMPOSITE_BLOCK_IDS` and what
//! requests select.

use super::DataObject;
use crate::error::DataError;
use crate::mtime::MTime;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One node of a composite tree
#[derive(Debug, Clone)]
pub enum BlockNode {
    /// A dataset slot; `None` when the block exists but holds no data
    Leaf {
        /// Block name
        name: String,
        /// Payload, shared between copies of the tree
        data: Option<Arc<DataObject>>,
    },
    /// A named group of nodes
    Group {
        /// Group name
        name: String,
        /// Child nodes
        children: Vec<BlockNode>,
    },
}

impl BlockNode {
    /// Leaf holding `data`
    #[must_use]
    pub fn leaf(name: impl Into<String>, data: Option<DataObject>) -> Self {
        BlockNode::Leaf {
            name: name.into(),
            data: data.map(Arc::new),
        }
    }

    /// Group of `children`
    #[must_use]
    pub fn group(name: impl Into<String>, children: Vec<BlockNode>) -> Self {
        BlockNode::Group {
            name: name.into(),
            children,
        }
    }

    /// Node name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            BlockNode::Leaf { name, .. } | BlockNode::Group { name, .. } => name,
        }
    }

    fn skeleton(&self) -> BlockNode {
        match self {
            BlockNode::Leaf { name, .. } => BlockNode::Leaf {
                name: name.clone(),
                data: None,
            },
            BlockNode::Group { name, children } => BlockNode::Group {
                name: name.clone(),
                children: children.iter().map(BlockNode::skeleton).collect(),
            },
        }
    }
}

/// A leaf visited by [`CompositeData::leaves`]
#[derive(Debug, Clone, Copy)]
pub struct LeafRef<'a> {
    /// Flat preorder index
    pub index: usize,
    /// Leaf name
    pub name: &'a str,
    /// Payload, if any
    pub data: Option<&'a Arc<DataObject>>,
}

/// Tree of independently stamped sub-blocks
///
/// The container's [`mtime`](CompositeData::mtime) is the latest of its own
/// structural stamp and every leaf payload stamp, so adding or removing a
/// block is observed even when no payload changed.
#[derive(Debug, Clone, Default)]
pub struct CompositeData {
    children: Vec<BlockNode>,
    structure_mtime: MTime,
}

fn walk<'a>(nodes: &'a [BlockNode], next: &mut usize, visit: &mut impl FnMut(usize, &'a BlockNode)) {
    for node in nodes {
        *next += 1;
        visit(*next, node);
        if let BlockNode::Group { children, .. } = node {
            walk(children, next, visit);
        }
    }
}

fn find_mut<'a>(nodes: &'a mut [BlockNode], target: usize, next: &mut usize) -> Option<&'a mut BlockNode> {
    for node in nodes.iter_mut() {
        *next += 1;
        if *next == target {
            return Some(node);
        }
        if let BlockNode::Group { children, .. } = node {
            if let Some(found) = find_mut(children, target, next) {
                return Some(found);
            }
        }
    }
    None
}

fn remove_at(nodes: &mut Vec<BlockNode>, target: usize, next: &mut usize) -> Option<BlockNode> {
    let mut i = 0;
    while i < nodes.len() {
        *next += 1;
        if *next == target {
            return Some(nodes.remove(i));
        }
        if let BlockNode::Group { children, .. } = &mut nodes[i] {
            if let Some(found) = remove_at(children, target, next) {
                return Some(found);
            }
        }
        i += 1;
    }
    None
}

impl CompositeData {
    /// Empty container
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a top-level node and return its flat index
    pub fn push(&mut self, node: BlockNode) -> usize {
        let mut last = 0;
        walk(&self.children, &mut last, &mut |_, _| {});
        self.children.push(node);
        self.structure_mtime.touch();
        last + 1
    }

    /// Remove the node at `index` together with its descendants
    ///
    /// # Errors
    /// [`DataError::NoSuchBlock`] when nothing has that index.
    pub fn remove(&mut self, index: usize) -> Result<BlockNode, DataError> {
        let mut next = 0;
        let removed = remove_at(&mut self.children, index, &mut next).ok_or(DataError::NoSuchBlock(index))?;
        self.structure_mtime.touch();
        Ok(removed)
    }

    /// Replace the payload of the leaf at `index`
    ///
    /// The structure stamp only moves when the new payload is not newer
    /// than the container, so the container stamp still advances.
    ///
    /// # Errors
    /// [`DataError::NoSuchBlock`] when `index` is not a leaf.
    pub fn set_leaf(&mut self, index: usize, data: Option<Arc<DataObject>>) -> Result<(), DataError> {
        let before = self.mtime();
        match self.node_mut(index) {
            Some(BlockNode::Leaf { data: slot, .. }) => *slot = data,
            _ => return Err(DataError::NoSuchBlock(index)),
        }
        if self.mtime() <= before {
            self.structure_mtime.touch();
        }
        Ok(())
    }

    /// Borrow the node at `index`
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&BlockNode> {
        let mut found = None;
        let mut next = 0;
        walk(&self.children, &mut next, &mut |i, node| {
            if i == index {
                found = Some(node);
            }
        });
        found
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut BlockNode> {
        let mut next = 0;
        find_mut(&mut self.children, index, &mut next)
    }

    /// Payload of the leaf at `index`
    #[must_use]
    pub fn leaf(&self, index: usize) -> Option<&Arc<DataObject>> {
        match self.node(index)? {
            BlockNode::Leaf { data, .. } => data.as_ref(),
            BlockNode::Group { .. } => None,
        }
    }

    /// Mutable payload of the leaf at `index`, copied first if shared
    pub fn leaf_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        match self.node_mut(index)? {
            BlockNode::Leaf { data, .. } => data.as_mut().map(Arc::make_mut),
            BlockNode::Group { .. } => None,
        }
    }

    /// Every leaf in preorder
    #[must_use]
    pub fn leaves(&self) -> Vec<LeafRef<'_>> {
        let mut out = Vec::new();
        let mut next = 0;
        walk(&self.children, &mut next, &mut |index, node| {
            if let BlockNode::Leaf { name, data } = node {
                out.push(LeafRef {
                    index,
                    name,
                    data: data.as_ref(),
                });
            }
        });
        out
    }

    /// Flat indices of every leaf
    #[must_use]
    pub fn leaf_ids(&self) -> BTreeSet<usize> {
        self.leaves().into_iter().map(|leaf| leaf.index).collect()
    }

    /// Number of nodes, groups included, excluding the root
    #[must_use]
    pub fn len(&self) -> usize {
        let mut next = 0;
        walk(&self.children, &mut next, &mut |_, _| {});
        next
    }

    /// Whether the container has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Top-level nodes
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[BlockNode] {
        &self.children
    }

    /// Stamp of the last structural change
    #[inline]
    #[must_use]
    pub fn structure_mtime(&self) -> MTime {
        self.structure_mtime
    }

    /// Latest of the structure stamp and every payload stamp
    #[must_use]
    pub fn mtime(&self) -> MTime {
        self.leaves()
            .iter()
            .filter_map(|leaf| leaf.data.map(|d| d.mtime()))
            .fold(self.structure_mtime, MTime::max)
    }

    /// Take the shape of `other` with every leaf emptied
    pub fn copy_structure(&mut self, other: &CompositeData) {
        self.children = other.children.iter().map(BlockNode::skeleton).collect();
        self.structure_mtime.touch();
    }

    /// Drop the payload of every leaf whose index is not in `keep`
    ///
    /// The tree shape is preserved so flat indices stay stable.
    pub fn retain_leaves(&mut self, keep: &BTreeSet<usize>) {
        let drop: Vec<usize> = self
            .leaves()
            .iter()
            .filter(|leaf| leaf.data.is_some() && !keep.contains(&leaf.index))
            .map(|leaf| leaf.index)
            .collect();
        for index in &drop {
            if let Some(BlockNode::Leaf { data, .. }) = self.node_mut(*index) {
                *data = None;
            }
        }
        if !drop.is_empty() {
            self.structure_mtime.touch();
        }
    }
}
