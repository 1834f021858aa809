use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of the sentinel slot in every tree's node store.
pub(crate) const NIL: NodeId = NodeId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Black,
}

impl Color {
    /// Returns `true` if the color is [`Red`].
    ///
    /// [`Red`]: Color::Red
    #[must_use]
    pub fn is_red(&self) -> bool {
        matches!(self, Self::Red)
    }

    /// Returns `true` if the color is [`Black`].
    ///
    /// [`Black`]: Color::Black
    #[must_use]
    pub fn is_black(&self) -> bool {
        matches!(self, Self::Black)
    }
}

/// Position of a node in the tree's node store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) usize);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn is_nil(self) -> bool {
        self == NIL
    }
}

pub(crate) struct Node<K> {
    // key is `None` only for the sentinel and for vacant slots on the free
    // list, every node reachable from the root has a key
    pub(crate) key: Option<K>,
    pub(crate) color: Color,
    pub(crate) parent: NodeId,
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
    // bumped every time the slot is released so that old handles go stale
    pub(crate) generation: u64,
}

impl<K> Node<K> {
    pub(crate) fn sentinel() -> Self {
        Self {
            key: None,
            color: Color::Black,
            parent: NIL,
            left: NIL,
            right: NIL,
            generation: 0,
        }
    }

    pub(crate) fn leaf(key: K, generation: u64) -> Self {
        Self {
            key: Some(key),
            color: Color::Red,
            parent: NIL,
            left: NIL,
            right: NIL,
            generation,
        }
    }
}

impl<K> fmt::Debug for Node<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Node");
        f.field("key", &self.key).field("color", &self.color);

        let mut dbg_link = |name: &str, link: NodeId| {
            if link.is_nil() {
                f.field(name, &None::<usize>);
            } else {
                f.field(name, &Some(link.index()));
            }
        };
        dbg_link("parent", self.parent);
        dbg_link("left", self.left);
        dbg_link("right", self.right);

        f.finish()
    }
}

/// Identity of a tree instance, used to reject handles issued by another tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TreeId(u64);

impl TreeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a node of a [`RedBlackTree`](crate::RedBlackTree).
///
/// A handle stays valid while its node is in the tree, regardless of what
/// happens to other nodes. Once the node is erased the handle is stale and is
/// rejected by every method that takes it.
///
/// Staleness is tracked with a 64-bit counter per node slot, so a handle could
/// only become valid again after its slot has been reused 2^64 times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) tree: TreeId,
    pub(crate) id: NodeId,
    pub(crate) generation: u64,
}

/// Read-only snapshot of a node and its links. Links that point at the
/// sentinel are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView<'a, K> {
    pub key: &'a K,
    pub color: Color,
    pub parent: Option<NodeRef>,
    pub left: Option<NodeRef>,
    pub right: Option<NodeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodePos {
    Root,
    Left,
    Right,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_black_and_self_linked() {
        let nil = Node::<i32>::sentinel();
        assert!(nil.color.is_black());
        assert!(nil.key.is_none());
        assert_eq!((nil.parent, nil.left, nil.right), (NIL, NIL, NIL));
    }

    #[test]
    fn leaf_starts_red() {
        let node = Node::leaf(7, 3);
        assert!(node.color.is_red());
        assert_eq!(node.key, Some(7));
        assert_eq!(node.generation, 3);
        assert!(node.left.is_nil() && node.right.is_nil() && node.parent.is_nil());
    }

    #[test]
    fn tree_ids_are_unique() {
        let a = TreeId::next();
        let b = TreeId::next();
        assert_ne!(a, b);
    }
}
