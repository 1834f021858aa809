use core::fmt;
use core::ops::ControlFlow;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::mem;

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, InvalidNode, Result};
use crate::node::{Color, Node, NodeId, NodePos, NodeRef, NodeView, TreeId, NIL};

/// A red-black tree holding (possibly duplicate) keys in ascending order.
pub struct RedBlackTree<K> {
    // INVARIANTS:
    //  * `nodes[NIL]` is the sentinel, outside of `erase` it is black and all
    //    of its links point to itself
    //  * every id in `free` is a vacant slot and `free.capacity()` is at least
    //    the number of non-sentinel slots, so releasing a node never allocates
    //  * `root == NIL` iff `len == 0`
    nodes: Vec<Node<K>>,
    free: Vec<NodeId>,
    root: NodeId,
    len: usize,
    id: TreeId,
}

impl<K> fmt::Debug for RedBlackTree<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct TreeDebug<'a, K> {
            tree: &'a RedBlackTree<K>,
        }

        impl<K> fmt::Debug for TreeDebug<'_, K>
        where
            K: fmt::Debug,
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut f = f.debug_list();
                let _ = self.tree.inorder_core(self.tree.root, &mut |node: NodeId| {
                    f.entry(&(node.index(), self.tree.slot(node)));
                    ControlFlow::Continue(())
                });
                f.finish()
            }
        }

        let mut f = f.debug_struct("RedBlackTree");
        f.field("len", &self.len);
        if self.root.is_nil() {
            f.field("root", &None::<usize>);
        } else {
            f.field("root", &Some(self.root.index()));
        }
        f.field("nodes", &TreeDebug { tree: self });
        f.finish()
    }
}

impl<K> Default for RedBlackTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RedBlackTree<K> {
    /// Creates an empty tree.
    ///
    /// Like `Vec::push`, aborts if the sentinel cannot be allocated. Use
    /// [`try_new`](Self::try_new) to handle that case.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            free: Vec::new(),
            root: NIL,
            len: 0,
            id: TreeId::next(),
        }
    }

    pub fn try_new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Creates an empty tree with storage for `config.initial_capacity`
    /// nodes already reserved.
    pub fn with_config(config: Config) -> Result<Self> {
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(config.initial_capacity.saturating_add(1))?;
        let mut free = Vec::new();
        free.try_reserve_exact(config.initial_capacity)?;

        nodes.push(Node::sentinel());
        let tree = Self {
            nodes,
            free,
            root: NIL,
            len: 0,
            id: TreeId::next(),
        };
        debug!(capacity = config.initial_capacity, "created tree");
        Ok(tree)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> Option<NodeRef> {
        self.link(self.root)
    }

    /// Returns the key of `node`, or `None` if the handle is not valid for
    /// this tree.
    pub fn get(&self, node: NodeRef) -> Option<&K> {
        self.resolve(node).ok().map(|node| self.key(node))
    }

    pub fn node(&self, node: NodeRef) -> Option<NodeView<'_, K>> {
        let node = self.resolve(node).ok()?;
        let slot = self.slot(node);
        Some(NodeView {
            key: self.key(node),
            color: slot.color,
            parent: self.link(slot.parent),
            left: self.link(slot.left),
            right: self.link(slot.right),
        })
    }

    fn handle(&self, node: NodeId) -> NodeRef {
        NodeRef {
            tree: self.id,
            id: node,
            generation: self.slot(node).generation,
        }
    }

    fn link(&self, node: NodeId) -> Option<NodeRef> {
        (!node.is_nil()).then(|| self.handle(node))
    }

    fn resolve(&self, node: NodeRef) -> Result<NodeId, InvalidNode> {
        if node.tree != self.id {
            return Err(InvalidNode::ForeignTree);
        }
        match self.nodes.get(node.id.index()) {
            Some(slot)
                if !node.id.is_nil() && slot.key.is_some() && slot.generation == node.generation =>
            {
                Ok(node.id)
            }
            _ => Err(InvalidNode::Stale),
        }
    }

    #[inline]
    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub(crate) fn slot(&self, node: NodeId) -> &Node<K> {
        &self.nodes[node.index()]
    }

    #[inline]
    fn slot_mut(&mut self, node: NodeId) -> &mut Node<K> {
        &mut self.nodes[node.index()]
    }

    #[inline]
    pub(crate) fn key(&self, node: NodeId) -> &K {
        match &self.slot(node).key {
            Some(key) => key,
            None => unreachable!("{node:?} is the sentinel or a vacant slot"),
        }
    }

    #[inline]
    pub(crate) fn parent(&self, node: NodeId) -> NodeId {
        self.slot(node).parent
    }

    #[inline]
    fn set_parent(&mut self, node: NodeId, new_parent: NodeId) {
        self.slot_mut(node).parent = new_parent;
    }

    #[inline]
    pub(crate) fn left(&self, node: NodeId) -> NodeId {
        self.slot(node).left
    }

    #[inline]
    fn set_left(&mut self, node: NodeId, new_left: NodeId) {
        self.slot_mut(node).left = new_left;
    }

    #[inline]
    pub(crate) fn right(&self, node: NodeId) -> NodeId {
        self.slot(node).right
    }

    #[inline]
    fn set_right(&mut self, node: NodeId, new_right: NodeId) {
        self.slot_mut(node).right = new_right;
    }

    #[inline]
    pub(crate) fn color(&self, node: NodeId) -> Color {
        self.slot(node).color
    }

    #[inline]
    fn set_color(&mut self, node: NodeId, new_color: Color) {
        self.slot_mut(node).color = new_color;
    }

    /// Which link of its parent `node` hangs from.
    ///
    /// Also works for the sentinel while `erase` has set its parent, as long
    /// as the parent has at most one sentinel child.
    #[inline]
    fn pos(&self, node: NodeId) -> NodePos {
        let parent = self.parent(node);
        if parent.is_nil() {
            NodePos::Root
        } else if self.left(parent) == node {
            NodePos::Left
        } else {
            debug_assert_eq!(self.right(parent), node);
            NodePos::Right
        }
    }

    pub fn inorder_for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K),
    {
        let _ = self.inorder_core(self.root, &mut |node: NodeId| {
            f(self.key(node));
            ControlFlow::Continue(())
        });
    }

    /// Visits the subtree under `node` in order until `f` breaks.
    fn inorder_core<F>(&self, node: NodeId, f: &mut F) -> ControlFlow<()>
    where
        F: FnMut(NodeId) -> ControlFlow<()>,
    {
        if node.is_nil() {
            return ControlFlow::Continue(());
        }
        if self.inorder_core(self.left(node), f).is_break() || f(node).is_break() {
            return ControlFlow::Break(());
        }
        self.inorder_core(self.right(node), f)
    }

    /// Copies the smallest `buf.len()` keys into `buf` in ascending order and
    /// returns how many were written.
    pub fn to_ordered_slice(&self, buf: &mut [K]) -> usize
    where
        K: Clone,
    {
        let mut written = 0;
        if buf.is_empty() {
            return written;
        }

        let _ = self.inorder_core(self.root, &mut |node: NodeId| {
            buf[written] = self.key(node).clone();
            written += 1;
            if written == buf.len() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        written
    }

    /// Returns the smallest `capacity` keys in ascending order.
    pub fn to_ordered_sequence(&self, capacity: usize) -> Vec<K>
    where
        K: Clone,
    {
        let mut items = Vec::with_capacity(capacity.min(self.len));
        if capacity == 0 {
            return items;
        }

        let _ = self.inorder_core(self.root, &mut |node: NodeId| {
            items.push(self.key(node).clone());
            if items.len() == capacity {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        items
    }

    /// Returns the first node with a key equal to `key` on the search path
    /// from the root.
    pub fn find<Q>(&self, key: &Q) -> Option<NodeRef>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_raw(key).map(|node| self.handle(node))
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_raw(key).is_some()
    }

    fn find_raw<Q>(&self, key: &Q) -> Option<NodeId>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut x = self.root;
        while !x.is_nil() {
            match key.cmp(self.key(x).borrow()) {
                Ordering::Less => x = self.left(x),
                Ordering::Equal => return Some(x),
                Ordering::Greater => x = self.right(x),
            }
        }

        None
    }

    pub fn min(&self) -> Option<&K> {
        self.minimum().and_then(|node| self.get(node))
    }

    pub fn minimum(&self) -> Option<NodeRef> {
        if self.is_empty() {
            return None;
        }
        Some(self.handle(self.min_of(self.root)))
    }

    fn min_of(&self, root: NodeId) -> NodeId {
        let mut x = root;
        while !self.left(x).is_nil() {
            x = self.left(x);
        }

        x
    }

    pub fn max(&self) -> Option<&K> {
        self.maximum().and_then(|node| self.get(node))
    }

    pub fn maximum(&self) -> Option<NodeRef> {
        if self.is_empty() {
            return None;
        }
        Some(self.handle(self.max_of(self.root)))
    }

    fn max_of(&self, root: NodeId) -> NodeId {
        let mut x = root;
        while !self.right(x).is_nil() {
            x = self.right(x);
        }

        x
    }

    /// Returns the node that follows `node` in order. `None` if `node` is the
    /// last one or the handle is not valid.
    pub fn successor(&self, node: NodeRef) -> Option<NodeRef> {
        let node = self.resolve(node).ok()?;
        self.successor_core(node).map(|node| self.handle(node))
    }

    fn successor_core(&self, mut node: NodeId) -> Option<NodeId> {
        //       +---------- 34 ---------+
        //       |                       |
        // +---- 2 ----+                 58 ----+
        // |           |                        |
        // 1      +--- 9 ----+              +-- 77 --+
        //        |          |              |        |
        //     +- 6       +- 20 -+      +- 71 -+     82
        //     |          |      |      |      |
        //     5         12 -+   24    67      75
        //                   |
        //                   13

        let right = self.right(node);
        if !right.is_nil() {
            // 9 -> 12, 2 -> 5, 58 -> 67 ...
            //
            // Everything in the right subtree is larger than node but smaller
            // than any larger ancestor, so the successor is its minimum.
            return Some(self.min_of(right));
        }

        // 6 -> 9, 1 -> 2, 13 -> 20, 24 -> 34 ...
        // Move up the parents and find the first node which is the left child
        // of its parent. The parent of that node is the successor.
        let mut parent = self.parent(node);
        while !parent.is_nil() && self.left(parent) != node {
            node = parent;
            parent = self.parent(node);
        }

        (!parent.is_nil()).then_some(parent)
    }

    /// Returns the node that precedes `node` in order. `None` if `node` is
    /// the first one or the handle is not valid.
    pub fn predecessor(&self, node: NodeRef) -> Option<NodeRef> {
        let node = self.resolve(node).ok()?;
        self.predecessor_core(node).map(|node| self.handle(node))
    }

    fn predecessor_core(&self, mut node: NodeId) -> Option<NodeId> {
        let left = self.left(node);
        if !left.is_nil() {
            // 2 -> 1, 9 -> 6, 20 -> 13, 77 -> 75
            return Some(self.max_of(left));
        }

        // 12 -> 9, 58 -> 34, 67 -> 58
        // Move up the parents and find the first node which is the right child
        // of its parent. The parent of that node is the predecessor.
        let mut parent = self.parent(node);
        while !parent.is_nil() && self.right(parent) != node {
            node = parent;
            parent = self.parent(node);
        }

        (!parent.is_nil()).then_some(parent)
    }

    fn rotate_left(&mut self, node: NodeId) {
        //    p                       p
        //    |                       |
        // +-node-+               +-right-+
        // |      |      -->      |       |
        // a  +-right-+       +-node-+    c
        //    |       |       |      |
        //    b       c       a      b
        // where a, b, c can be any subtrees
        let right = self.right(node);
        debug_assert!(!right.is_nil(), "rotate_left needs a right child");
        trace!(node = node.index(), "rotate left");

        // attach b to node
        let b = self.left(right);
        self.set_right(node, b);
        if !b.is_nil() {
            self.set_parent(b, node);
        }

        // attach right to parent
        let parent = self.parent(node);
        self.set_parent(right, parent);
        match self.pos(node) {
            NodePos::Root => self.root = right,
            NodePos::Left => self.set_left(parent, right),
            NodePos::Right => self.set_right(parent, right),
        }

        // attach node to right
        self.set_left(right, node);
        self.set_parent(node, right);
    }

    fn rotate_right(&mut self, node: NodeId) {
        //         p              p
        //         |              |
        //     +-node-+       +-left-+
        //     |      |       |      |
        // +-left-+   c  -->  a  +-node-+
        // |      |              |      |
        // a      b              b      c
        // where a, b, c can be any subtrees
        let left = self.left(node);
        debug_assert!(!left.is_nil(), "rotate_right needs a left child");
        trace!(node = node.index(), "rotate right");

        // attach b to node
        let b = self.right(left);
        self.set_left(node, b);
        if !b.is_nil() {
            self.set_parent(b, node);
        }

        // attach left to parent
        let parent = self.parent(node);
        self.set_parent(left, parent);
        match self.pos(node) {
            NodePos::Root => self.root = left,
            NodePos::Left => self.set_left(parent, left),
            NodePos::Right => self.set_right(parent, left),
        }

        // attach node to left
        self.set_right(left, node);
        self.set_parent(node, left);
    }

    /// Takes a vacant slot for a new red leaf.
    ///
    /// All storage is reserved before anything is written, so on error the
    /// tree is unchanged.
    fn alloc(&mut self, key: K) -> Result<NodeId> {
        if let Some(node) = self.free.pop() {
            let slot = self.slot_mut(node);
            *slot = Node::leaf(key, slot.generation);
            return Ok(node);
        }

        // After the push there are `nodes.len()` non-sentinel slots, each of
        // which may end up on the free list.
        self.free.try_reserve(self.nodes.len())?;
        self.nodes.try_reserve(1)?;
        let node = NodeId(self.nodes.len());
        self.nodes.push(Node::leaf(key, 0));
        Ok(node)
    }

    /// Returns a detached node's slot to the free list and hands back its key.
    fn release(&mut self, node: NodeId) -> K {
        let slot = self.slot_mut(node);
        let generation = slot.generation.wrapping_add(1);
        let key = match mem::replace(slot, Node::sentinel()).key {
            Some(key) => key,
            None => unreachable!("{node:?} was released twice"),
        };
        slot.generation = generation;
        self.free.push(node);
        key
    }

    /// Removes `node` from the tree and returns its key.
    ///
    /// Fails with [`Error::InvalidArgument`] if the handle came from another
    /// tree or its node has already been erased. Handles to other nodes stay
    /// valid.
    pub fn erase(&mut self, node: NodeRef) -> Result<K> {
        let node = self.resolve(node).map_err(|reason| {
            debug!(%reason, "rejected erase");
            Error::InvalidArgument(reason)
        })?;
        Ok(self.erase_core(node))
    }

    /// Removes one node with a key equal to `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_raw(key).map(|node| self.erase_core(node))
    }

    fn erase_core(&mut self, node: NodeId) -> K {
        //       ┌────────── 34 ─────────┐
        //       │                       │
        // ┌──── 2 ────┐                 58 ────┐
        // │           │                        │
        // 1      ┌─── 9 ────┐              ┌── 77 ──┐
        //        │          │              │        │
        //     ┌─ 6       ┌─ 20 ─┐      ┌─ 71 ─┐     82
        //     │          │      │      │      │
        //     5         12 ─┐   24    67      75
        //                   │
        //                   13

        let mut to_remove = node;
        let mut to_remove_orig_color = self.color(to_remove);
        // Node that takes the place of the removed one, may be the sentinel
        let replacement: NodeId;
        match (self.left(node), self.right(node)) {
            (NIL, child) | (child, NIL) => {
                // `node` has no children or only one.
                // To remove `node` replace `node` with its child or the sentinel.
                // For example remove 1, 6, 12, 58 from tree above
                self.transplant(node, child);
                replacement = child;
            }
            (_, right) => {
                // We want to replace `node` with its successor, that is the
                // minimum of its right subtree.
                to_remove = self.min_of(right);
                to_remove_orig_color = self.color(to_remove);
                replacement = self.right(to_remove);

                // There are two cases:
                //  a) `min` is the right child of `node`,
                //     in which case we simply replace `node` with `min`
                //     and reconnect `node.left` to `min.left`
                //     for example remove 20, 75, 77 from tree above
                //  b) `min` is not the right child of `node`
                //     in which case we first replace `min` by its own right child.
                //     `min` cannot have a left child, so this takes it out of the
                //     tree and it can then replace `node`
                //     for example remove 9 from tree above, min will be 12
                if to_remove == right {
                    // a) replacement may be the sentinel, delete_fixup still
                    //    needs to find its parent
                    self.set_parent(replacement, to_remove);
                } else {
                    // b)
                    self.transplant(to_remove, replacement);
                    self.set_right(to_remove, right);
                    self.set_parent(right, to_remove);
                }
                self.transplant(node, to_remove);
                let left = self.left(node);
                self.set_left(to_remove, left);
                self.set_parent(left, to_remove);
                let color = self.color(node);
                self.set_color(to_remove, color);
            }
        }

        if to_remove_orig_color.is_black() {
            self.delete_fixup(replacement);
        }
        let sentinel = self.slot_mut(NIL);
        sentinel.parent = NIL;
        sentinel.color = Color::Black;

        self.len -= 1;
        self.release(node)
    }

    fn delete_fixup(&mut self, mut x: NodeId) {
        // x points to the place where we removed a black node.
        //
        // If x is red then we simply color it black after the loop, which
        // gives back the black node the paths through x lost.
        // If x is the root the whole tree lost one black level, nothing to do.
        while x != self.root && self.color(x).is_black() {
            // At this point following holds:
            // * x is not root
            // * x is doubly black, every path through x has one black node
            //   less than the paths around it
            // * x can be the sentinel or a proper node
            // * x must have a proper sibling, otherwise the black heights
            //   below x's parent couldn't have been equal before the removal
            let parent = self.parent(x);
            match self.pos(x) {
                NodePos::Root => unreachable!("loop stops at the root"),
                NodePos::Left => {
                    let mut sibling = self.right(parent);
                    debug_assert!(!sibling.is_nil(), "doubly black node without a sibling");

                    if self.color(sibling).is_red() {
                        //     ┌─── p:b ───┐                ┌─── p:r ───┐                    ┌─── s:b ───┐
                        //     │           │                │           │                    │           │
                        // ┌─ x:b ─┐   ┌─ s:r ─┐   ──►  ┌─ x:b ─┐   ┌─ s:b ─┐   ──►      ┌─ p:r ─┐      d:b
                        // │       │   │       │        │       │   │       │            │       │
                        // a       b  c:b     d:b       a       b  c:b     d:b       ┌─ x:b ─┐  c:b
                        //                                                           │       │
                        //                                                           a       b
                        // Turns into case 2, 3 or 4. x still misses a black node
                        // but now has a red parent.
                        trace!(node = x.index(), "delete fixup: red sibling");
                        debug_assert!(self.color(parent).is_black());
                        self.set_color(sibling, Color::Black);
                        self.set_color(parent, Color::Red);
                        self.rotate_left(parent);
                        sibling = self.right(parent);
                    }

                    let near = self.left(sibling);
                    let far = self.right(sibling);
                    if self.color(near).is_black() && self.color(far).is_black() {
                        //     ┌─── p:c ───┐                ┌─── p:c ───┐
                        //     │           │                │           │
                        // ┌─ x:b ─┐   ┌─ s:b ─┐   ──►  ┌─ x:b ─┐   ┌─ s:r ─┐
                        // │       │   │       │        │       │   │       │
                        // a       b  c:b     d:b       a       b  c:b     d:b
                        //
                        // Take one black off x and s and move it up to p.
                        // If p is red (always the case after case 1) the loop
                        // ends and p is colored black below.
                        trace!(node = x.index(), "delete fixup: black nephews");
                        self.set_color(sibling, Color::Red);
                        x = parent;
                    } else {
                        if self.color(far).is_black() {
                            //    ┌───── p:c ─────┐                ┌───── p:c ─────┐                ┌─── p:c ───┐
                            //    │               │                │               │                │           │
                            // ┌─ x:b ─┐      ┌─ s:b ─┐   ──►  ┌─ x:b ─┐       ┌─ s:r ─┐   ──►  ┌─ x:b ─┐   ┌─ c:b ─┐
                            // │       │      │       │        │       │       │       │        │       │   │       │
                            // a       b  ┌─ c:r ─┐  d:b       a       b   ┌─ c:b ─┐   d:b      a       b   e   ┌─ s:r ─┐
                            //            │       │                        │       │                            │       │
                            //            e       f                        e       f                            f      d:b
                            //
                            // Turns into case 4.
                            trace!(node = x.index(), "delete fixup: red near nephew");
                            self.set_color(near, Color::Black);
                            self.set_color(sibling, Color::Red);
                            self.rotate_right(sibling);
                            sibling = self.right(parent);
                        }

                        //     ┌─── p:c ───┐                ┌─── p:b ───┐                     ┌── s:c ──┐
                        //     │           │                │           │                     │         │
                        // ┌─ x:b ─┐   ┌─ s:b ─┐   ──►  ┌─ x:b ─┐   ┌─ s:c ─┐   ──►       ┌─ p:b ─┐    d:b
                        // │       │   │       │        │       │   │       │             │       │
                        // a       b  c:b     d:r       a       b  c:b     d:b       ┌─ x:b ─┐   c:b
                        //                                                           │       │
                        //                                                           a       b
                        //
                        // x gains a black ancestor and the black lost on the
                        // paths through d is given back by coloring d black.
                        trace!(node = x.index(), "delete fixup: red far nephew");
                        let parent_color = self.color(parent);
                        self.set_color(sibling, parent_color);
                        self.set_color(parent, Color::Black);
                        let far = self.right(sibling);
                        self.set_color(far, Color::Black);
                        self.rotate_left(parent);
                        x = self.root;
                    }
                }
                NodePos::Right => {
                    // same as Left branch but left/right are switched
                    let mut sibling = self.left(parent);
                    debug_assert!(!sibling.is_nil(), "doubly black node without a sibling");

                    if self.color(sibling).is_red() {
                        trace!(node = x.index(), "delete fixup: red sibling");
                        self.set_color(sibling, Color::Black);
                        self.set_color(parent, Color::Red);
                        self.rotate_right(parent);
                        sibling = self.left(parent);
                    }

                    let near = self.right(sibling);
                    let far = self.left(sibling);
                    if self.color(near).is_black() && self.color(far).is_black() {
                        trace!(node = x.index(), "delete fixup: black nephews");
                        self.set_color(sibling, Color::Red);
                        x = parent;
                    } else {
                        if self.color(far).is_black() {
                            trace!(node = x.index(), "delete fixup: red near nephew");
                            self.set_color(near, Color::Black);
                            self.set_color(sibling, Color::Red);
                            self.rotate_left(sibling);
                            sibling = self.left(parent);
                        }

                        trace!(node = x.index(), "delete fixup: red far nephew");
                        let parent_color = self.color(parent);
                        self.set_color(sibling, parent_color);
                        self.set_color(parent, Color::Black);
                        let far = self.left(sibling);
                        self.set_color(far, Color::Black);
                        self.rotate_right(parent);
                        x = self.root;
                    }
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    /// Replaces subtree `old` with subtree `new`
    fn transplant(&mut self, old: NodeId, new: NodeId) {
        // We need to do two things:
        //  a) make the parent of `old` point to `new` instead of `old`,
        //     if `old` doesn't have a parent it must have been the root which
        //     means that `new` will be the new root
        //  b) make `new` point to the parent of `old`, even if `new` is the
        //     sentinel, delete_fixup walks up from it
        let parent = self.parent(old);

        // a)
        match self.pos(old) {
            NodePos::Root => self.root = new,
            NodePos::Left => self.set_left(parent, new),
            NodePos::Right => self.set_right(parent, new),
        }

        // b)
        self.set_parent(new, parent);
    }

    /// Removes every node, children before their parent, and returns how many
    /// were released. All outstanding handles become stale.
    pub fn clear(&mut self) -> usize {
        fn release_subtree<K>(tree: &mut RedBlackTree<K>, node: NodeId) -> usize {
            if node.is_nil() {
                return 0;
            }
            let (left, right) = (tree.left(node), tree.right(node));
            let released = release_subtree(tree, left) + release_subtree(tree, right);
            drop(tree.release(node));
            released + 1
        }

        let root = self.root;
        let released = release_subtree(self, root);
        self.root = NIL;
        self.len = 0;
        debug!(released, "cleared tree");
        released
    }

    /// Releases every node and then the tree itself. Returns the number of
    /// nodes that were still in the tree.
    ///
    /// Dropping the tree has the same effect.
    pub fn destroy(mut self) -> usize {
        self.clear()
    }
}

impl<K> RedBlackTree<K>
where
    K: Ord,
{
    /// Inserts `key` and returns a handle to its node. Equal keys are kept as
    /// separate nodes.
    ///
    /// Fails with [`Error::Allocation`] if node storage cannot grow, in which
    /// case the tree is unchanged.
    pub fn insert(&mut self, key: K) -> Result<NodeRef> {
        let node = self.alloc(key)?;
        self.link_leaf(node);
        self.len += 1;
        self.insert_fixup(node);
        Ok(self.handle(node))
    }

    /// Hangs the detached `node` below the last node on its search path.
    fn link_leaf(&mut self, node: NodeId) {
        // Move left/right down the tree until we find an empty slot, equal
        // keys go right so duplicates keep their insertion order
        let mut parent = NIL;
        let mut x = self.root;
        while !x.is_nil() {
            parent = x;
            x = match self.key(node).cmp(self.key(x)) {
                Ordering::Less => self.left(x),
                Ordering::Equal | Ordering::Greater => self.right(x),
            };
        }

        self.set_parent(node, parent);
        if parent.is_nil() {
            self.root = node;
        } else if self.key(node) < self.key(parent) {
            self.set_left(parent, node);
        } else {
            self.set_right(parent, node);
        }
    }

    fn insert_fixup(&mut self, new_node: NodeId) {
        let mut node = new_node;
        // the sentinel is black, so this also stops at the root
        while self.color(self.parent(node)).is_red() {
            debug_assert!(self.color(node).is_red());
            // red-black properties are violated because red parent has a red child
            //
            // Note that there is only one violation at this point.
            // At first iteration it's the new_node and its parent.
            // If we take the "red uncle" branch then at next iteration it will be
            // the grand_parent and its parent that violate the red-black properties.
            // If we take the other branch, there will be no more iterations as that
            // will result in a black parent.
            let mut parent = self.parent(node);
            // grand_parent must exist because parent is red and thus not root
            let grand_parent = self.parent(parent);
            debug_assert!(self.color(grand_parent).is_black());

            match self.pos(parent) {
                NodePos::Root => unreachable!("red node cannot be the root"),
                NodePos::Left => {
                    let uncle = self.right(grand_parent);
                    if self.color(uncle).is_red() {
                        //     +--- gp:b ---+               +--- gp:r ---+
                        //     |            |               |            |
                        //  + p:r +      + u:r +   -->   + p:b +      + u:b +
                        //  |     |      |     |         |     |      |     |
                        // n:r   a:b    b:b   c:b       n:r   a:b    b:b   c:b
                        // (a, b, c can be any subtrees)
                        //
                        // Coloring n black would add a black node to its paths only.
                        // Instead color parent and uncle black and grandparent red,
                        // which keeps the black height unchanged. The grand parent
                        // may now have a red parent, repeat from there.
                        trace!(node = node.index(), "insert fixup: red uncle");
                        self.set_color(parent, Color::Black);
                        self.set_color(uncle, Color::Black);
                        self.set_color(grand_parent, Color::Red);
                        node = grand_parent;
                    } else {
                        if let NodePos::Right = self.pos(node) {
                            //       +-- gp:b --+                 +-- gp:b --+
                            //       |          |                 |          |
                            //  +-- p:r --+    u:b  -->       +- n:r --+    u:b
                            //  |         |                   |        |
                            // a:b    +- n:r -+           +- p:r -+   c:b
                            //        |       |           |       |
                            //       b:b     c:b         a:b     b:b
                            //
                            // left rotate parent and swap node and parent so we
                            // match the case below
                            trace!(node = node.index(), "insert fixup: inner grandchild");
                            self.rotate_left(parent);
                            mem::swap(&mut parent, &mut node);
                        }

                        //           +-- gp:b --+            +----- p:b -----+
                        //           |          |            |               |
                        //      +-- p:r --+    u:b  -->   +- n:r -+     +- gp:r -+
                        //      |         |               |       |     |        |
                        //  +- n:r -+    c:b             a:b     b:b   c:b      u:b
                        //  |       |
                        // a:b     b:b
                        //
                        // This fixes the one violation we had.
                        trace!(node = node.index(), "insert fixup: outer grandchild");
                        self.set_color(parent, Color::Black);
                        self.set_color(grand_parent, Color::Red);
                        self.rotate_right(grand_parent);
                    }
                }
                NodePos::Right => {
                    // same as Left branch but left/right are switched
                    let uncle = self.left(grand_parent);
                    if self.color(uncle).is_red() {
                        trace!(node = node.index(), "insert fixup: red uncle");
                        self.set_color(parent, Color::Black);
                        self.set_color(uncle, Color::Black);
                        self.set_color(grand_parent, Color::Red);
                        node = grand_parent;
                    } else {
                        if let NodePos::Left = self.pos(node) {
                            trace!(node = node.index(), "insert fixup: inner grandchild");
                            self.rotate_right(parent);
                            mem::swap(&mut parent, &mut node);
                        }

                        trace!(node = node.index(), "insert fixup: outer grandchild");
                        self.set_color(parent, Color::Black);
                        self.set_color(grand_parent, Color::Red);
                        self.rotate_left(grand_parent);
                    }
                }
            }
        }

        let root = self.root;
        self.set_color(root, Color::Black);
    }
}

#[cfg(test)]
impl<K> RedBlackTree<K> {
    /// Breaks the tree on purpose so the invariant checker can be tested.
    pub(crate) fn recolor(&mut self, node: NodeRef, color: Color) {
        let node = self.resolve(node).unwrap();
        self.set_color(node, color);
    }

    pub(crate) fn replace_key(&mut self, node: NodeRef, key: K) {
        let node = self.resolve(node).unwrap();
        self.slot_mut(node).key = Some(key);
    }
}
