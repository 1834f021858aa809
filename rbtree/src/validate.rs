//! Invariant checker for [`RedBlackTree`].

use crate::node::{NodeId, NIL};
use crate::red_black_tree::RedBlackTree;

/// A broken red-black tree property. Node indices refer to the tree's
/// internal node store and are only meaningful for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("sentinel must be black and link only to itself")]
    Sentinel,
    #[error("root must be black and have no parent")]
    Root,
    #[error("key of node {index} is out of order with its ancestors")]
    Order { index: usize },
    #[error("child of node {index} does not link back to it")]
    ParentLink { index: usize },
    #[error("red node {index} has a red child")]
    RedRed { index: usize },
    #[error("black height below node {index} is {left} on the left but {right} on the right")]
    BlackHeight {
        index: usize,
        left: usize,
        right: usize,
    },
    #[error("tree reports {expected} nodes but {found} are reachable")]
    Len { expected: usize, found: usize },
}

impl<K> RedBlackTree<K>
where
    K: Ord,
{
    /// Checks every red-black and search tree property and returns the black
    /// height of the tree, counting the sentinel as one black node.
    pub fn validate(&self) -> Result<usize, Violation> {
        let sentinel = self.slot(NIL);
        if sentinel.color.is_red() || [sentinel.parent, sentinel.left, sentinel.right] != [NIL; 3]
        {
            return Err(Violation::Sentinel);
        }

        let root = self.root_id();
        if !root.is_nil() && (self.color(root).is_red() || !self.parent(root).is_nil()) {
            return Err(Violation::Root);
        }

        let mut found = 0;
        let black_height = self.validate_subtree(root, None, None, &mut found)?;
        if found != self.len() {
            return Err(Violation::Len {
                expected: self.len(),
                found,
            });
        }

        Ok(black_height)
    }

    /// Checks the subtree under `node`, whose keys must lie within
    /// `lower..=upper`, and returns its black height.
    fn validate_subtree(
        &self,
        node: NodeId,
        lower: Option<&K>,
        upper: Option<&K>,
        found: &mut usize,
    ) -> Result<usize, Violation> {
        if node.is_nil() {
            return Ok(1);
        }
        *found += 1;

        let index = node.index();
        let key = self.key(node);
        if lower.is_some_and(|lower| key < lower) || upper.is_some_and(|upper| key > upper) {
            return Err(Violation::Order { index });
        }

        let (left, right) = (self.left(node), self.right(node));
        for child in [left, right] {
            if child.is_nil() {
                continue;
            }
            if self.parent(child) != node {
                return Err(Violation::ParentLink { index });
            }
            if self.color(node).is_red() && self.color(child).is_red() {
                return Err(Violation::RedRed { index });
            }
        }

        let left_height = self.validate_subtree(left, lower, Some(key), found)?;
        let right_height = self.validate_subtree(right, Some(key), upper, found)?;
        if left_height != right_height {
            return Err(Violation::BlackHeight {
                index,
                left: left_height,
                right: right_height,
            });
        }

        Ok(left_height + usize::from(self.color(node).is_black()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Color;

    fn tree_from(keys: &[i32]) -> RedBlackTree<i32> {
        let mut tree = RedBlackTree::new();
        for &key in keys {
            tree.insert(key).unwrap();
        }
        tree
    }

    #[test]
    fn valid_trees() {
        assert_eq!(RedBlackTree::<i32>::new().validate(), Ok(1));
        assert_eq!(tree_from(&[1]).validate(), Ok(2));
        // 2 is black with two red children
        assert_eq!(tree_from(&[1, 2, 3]).validate(), Ok(2));
        assert!(tree_from(&[10, 5, 5, 34, 6, 23, 12, 12, 6, 12]).validate().is_ok());
    }

    #[test]
    fn red_root() {
        let mut tree = tree_from(&[1, 2, 3]);
        let root = tree.root().unwrap();
        tree.recolor(root, Color::Red);
        assert_eq!(tree.validate(), Err(Violation::Root));
    }

    #[test]
    fn red_red() {
        let mut tree = tree_from(&[1, 2, 3, 4]);
        // 1 and 3 were recolored black when 4 went in, 4 is red below 3
        let three = tree.find(&3).unwrap();
        tree.recolor(three, Color::Red);
        assert!(matches!(tree.validate(), Err(Violation::RedRed { .. })));
    }

    #[test]
    fn black_height() {
        let mut tree = tree_from(&[1, 2, 3]);
        let one = tree.find(&1).unwrap();
        tree.recolor(one, Color::Black);
        assert!(matches!(
            tree.validate(),
            Err(Violation::BlackHeight { left: 2, right: 1, .. })
        ));
    }

    #[test]
    fn order() {
        let mut tree = tree_from(&[1, 2, 3]);
        let one = tree.find(&1).unwrap();
        tree.replace_key(one, 5);
        assert!(matches!(tree.validate(), Err(Violation::Order { .. })));
    }
}
