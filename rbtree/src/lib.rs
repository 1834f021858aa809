//! Red-black tree over an arena of nodes.
//!
//! Nodes live in a `Vec` owned by the tree and link to each other by index.
//! Slot 0 is the sentinel: every missing child, the parent of the root and the
//! root of an empty tree point to it, so "no node here" is a single index
//! comparison. Callers get [`NodeRef`] handles which are checked against the
//! tree they came from and go stale once their node is erased.
//!
//! ```
//! use rbtree::RedBlackTree;
//!
//! let mut tree = RedBlackTree::new();
//! for key in [10, 5, 8, 34, 67, 23] {
//!     tree.insert(key).unwrap();
//! }
//! let min = tree.minimum().unwrap();
//! assert_eq!(tree.erase(min), Ok(5));
//! assert_eq!(tree.to_ordered_sequence(3), vec![8, 10, 23]);
//! ```
#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod node;
mod red_black_tree;
mod validate;

pub use config::Config;
pub use error::{Error, InvalidNode, Result};
pub use node::{Color, NodeRef, NodeView};
pub use red_black_tree::RedBlackTree;
pub use validate::Violation;
