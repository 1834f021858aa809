/// Construction options for [`RedBlackTree::with_config`].
///
/// [`RedBlackTree::with_config`]: crate::RedBlackTree::with_config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// Number of nodes the tree can hold before its storage has to grow.
    pub initial_capacity: usize,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            initial_capacity: 0,
        }
    }

    #[must_use]
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        assert_eq!(Config::new(), Config::default());
        let config = Config::new().with_initial_capacity(128);
        assert_eq!(config.initial_capacity, 128);
    }
}
