use std::collections::TryReserveError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Node storage could not be grown. The tree is left as it was.
    #[error("failed to allocate node storage")]
    Allocation(#[from] TryReserveError),
    #[error("invalid node handle: {0}")]
    InvalidArgument(InvalidNode),
}

/// Why a [`NodeRef`](crate::NodeRef) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidNode {
    #[error("handle was issued by another tree")]
    ForeignTree,
    #[error("node has already been erased")]
    Stale,
}

impl From<InvalidNode> for Error {
    fn from(reason: InvalidNode) -> Self {
        Self::InvalidArgument(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = Error::from(InvalidNode::Stale);
        assert_eq!(err.to_string(), "invalid node handle: node has already been erased");

        let reserve_err = Vec::<u64>::new().try_reserve(usize::MAX).unwrap_err();
        let err = Error::from(reserve_err);
        assert!(matches!(err, Error::Allocation(_)));
        assert_eq!(err.to_string(), "failed to allocate node storage");
    }
}
