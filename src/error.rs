use crate::btree::MIN_ORDER;

/// Errors reported by index operations.
///
/// None of these leave the tree modified: a rejected insert or a delete of
/// a missing key returns before any node is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// The requested order is below [`MIN_ORDER`]; no tree is built.
    InvalidConfiguration { order: usize },
    /// The key is already stored. Keys are unique; the insert is a no-op.
    DuplicateKey,
    /// The key is not stored.
    KeyNotFound,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration { order } => {
                write!(f, "invalid order {order}: must be at least {MIN_ORDER}")
            }
            Self::DuplicateKey => write!(f, "key already present"),
            Self::KeyNotFound => write!(f, "key not found"),
        }
    }
}

impl std::error::Error for IndexError {}
