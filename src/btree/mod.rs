//! Order-preserving multiway index over a single sortable key.
//!
//! Internal nodes (called link nodes here) hold separators and own their
//! children. Leaves hold the keys themselves and are chained left to right
//! through non-owning links so the whole key set can be walked without
//! touching the upper levels.

pub mod iter;
pub(crate) mod node;
pub mod tree;

/// Smallest order a tree can be built with.
pub const MIN_ORDER: usize = 3;
/// Order used when nothing else is configured.
pub const DEFAULT_ORDER: usize = 4;

/// Most keys any node may hold for the given order.
pub const fn max_keys(order: usize) -> usize {
    order - 1
}

/// Fewest keys a non-root node may hold for the given order, `ceil(m / 2) - 1`.
pub const fn min_keys(order: usize) -> usize {
    (order + 1) / 2 - 1
}
