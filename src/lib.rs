//! In-memory B+ tree index over unique, sortable keys.
//!
//! ```
//! use leafchain::BPlusTree;
//!
//! let mut tree = BPlusTree::new(4).unwrap();
//! for key in [10, 20, 5, 6, 12, 30, 7, 17] {
//!     tree.insert(key).unwrap();
//! }
//!
//! assert!(tree.search(&12));
//! assert_eq!(tree.delete(&6), Ok(6));
//! assert_eq!(tree.iter().collect::<Vec<_>>(), vec![5, 7, 10, 12, 17, 20, 30]);
//! ```

pub mod btree;
pub mod config;
pub mod error;

pub use btree::iter::{Iter, Range};
pub use btree::tree::BPlusTree;
pub use btree::{DEFAULT_ORDER, MIN_ORDER};
pub use config::{ConfigError, DemoConfig, TreeConfig};
pub use error::IndexError;
