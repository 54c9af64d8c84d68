use crate::btree::iter::{Iter, Range};
use crate::btree::node::{LeafInsert, LeafLink, Node, NodeRef};
use crate::btree::{max_keys, min_keys, MIN_ORDER};
use crate::config::TreeConfig;
use crate::error::IndexError;
use serde::{Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Bound, RangeBounds};
use std::rc::Rc;
use tracing::{debug, trace};

/// B+ tree over unique keys.
///
/// Every key lives in a leaf; link nodes above hold separators only. The
/// leaves are chained in ascending order, so [`BPlusTree::iter`] and
/// [`BPlusTree::range`] walk the chain instead of the tree.
///
/// The tree is single-threaded (`!Send`, `!Sync`). Iterators borrow the
/// tree, so it cannot be modified while one is open.
#[derive(Debug)]
pub struct BPlusTree<K> {
    root: NodeRef<K>,
    first_leaf: LeafLink<K>,
    order: usize,
    len: usize,
}

impl<K: Ord + Clone + Debug> BPlusTree<K> {
    /// Builds an empty tree whose nodes hold at most `order - 1` keys.
    ///
    /// Fails with [`IndexError::InvalidConfiguration`] if `order < 3`.
    pub fn new(order: usize) -> Result<Self, IndexError> {
        if order < MIN_ORDER {
            return Err(IndexError::InvalidConfiguration { order });
        }

        let root = Node::new_leaf();
        Ok(BPlusTree {
            first_leaf: Rc::downgrade(&root),
            root,
            order,
            len: 0,
        })
    }

    pub fn with_config(config: TreeConfig) -> Result<Self, IndexError> {
        Self::new(config.order)
    }

    /// Builds a tree holding every key of `keys`. Repeated keys are kept once.
    pub fn from_keys(order: usize, keys: impl IntoIterator<Item = K>) -> Result<Self, IndexError> {
        let mut tree = Self::new(order)?;
        for key in keys {
            match tree.insert(key) {
                Ok(()) | Err(IndexError::DuplicateKey) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(tree)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels from the root down to the leaves; a lone root leaf has height 1.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut current = Rc::clone(&self.root);
        loop {
            let child = match &*current.borrow() {
                Node::Leaf(_) => None,
                Node::Link(link) => link.children.first().cloned(),
            };
            match child {
                Some(child) => {
                    height += 1;
                    current = child;
                }
                None => return height,
            }
        }
    }

    /// Whether `key` is stored. Visits one node per level.
    pub fn search(&self, key: &K) -> bool {
        let leaf = self.find_leaf(key);
        let leaf_ref = leaf.borrow();
        match &*leaf_ref {
            Node::Leaf(internal_leaf) => internal_leaf.contains(key),
            Node::Link(_) => false,
        }
    }

    pub fn first(&self) -> Option<K> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<K> {
        let mut current = Rc::clone(&self.root);
        loop {
            let child = match &*current.borrow() {
                Node::Leaf(leaf) => return leaf.keys.last().cloned(),
                Node::Link(link) => link.children.last().cloned(),
            };
            current = child?;
        }
    }

    /// Inserts `key`. A key that is already present is rejected with
    /// [`IndexError::DuplicateKey`] and the tree is left untouched.
    pub fn insert(&mut self, key: K) -> Result<(), IndexError> {
        // links descended through, with the child slot taken at each
        let mut path: Vec<(NodeRef<K>, usize)> = Vec::new();
        let mut current = Rc::clone(&self.root);

        let (mut promoted, mut right) = loop {
            let (idx, child) = {
                let mut node_ref = current.borrow_mut();
                match &mut *node_ref {
                    Node::Link(link) => {
                        let idx = link.child_index(&key);
                        (idx, Rc::clone(&link.children[idx]))
                    }
                    Node::Leaf(leaf) => match leaf.insert_key(key, self.order) {
                        LeafInsert::Inserted => {
                            self.len += 1;
                            return Ok(());
                        }
                        LeafInsert::Duplicate => {
                            trace!(keys = ?leaf.keys, "duplicate key rejected");
                            return Err(IndexError::DuplicateKey);
                        }
                        LeafInsert::Full(key) => break leaf.split_with(key),
                    },
                }
            };
            path.push((current, idx));
            current = child;
        };

        self.len += 1;
        debug!(separator = ?promoted, "split leaf");

        let mut left = current;
        loop {
            match path.pop() {
                None => {
                    // the node that just split was the root
                    let new_root =
                        Node::new_link_with_seps_and_children(vec![promoted], vec![left, right]);
                    self.root = new_root;
                    debug!(height = self.height(), "grew new root");
                    return Ok(());
                }
                Some((parent, idx)) => {
                    let overflow = parent
                        .borrow_mut()
                        .absorb_split(promoted, right, idx, self.order);
                    match overflow {
                        None => return Ok(()),
                        Some((separator, new_right)) => {
                            debug!(?separator, "split link");
                            promoted = separator;
                            right = new_right;
                            left = parent;
                        }
                    }
                }
            }
        }
    }

    /// Removes `key` and returns it, or reports [`IndexError::KeyNotFound`]
    /// without touching the tree.
    pub fn delete(&mut self, key: &K) -> Result<K, IndexError> {
        let removed = Self::delete_internal(&self.root, key, min_keys(self.order));
        let removed = match removed {
            Ok(removed) => removed,
            Err(e) => {
                trace!(?key, "delete missed");
                return Err(e);
            }
        };

        self.len -= 1;
        self.shrink_root();
        Ok(removed)
    }

    fn delete_internal(node: &NodeRef<K>, key: &K, min_keys: usize) -> Result<K, IndexError> {
        let mut node_ref = node.borrow_mut();
        match &mut *node_ref {
            Node::Leaf(leaf) => leaf.remove_key(key).ok_or(IndexError::KeyNotFound),
            Node::Link(link) => {
                let idx = link.child_index(key);
                let child = Rc::clone(&link.children[idx]);
                let removed = Self::delete_internal(&child, key, min_keys)?;

                let underflow = child.borrow().has_underflow(min_keys);
                drop(child);
                if underflow {
                    let repair = link.repair_child(idx, min_keys);
                    debug!(?repair, child = idx, "repaired underflow");
                }
                Ok(removed)
            }
        }
    }

    /// A link root left without separators is replaced by its only child.
    fn shrink_root(&mut self) {
        let replacement = match &mut *self.root.borrow_mut() {
            Node::Link(link) if link.separators.is_empty() => link.children.pop(),
            _ => None,
        };

        if let Some(child) = replacement {
            if child.borrow().is_leaf() {
                self.first_leaf = Rc::downgrade(&child);
            }
            self.root = child;
            debug!(height = self.height(), "root shrank");
        }
    }

    /// Ascending walk over every key along the leaf chain.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter::new(self.first_leaf.upgrade(), self.len)
    }

    /// Ascending walk over the keys inside `range`. One descent finds the
    /// starting leaf; the rest follows the leaf chain.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Range<'_, K> {
        let (leaf, position) = match range.start_bound() {
            Bound::Unbounded => (self.first_leaf.upgrade(), 0),
            Bound::Included(start) | Bound::Excluded(start) => {
                let leaf = self.find_leaf(start);
                let position = match (&*leaf.borrow(), range.start_bound()) {
                    (Node::Leaf(l), Bound::Excluded(_)) => l.upper_position(start),
                    (Node::Leaf(l), _) => l.search_position(start),
                    (Node::Link(_), _) => 0,
                };
                (Some(leaf), position)
            }
        };

        let end = match range.end_bound() {
            Bound::Included(k) => Bound::Included(k.clone()),
            Bound::Excluded(k) => Bound::Excluded(k.clone()),
            Bound::Unbounded => Bound::Unbounded,
        };

        Range::new(leaf, position, end)
    }

    /// Number of leaves reachable along the chain from the first leaf.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.first_leaf.upgrade();
        while let Some(leaf) = current {
            count += 1;
            current = match &*leaf.borrow() {
                Node::Leaf(l) => l.next_leaf(),
                Node::Link(_) => None,
            };
        }
        count
    }

    fn find_leaf(&self, key: &K) -> NodeRef<K> {
        let mut current = Rc::clone(&self.root);
        loop {
            let child = match &*current.borrow() {
                Node::Leaf(_) => None,
                Node::Link(link) => Some(Rc::clone(&link.children[link.child_index(key)])),
            };
            match child {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Walks the whole tree and panics on the first structural violation:
    /// key counts out of bounds, unordered keys, a key outside the range its
    /// separators allow, leaves at different depths, a stale `len`, or a leaf
    /// chain that disagrees with the tree's left-to-right leaf order.
    pub fn check_invariants(&self) {
        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        let mut key_count = 0;
        self.check_node(
            &self.root,
            (None, None),
            0,
            &mut leaf_depth,
            &mut leaves,
            &mut key_count,
        );

        assert_eq!(key_count, self.len, "stored key count disagrees with len");

        let mut chained = Vec::new();
        let mut current = self.first_leaf.upgrade();
        while let Some(leaf) = current {
            assert!(chained.len() < leaves.len(), "leaf chain is longer than the tree");
            current = match &*leaf.borrow() {
                Node::Leaf(l) => l.next_leaf(),
                Node::Link(_) => panic!("leaf chain reaches a link node"),
            };
            chained.push(leaf);
        }

        assert_eq!(chained.len(), leaves.len(), "leaf chain skips leaves");
        for (walked, expected) in chained.iter().zip(&leaves) {
            assert!(Rc::ptr_eq(walked, expected), "leaf chain out of tree order");
        }
    }

    fn check_node(
        &self,
        node: &NodeRef<K>,
        (lower, upper): (Option<&K>, Option<&K>),
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<NodeRef<K>>,
        key_count: &mut usize,
    ) {
        let node_ref = node.borrow();
        let keys = node_ref.keys();
        let is_root = depth == 0;

        assert!(keys.len() <= max_keys(self.order), "node over capacity: {keys:?}");
        if !is_root {
            assert!(
                !node_ref.has_underflow(min_keys(self.order)),
                "node under minimum: {keys:?}"
            );
        }
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys out of order: {keys:?}");
        if let (Some(lower), Some(first)) = (lower, keys.first()) {
            assert!(lower <= first, "{first:?} below separator {lower:?}");
        }
        if let (Some(upper), Some(last)) = (upper, keys.last()) {
            assert!(last < upper, "{last:?} not below separator {upper:?}");
        }

        match &*node_ref {
            Node::Leaf(_) => {
                match leaf_depth {
                    Some(d) => assert_eq!(*d, depth, "leaves at different depths"),
                    None => *leaf_depth = Some(depth),
                }
                *key_count += keys.len();
                leaves.push(Rc::clone(node));
            }
            Node::Link(link) => {
                assert!(!link.separators.is_empty(), "link without separators");
                assert_eq!(
                    link.children.len(),
                    link.separators.len() + 1,
                    "child count mismatch"
                );
                for (i, child) in link.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&link.separators[i - 1]) };
                    let child_upper = link.separators.get(i).or(upper);
                    self.check_node(
                        child,
                        (child_lower, child_upper),
                        depth + 1,
                        leaf_depth,
                        leaves,
                        key_count,
                    );
                }
            }
        }
    }
}

impl<'a, K: Ord + Clone + Debug> IntoIterator for &'a BPlusTree<K> {
    type Item = K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Debug> Display for BPlusTree<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.root.borrow().fmt_depth(f, 0)
    }
}

/// Serializes as the ascending key sequence, the same shape as a `BTreeSet`.
impl<K: Ord + Clone + Debug + Serialize> Serialize for BPlusTree<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::DEFAULT_ORDER;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    const SCENARIO_KEYS: [i32; 8] = [10, 20, 5, 6, 12, 30, 7, 17];

    fn create_tree() -> BPlusTree<i32> {
        BPlusTree::new(DEFAULT_ORDER).unwrap()
    }

    fn scenario_tree() -> BPlusTree<i32> {
        let mut tree = create_tree();
        for key in SCENARIO_KEYS {
            tree.insert(key).unwrap();
            tree.check_invariants();
        }
        tree
    }

    fn collected(tree: &BPlusTree<i32>) -> Vec<i32> {
        tree.iter().collect()
    }

    #[test]
    fn test_rejects_small_order() {
        assert_eq!(
            BPlusTree::<i32>::new(2).unwrap_err(),
            IndexError::InvalidConfiguration { order: 2 }
        );
        assert!(BPlusTree::<i32>::new(3).is_ok());
    }

    #[test]
    fn test_single_leaf_node() {
        let mut tree = create_tree();
        for i in 0..max_keys(DEFAULT_ORDER) as i32 {
            tree.insert(i).unwrap();
        }

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root.borrow().keys(), &[0, 1, 2]);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_root_link_node() {
        let mut tree = create_tree();
        for i in 0..DEFAULT_ORDER as i32 {
            tree.insert(i).unwrap();
        }

        // [0, 1, 2, 3] splits at the midpoint and 2 moves up
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.root.borrow().keys(), &[2]);
        assert_eq!(tree.leaf_count(), 2);
        tree.check_invariants();
    }

    #[test]
    fn test_scenario_structure() {
        let tree = scenario_tree();

        assert_eq!(tree.root.borrow().keys(), &[10, 20]);
        assert_eq!(
            tree.to_string(),
            "link [10, 20]\n  leaf [5, 6, 7]\n  leaf [10, 12, 17]\n  leaf [20, 30]\n"
        );
    }

    #[test]
    fn test_scenario_search_and_iterate() {
        let tree = scenario_tree();

        assert!(tree.search(&12));
        assert!(tree.search(&10));
        assert!(tree.search(&20));
        assert!(!tree.search(&99));
        assert_eq!(collected(&tree), vec![5, 6, 7, 10, 12, 17, 20, 30]);
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.first(), Some(5));
        assert_eq!(tree.last(), Some(30));
    }

    #[test]
    fn test_scenario_delete_one() {
        let mut tree = scenario_tree();

        assert_eq!(tree.delete(&6), Ok(6));
        tree.check_invariants();

        assert_eq!(collected(&tree), vec![5, 7, 10, 12, 17, 20, 30]);
        assert!(!tree.search(&6));
    }

    #[test]
    fn test_scenario_delete_everything() {
        let orders: [&[i32]; 3] = [
            &SCENARIO_KEYS,
            &[30, 20, 17, 12, 10, 7, 6, 5],
            &[12, 5, 30, 10, 6, 20, 7, 17],
        ];

        for deletion_order in orders {
            let mut tree = scenario_tree();
            for key in deletion_order {
                assert_eq!(tree.delete(key), Ok(*key));
                tree.check_invariants();
            }

            assert!(tree.is_empty());
            assert!(tree.root.borrow().is_leaf());
            assert_eq!(tree.root.borrow().len(), 0);
            assert_eq!(tree.height(), 1);
            assert_eq!(tree.iter().next(), None);
        }
    }

    #[test]
    fn test_duplicate_insert_is_reported() {
        let mut tree = create_tree();

        assert_eq!(tree.insert(5), Ok(()));
        assert_eq!(tree.insert(5), Err(IndexError::DuplicateKey));
        assert_eq!(collected(&tree), vec![5]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_duplicate_into_full_leaf_does_not_split() {
        let mut tree = create_tree();
        for key in [1, 2, 3] {
            tree.insert(key).unwrap();
        }

        assert_eq!(tree.insert(2), Err(IndexError::DuplicateKey));
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_delete_missing_key() {
        let mut tree = create_tree();
        assert_eq!(tree.delete(&1), Err(IndexError::KeyNotFound));

        let mut tree = scenario_tree();
        let before = tree.to_string();
        assert_eq!(tree.delete(&11), Err(IndexError::KeyNotFound));
        assert_eq!(tree.to_string(), before);
        assert_eq!(tree.len(), 8);
    }

    #[test]
    fn test_insert_then_delete_restores_keys() {
        let mut tree = scenario_tree();
        let before = collected(&tree);

        tree.insert(11).unwrap();
        tree.delete(&11).unwrap();
        tree.check_invariants();

        assert_eq!(collected(&tree), before);
    }

    #[test]
    fn test_delete_separator_keys() {
        let mut tree = scenario_tree();

        // 10 and 20 are both separators in the root
        tree.delete(&10).unwrap();
        tree.check_invariants();
        tree.delete(&20).unwrap();
        tree.check_invariants();

        assert!(!tree.search(&10));
        assert!(!tree.search(&20));
        assert_eq!(collected(&tree), vec![5, 6, 7, 12, 17, 30]);
    }

    #[test]
    fn test_demo_sequence() {
        let mut tree = create_tree();
        for key in [10, 20, 5, 6, 12, 30, 7, 17, 3, 8, 25, 15, 1] {
            tree.insert(key).unwrap();
            tree.check_invariants();
        }
        assert_eq!(tree.height(), 3);

        assert!(tree.search(&6));
        assert!(tree.search(&15));
        assert!(!tree.search(&100));

        for key in [6, 10, 20, 1, 3] {
            tree.delete(&key).unwrap();
            tree.check_invariants();
        }
        assert_eq!(collected(&tree), vec![5, 7, 8, 12, 15, 17, 25, 30]);
    }

    #[test]
    fn test_range_walks_across_leaves() {
        let tree = scenario_tree();

        assert_eq!(tree.range(6..=17).collect::<Vec<_>>(), vec![6, 7, 10, 12, 17]);
        assert_eq!(tree.range(6..17).collect::<Vec<_>>(), vec![6, 7, 10, 12]);
        assert_eq!(tree.range(8..).collect::<Vec<_>>(), vec![10, 12, 17, 20, 30]);
        assert_eq!(tree.range(..7).collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(
            tree.range((Bound::Excluded(10), Bound::Excluded(20))).collect::<Vec<_>>(),
            vec![12, 17]
        );
        assert_eq!(tree.range(31..).count(), 0);
        assert_eq!(tree.range(..).count(), 8);
    }

    #[test]
    fn test_random_orders_against_sorted_vec() {
        let mut rng = StdRng::seed_from_u64(7);

        for order in [3, 4, 5, 8] {
            let mut keys: Vec<i32> = (0..300).collect();
            keys.shuffle(&mut rng);

            let mut tree = BPlusTree::new(order).unwrap();
            for key in &keys {
                tree.insert(*key).unwrap();
            }
            tree.check_invariants();
            assert_eq!(collected(&tree), (0..300).collect::<Vec<_>>());

            keys.shuffle(&mut rng);
            let (gone, kept) = keys.split_at(150);
            for key in gone {
                tree.delete(key).unwrap();
                tree.check_invariants();
            }

            let mut expected = kept.to_vec();
            expected.sort();
            assert_eq!(collected(&tree), expected);
            assert_eq!(tree.len(), 150);
        }
    }

    #[test]
    fn test_from_keys_skips_duplicates() {
        let tree = BPlusTree::from_keys(3, [4, 1, 4, 9, 1, 7]).unwrap();

        assert_eq!(collected(&tree), vec![1, 4, 7, 9]);
        tree.check_invariants();
    }
}
