use crate::btree::node::{Node, NodeRef};
use crate::btree::tree::BPlusTree;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::Bound;

/// Position in the leaf chain: a leaf and an index into its keys.
struct LeafCursor<K> {
    leaf: Option<NodeRef<K>>,
    position: usize,
}

impl<K: Clone> LeafCursor<K> {
    fn next_key(&mut self) -> Option<K> {
        loop {
            let leaf = self.leaf.as_ref()?;
            let step = match &*leaf.borrow() {
                Node::Leaf(l) => match l.keys.get(self.position) {
                    Some(key) => Ok(key.clone()),
                    None => Err(l.next_leaf()),
                },
                Node::Link(_) => Err(None),
            };

            match step {
                Ok(key) => {
                    self.position += 1;
                    return Some(key);
                }
                Err(next) => {
                    self.leaf = next;
                    self.position = 0;
                }
            }
        }
    }
}

/// Ascending iterator over every key, created by [`BPlusTree::iter`].
///
/// Holds a shared borrow of the tree for its whole life, so no insert or
/// delete can reshape the leaf chain underneath it.
pub struct Iter<'a, K> {
    cursor: LeafCursor<K>,
    remaining: usize,
    _tree: PhantomData<&'a BPlusTree<K>>,
}

impl<K> Iter<'_, K> {
    pub(crate) fn new(first_leaf: Option<NodeRef<K>>, len: usize) -> Self {
        Iter {
            cursor: LeafCursor {
                leaf: first_leaf,
                position: 0,
            },
            remaining: len,
            _tree: PhantomData,
        }
    }
}

impl<K: Clone> Iterator for Iter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let key = self.cursor.next_key()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Clone> ExactSizeIterator for Iter<'_, K> {}

impl<K: Clone> FusedIterator for Iter<'_, K> {}

/// Ascending iterator over the keys inside a range, created by [`BPlusTree::range`].
pub struct Range<'a, K> {
    cursor: LeafCursor<K>,
    end: Bound<K>,
    _tree: PhantomData<&'a BPlusTree<K>>,
}

impl<K> Range<'_, K> {
    pub(crate) fn new(start_leaf: Option<NodeRef<K>>, position: usize, end: Bound<K>) -> Self {
        Range {
            cursor: LeafCursor {
                leaf: start_leaf,
                position,
            },
            end,
            _tree: PhantomData,
        }
    }
}

impl<K: Ord + Clone> Iterator for Range<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let key = self.cursor.next_key()?;
        let within = match &self.end {
            Bound::Included(end) => key <= *end,
            Bound::Excluded(end) => key < *end,
            Bound::Unbounded => true,
        };

        if within {
            Some(key)
        } else {
            self.cursor.leaf = None;
            None
        }
    }
}

impl<K: Ord + Clone> FusedIterator for Range<'_, K> {}
