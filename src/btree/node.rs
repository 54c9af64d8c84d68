use crate::btree::max_keys;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::rc::{Rc, Weak};

/// Owning handle to a node. Each node has exactly one strong owner: its
/// parent's child slot, or the tree itself for the root.
pub(crate) type NodeRef<K> = Rc<RefCell<Node<K>>>;

/// Non-owning handle used for the leaf chain and the tree's first-leaf pointer.
pub(crate) type LeafLink<K> = Weak<RefCell<Node<K>>>;

#[derive(Debug)]
pub(crate) enum Node<K> {
    Leaf(InternalLeaf<K>),
    Link(InternalLink<K>),
}

#[derive(Debug)]
pub(crate) struct InternalLink<K> {
    pub(crate) separators: Vec<K>,     // a link holds at most order - 1 separators
    pub(crate) children: Vec<NodeRef<K>>, // and always one more child than separators
}

#[derive(Debug)]
pub(crate) struct InternalLeaf<K> {
    pub(crate) keys: Vec<K>,
    pub(crate) next: Option<LeafLink<K>>,
}

/// Outcome of placing a key into a leaf without splitting it.
#[derive(Debug, PartialEq)]
pub(crate) enum LeafInsert<K> {
    Inserted,
    Duplicate,
    /// The leaf has no room; the key is handed back so the caller can split.
    Full(K),
}

/// Which repair brought an underflowing child back into bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repair {
    BorrowedFromRight,
    BorrowedFromLeft,
    MergedWithRight,
    MergedIntoLeft,
}

impl<K> InternalLeaf<K> {
    pub(crate) fn next_leaf(&self) -> Option<NodeRef<K>> {
        self.next.as_ref().and_then(Weak::upgrade)
    }
}

impl<K: Ord> InternalLeaf<K> {
    /// Smallest index whose key is `>= key`.
    pub(crate) fn search_position(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Smallest index whose key is `> key`.
    pub(crate) fn upper_position(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    pub(crate) fn is_full(&self, order: usize) -> bool {
        self.keys.len() >= max_keys(order)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Duplicates are reported before fullness so a full leaf that already
    /// holds the key never triggers a split.
    pub(crate) fn insert_key(&mut self, key: K, order: usize) -> LeafInsert<K> {
        let pos = match self.keys.binary_search(&key) {
            Ok(_) => return LeafInsert::Duplicate,
            Err(pos) => pos,
        };

        if self.is_full(order) {
            return LeafInsert::Full(key);
        }

        self.keys.insert(pos, key);
        LeafInsert::Inserted
    }

    pub(crate) fn remove_key(&mut self, key: &K) -> Option<K> {
        let pos = self.keys.binary_search(key).ok()?;
        Some(self.keys.remove(pos))
    }

    /// Splits a full leaf around `key`. The lower half stays here, the upper
    /// half moves into a new right sibling that is spliced into the chain
    /// directly after this leaf. Returns the sibling's first key (the
    /// separator to promote) and the sibling itself.
    pub(crate) fn split_with(&mut self, key: K) -> (K, NodeRef<K>)
    where
        K: Clone,
    {
        let pos = self.search_position(&key);
        self.keys.insert(pos, key);

        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid);
        let promoted = right_keys[0].clone();

        let new_right = Rc::new(RefCell::new(Node::Leaf(InternalLeaf {
            keys: right_keys,
            next: self.next.take(),
        })));
        self.next = Some(Rc::downgrade(&new_right));

        (promoted, new_right)
    }
}

impl<K: Ord> InternalLink<K> {
    /// Index of the child whose range covers `key`: the number of separators
    /// `<= key`, since a separator is the smallest key of its right subtree.
    pub(crate) fn child_index(&self, key: &K) -> usize {
        self.separators.partition_point(|s| s <= key)
    }

    /// Places `key` at `position` and `right_child` just after it. A full
    /// link hands both back untouched.
    pub(crate) fn insert_key(
        &mut self,
        key: K,
        right_child: NodeRef<K>,
        position: usize,
        order: usize,
    ) -> Result<(), (K, NodeRef<K>)> {
        if self.separators.len() >= max_keys(order) {
            return Err((key, right_child));
        }

        self.separators.insert(position, key);
        self.children.insert(position + 1, right_child);
        Ok(())
    }

    /// Splits a full link around the incoming separator. The middle
    /// separator of the combined sequence moves up and is kept by neither half.
    pub(crate) fn split_with(
        &mut self,
        key: K,
        right_child: NodeRef<K>,
        position: usize,
    ) -> (K, NodeRef<K>) {
        self.separators.insert(position, key);
        self.children.insert(position + 1, right_child);

        let mid = self.separators.len() / 2;
        let right_separators = self.separators.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let bubbling_separator = self.separators.remove(mid);

        debug_assert_eq!(self.children.len(), self.separators.len() + 1);
        debug_assert_eq!(right_children.len(), right_separators.len() + 1);

        (
            bubbling_separator,
            Node::new_link_with_seps_and_children(right_separators, right_children),
        )
    }

    /// Brings `children[idx]` back to at least `min_keys` keys, trying in
    /// order: borrow from the right sibling, borrow from the left sibling,
    /// merge with the right sibling, merge into the left sibling.
    pub(crate) fn repair_child(&mut self, idx: usize, min_keys: usize) -> Repair
    where
        K: Clone,
    {
        let has_right = idx + 1 < self.children.len();
        let has_left = idx > 0;

        if has_right && self.children[idx + 1].borrow().len() > min_keys {
            self.borrow_from_right(idx);
            Repair::BorrowedFromRight
        } else if has_left && self.children[idx - 1].borrow().len() > min_keys {
            self.borrow_from_left(idx);
            Repair::BorrowedFromLeft
        } else if has_right {
            self.merge_children(idx);
            Repair::MergedWithRight
        } else {
            self.merge_children(idx - 1);
            Repair::MergedIntoLeft
        }
    }

    fn borrow_from_right(&mut self, idx: usize)
    where
        K: Clone,
    {
        let mut child = self.children[idx].borrow_mut();
        let mut right = self.children[idx + 1].borrow_mut();

        match (&mut *child, &mut *right) {
            (Node::Leaf(child_leaf), Node::Leaf(right_leaf)) => {
                let moved = right_leaf.keys.remove(0);
                child_leaf.keys.push(moved);
                if let Some(first) = right_leaf.keys.first() {
                    self.separators[idx] = first.clone();
                }
            }
            (Node::Link(child_link), Node::Link(right_link)) => {
                let lifted = right_link.separators.remove(0);
                let lowered = mem::replace(&mut self.separators[idx], lifted);
                child_link.separators.push(lowered);
                child_link.children.push(right_link.children.remove(0));
            }
            _ => unreachable!("siblings on the same level are always the same kind"),
        }
    }

    fn borrow_from_left(&mut self, idx: usize)
    where
        K: Clone,
    {
        let mut left = self.children[idx - 1].borrow_mut();
        let mut child = self.children[idx].borrow_mut();

        match (&mut *left, &mut *child) {
            (Node::Leaf(left_leaf), Node::Leaf(child_leaf)) => {
                if let Some(moved) = left_leaf.keys.pop() {
                    self.separators[idx - 1] = moved.clone();
                    child_leaf.keys.insert(0, moved);
                }
            }
            (Node::Link(left_link), Node::Link(child_link)) => {
                if let (Some(lifted), Some(moved_child)) =
                    (left_link.separators.pop(), left_link.children.pop())
                {
                    let lowered = mem::replace(&mut self.separators[idx - 1], lifted);
                    child_link.separators.insert(0, lowered);
                    child_link.children.insert(0, moved_child);
                }
            }
            _ => unreachable!("siblings on the same level are always the same kind"),
        }
    }

    /// Folds `children[idx + 1]` into `children[idx]` and drops the separator
    /// between them. Links pull that separator down; leaves discard it and
    /// unhook the absorbed leaf from the chain.
    fn merge_children(&mut self, idx: usize) {
        let absorbed = self.children.remove(idx + 1);
        let separator = self.separators.remove(idx);

        let mut left = self.children[idx].borrow_mut();
        let mut right = absorbed.borrow_mut();

        match (&mut *left, &mut *right) {
            (Node::Leaf(left_leaf), Node::Leaf(right_leaf)) => {
                left_leaf.keys.append(&mut right_leaf.keys);
                left_leaf.next = right_leaf.next.take();
            }
            (Node::Link(left_link), Node::Link(right_link)) => {
                left_link.separators.push(separator);
                left_link.separators.append(&mut right_link.separators);
                left_link.children.append(&mut right_link.children);
            }
            _ => unreachable!("siblings on the same level are always the same kind"),
        }
    }
}

impl<K> Node<K> {
    pub(crate) fn new_leaf() -> NodeRef<K> {
        Rc::new(RefCell::new(Node::Leaf(InternalLeaf {
            keys: Vec::new(),
            next: None,
        })))
    }

    pub(crate) fn new_link_with_seps_and_children(
        separators: Vec<K>,
        children: Vec<NodeRef<K>>,
    ) -> NodeRef<K> {
        Rc::new(RefCell::new(Node::Link(InternalLink {
            separators,
            children,
        })))
    }

    /// Number of keys (leaf) or separators (link) held.
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Link(link) => link.separators.len(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub(crate) fn has_underflow(&self, min_keys: usize) -> bool {
        self.len() < min_keys
    }

    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Link(link) => &link.separators,
        }
    }

    pub(crate) fn fmt_depth(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result
    where
        K: Debug,
    {
        let indent = "  ".repeat(depth);
        match self {
            Node::Leaf(leaf) => writeln!(f, "{indent}leaf {:?}", leaf.keys),
            Node::Link(link) => {
                writeln!(f, "{indent}link {:?}", link.separators)?;
                for child in &link.children {
                    child.borrow().fmt_depth(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl<K: Ord> Node<K> {
    /// Receives a separator promoted by the split of `children[position]`.
    /// If this link overflows in turn, it splits and hands back its own
    /// promoted separator and new right sibling.
    pub(crate) fn absorb_split(
        &mut self,
        key: K,
        right_child: NodeRef<K>,
        position: usize,
        order: usize,
    ) -> Option<(K, NodeRef<K>)> {
        match self {
            Node::Link(link) => match link.insert_key(key, right_child, position, order) {
                Ok(()) => None,
                Err((key, right_child)) => Some(link.split_with(key, right_child, position)),
            },
            Node::Leaf(_) => unreachable!("a split is only ever promoted into a link"),
        }
    }
}
