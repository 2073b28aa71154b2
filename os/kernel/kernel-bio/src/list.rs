//! Doubly-linked lists threaded through an arena by index.
//!
//! The links live in the nodes (intrusive), the head/tail live in an
//! [`IndexList`]. A node's [`Link`] may only be touched through the
//! `&mut IndexList` of the list that currently contains it; in the cache that
//! list sits behind its bucket's spin lock, which is what orders the relaxed
//! atomic accesses below.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel index meaning "no node".
pub(crate) const NIL: usize = usize::MAX;

/// Per-node list linkage.
pub(crate) struct Link {
    prev: AtomicUsize,
    next: AtomicUsize,
}

impl Link {
    pub(crate) const fn new() -> Self {
        Self {
            prev: AtomicUsize::new(NIL),
            next: AtomicUsize::new(NIL),
        }
    }

    #[inline]
    fn prev(&self) -> usize {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    fn next(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_prev(&self, idx: usize) {
        self.prev.store(idx, Ordering::Relaxed);
    }

    #[inline]
    fn set_next(&self, idx: usize) {
        self.next.store(idx, Ordering::Relaxed);
    }
}

/// An arena whose nodes carry a [`Link`].
pub(crate) trait Links {
    fn link(&self, idx: usize) -> &Link;
}

impl Links for [Link] {
    #[inline]
    fn link(&self, idx: usize) -> &Link {
        &self[idx]
    }
}

/// Head of one list. The front is the most recently used end, the back the
/// least recently used one.
pub(crate) struct IndexList {
    head: usize,
    tail: usize,
    len: usize,
}

impl IndexList {
    pub(crate) const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Link `idx` in at the front. `idx` must not be on any list.
    pub(crate) fn push_front<L: Links + ?Sized>(&mut self, nodes: &L, idx: usize) {
        let link = nodes.link(idx);
        link.set_prev(NIL);
        link.set_next(self.head);
        if self.head == NIL {
            self.tail = idx;
        } else {
            nodes.link(self.head).set_prev(idx);
        }
        self.head = idx;
        self.len += 1;
    }

    /// Unlink `idx`, which must be on this list.
    pub(crate) fn remove<L: Links + ?Sized>(&mut self, nodes: &L, idx: usize) {
        let link = nodes.link(idx);
        let (prev, next) = (link.prev(), link.next());
        if prev == NIL {
            self.head = next;
        } else {
            nodes.link(prev).set_next(next);
        }
        if next == NIL {
            self.tail = prev;
        } else {
            nodes.link(next).set_prev(prev);
        }
        link.set_prev(NIL);
        link.set_next(NIL);
        self.len -= 1;
    }

    /// Move `idx`, which must be on this list, to the front.
    pub(crate) fn move_to_front<L: Links + ?Sized>(&mut self, nodes: &L, idx: usize) {
        if self.head != idx {
            self.remove(nodes, idx);
            self.push_front(nodes, idx);
        }
    }

    /// Walk from the most recently used end.
    pub(crate) fn iter<'a, L: Links + ?Sized>(&self, nodes: &'a L) -> Iter<'a, L> {
        Iter {
            nodes,
            cursor: self.head,
            forward: true,
        }
    }

    /// Walk from the least recently used end.
    pub(crate) fn iter_lru<'a, L: Links + ?Sized>(&self, nodes: &'a L) -> Iter<'a, L> {
        Iter {
            nodes,
            cursor: self.tail,
            forward: false,
        }
    }
}

pub(crate) struct Iter<'a, L: ?Sized> {
    nodes: &'a L,
    cursor: usize,
    forward: bool,
}

impl<L: Links + ?Sized> Iterator for Iter<'_, L> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NIL {
            return None;
        }
        let idx = self.cursor;
        let link = self.nodes.link(idx);
        self.cursor = if self.forward { link.next() } else { link.prev() };
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(n: usize) -> Vec<Link> {
        (0..n).map(|_| Link::new()).collect()
    }

    fn front_to_back(list: &IndexList, nodes: &[Link]) -> Vec<usize> {
        list.iter(nodes).collect()
    }

    #[test]
    fn push_front_orders_most_recent_first() {
        let nodes = arena(3);
        let mut list = IndexList::new();
        assert_eq!(list.len(), 0);
        for i in 0..3 {
            list.push_front(&nodes[..], i);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(front_to_back(&list, &nodes), [2, 1, 0]);
        assert_eq!(list.iter_lru(&nodes[..]).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let nodes = arena(4);
        let mut list = IndexList::new();
        for i in 0..4 {
            list.push_front(&nodes[..], i);
        }

        list.remove(&nodes[..], 2);
        assert_eq!(front_to_back(&list, &nodes), [3, 1, 0]);
        list.remove(&nodes[..], 3);
        assert_eq!(front_to_back(&list, &nodes), [1, 0]);
        list.remove(&nodes[..], 0);
        assert_eq!(front_to_back(&list, &nodes), [1]);
        list.remove(&nodes[..], 1);
        assert_eq!(list.len(), 0);
        assert_eq!(list.iter_lru(&nodes[..]).next(), None);
    }

    #[test]
    fn nodes_move_between_lists() {
        let nodes = arena(3);
        let mut a = IndexList::new();
        let mut b = IndexList::new();
        for i in 0..3 {
            a.push_front(&nodes[..], i);
        }

        a.remove(&nodes[..], 1);
        b.push_front(&nodes[..], 1);
        assert_eq!(front_to_back(&a, &nodes), [2, 0]);
        assert_eq!(front_to_back(&b, &nodes), [1]);
        assert_eq!(a.len() + b.len(), 3);
    }

    #[test]
    fn move_to_front_refreshes_recency() {
        let nodes = arena(3);
        let mut list = IndexList::new();
        for i in 0..3 {
            list.push_front(&nodes[..], i);
        }
        list.move_to_front(&nodes[..], 0);
        assert_eq!(front_to_back(&list, &nodes), [0, 2, 1]);
        list.move_to_front(&nodes[..], 0);
        assert_eq!(front_to_back(&list, &nodes), [0, 2, 1]);
        assert_eq!(list.iter_lru(&nodes[..]).next(), Some(1));
    }
}
