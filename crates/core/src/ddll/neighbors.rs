//! Leftward neighbor set of a node.
//!
//! The set is ordered around its owner: entries to the left of the owner come
//! first, nearest first, then the entries that are only to the left after
//! wrapping around the ring. Trimming to capacity therefore always drops the
//! farthest entries, and "everything strictly between the owner and X" is a
//! plain clockwise range.
use std::cmp::Ordering;
use std::cmp::Reverse;

use super::key::is_between;
use super::key::is_ordered;
use super::key::DdllKey;
use super::link::Link;
use crate::message::PropagateNeighbors;

/// Rank of `x` as seen from `owner`, smaller is nearer on the left.
fn left_rank<'a>(owner: &DdllKey, x: &'a DdllKey) -> (u8, Reverse<&'a DdllKey>) {
    let band = match x.cmp(owner) {
        Ordering::Less => 0,
        Ordering::Greater => 1,
        Ordering::Equal => 2,
    };
    (band, Reverse(x))
}

/// Sort links nearest-left first as seen from `owner`.
pub fn sort_leftward(owner: &DdllKey, links: &mut [Link]) {
    links.sort_by(|a, b| left_rank(owner, &a.key).cmp(&left_rank(owner, &b.key)));
}

/// A bounded, owner-centered set of leftward neighbors.
/// Only the owning node mutates it.
#[derive(Debug, Clone)]
pub struct NeighborSet {
    owner: Link,
    capacity: usize,
    entries: Vec<Link>,
    /// The right node and the set last propagated to it.
    last_sent: Option<(Link, Vec<Link>)>,
}

impl NeighborSet {
    pub fn new(owner: Link, capacity: usize) -> Self {
        Self {
            owner,
            capacity,
            entries: vec![],
            last_sent: None,
        }
    }

    pub fn owner(&self) -> &Link {
        &self.owner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &DdllKey) -> bool {
        self.entries.iter().any(|l| &l.key == key)
    }

    /// Entries nearest-left first.
    pub fn list(&self) -> Vec<Link> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.entries.iter()
    }

    /// The nearest entry on the left.
    pub fn nearest(&self) -> Option<&Link> {
        self.entries.first()
    }

    /// Add a link, replacing an entry with the same key.
    /// Returns whether the link survived trimming.
    pub fn add(&mut self, link: Link) -> bool {
        if link.key == self.owner.key {
            return false;
        }
        self.entries.retain(|l| l.key != link.key);
        let key = link.key.clone();
        self.entries.push(link);
        self.normalize();
        self.contains(&key)
    }

    pub fn add_all(&mut self, links: impl IntoIterator<Item = Link>) {
        for link in links {
            if link.key != self.owner.key {
                self.entries.retain(|l| l.key != link.key);
                self.entries.push(link);
            }
        }
        self.normalize();
    }

    pub fn remove(&mut self, key: &DdllKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|l| &l.key != key);
        before != self.entries.len()
    }

    /// Replace all entries.
    pub fn set(&mut self, links: impl IntoIterator<Item = Link>) {
        self.entries.clear();
        self.add_all(links);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_sent = None;
    }

    fn normalize(&mut self) {
        sort_leftward(&self.owner.key, &mut self.entries);
        self.entries.truncate(self.capacity);
    }

    /// The set `right` should hold once the owner is its left neighbor:
    /// the owner's entries minus those strictly between the owner and `right`,
    /// plus the owner itself, trimmed from `right`'s point of view.
    /// Never contains `right`.
    pub fn compute_for_right(&self, right: &Link) -> Vec<Link> {
        let mut set: Vec<Link> = self
            .entries
            .iter()
            .filter(|l| l.key != right.key)
            .filter(|l| !is_between(&self.owner.key, &l.key, &right.key))
            .cloned()
            .collect();
        if self.owner.key != right.key {
            set.push(self.owner.clone());
        }
        sort_leftward(&right.key, &mut set);
        set.truncate(self.capacity);
        set
    }

    /// Propagate the set computed for `right` unless `right` is at or beyond
    /// `limit`, or the same set was already sent to the same node.
    pub fn send_right(
        &mut self,
        src: &Link,
        right: &Link,
        limit: &DdllKey,
    ) -> Option<PropagateNeighbors> {
        if right.key == self.owner.key {
            return None;
        }
        if is_ordered(&self.owner.key, limit, &right.key) {
            tracing::trace!(
                "send_right: {} reached limit {} at {}",
                self.owner.key,
                limit,
                right.key
            );
            return None;
        }
        let set = self.compute_for_right(right);
        if let Some((last_right, last_set)) = &self.last_sent {
            if last_right.is_identical(right) && same_links(last_set, &set) {
                return None;
            }
        }
        self.last_sent = Some((right.clone(), set.clone()));
        Some(PropagateNeighbors {
            src: src.clone(),
            neighbors: set,
            limit: limit.clone(),
        })
    }

    /// Adopt the set computed by the left neighbor and pass it on.
    pub fn receive_neighbors(
        &mut self,
        src: &Link,
        new_set: Vec<Link>,
        right: &Link,
        limit: &DdllKey,
    ) -> Option<PropagateNeighbors> {
        self.set(new_set);
        self.send_right(src, right, limit)
    }

    /// The nearest entry that is neither `failed` nor in `exclude`.
    /// Entries are visited nearest-left first, which is also the tie-break.
    pub fn repair_candidate(&self, failed: &Link, exclude: &[Link]) -> Option<Link> {
        self.entries
            .iter()
            .filter(|l| l.key != failed.key)
            .find(|l| !exclude.iter().any(|e| e.key == l.key))
            .cloned()
    }
}

fn same_links(a: &[Link], b: &[Link]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_identical(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddll::link::tests::link;

    fn keys(links: &[Link]) -> Vec<i64> {
        links
            .iter()
            .map(|l| match l.key.primary() {
                crate::ddll::PrimaryKey::Int(v) => *v,
                _ => unreachable!(),
            })
            .collect()
    }

    fn set_of(owner: i64, cap: usize, members: &[i64]) -> NeighborSet {
        let mut ns = NeighborSet::new(link(owner), cap);
        ns.add_all(members.iter().map(|v| link(*v)));
        ns
    }

    #[test]
    fn test_order_is_nearest_left_first() {
        let ns = set_of(5, 10, &[1, 4, 8, 2, 9]);
        assert_eq!(keys(&ns.list()), vec![4, 2, 1, 9, 8]);
    }

    #[test]
    fn test_trim_drops_farthest() {
        let mut ns = set_of(5, 3, &[4, 3, 2]);
        assert!(!ns.add(link(9)));
        assert_eq!(keys(&ns.list()), vec![4, 3, 2]);
        assert!(!ns.add(link(1)));
        assert_eq!(keys(&ns.list()), vec![4, 3, 2]);

        let mut ns = set_of(5, 3, &[3, 2, 1]);
        assert!(ns.add(link(4)));
        assert_eq!(keys(&ns.list()), vec![4, 3, 2]);
    }

    #[test]
    fn test_owner_never_stored() {
        let mut ns = set_of(5, 3, &[4]);
        assert!(!ns.add(link(5)));
        assert_eq!(keys(&ns.list()), vec![4]);
    }

    #[test]
    fn test_remove() {
        let mut ns = set_of(5, 4, &[4, 3, 2]);
        assert!(ns.remove(&link(3).key));
        assert!(!ns.remove(&link(3).key));
        assert_eq!(keys(&ns.list()), vec![4, 2]);
    }

    #[test]
    fn test_compute_for_right_excludes_between_and_right() {
        // owner 5 with left neighbors, right is 8, so 6 and 7 would be obsolete
        let ns = set_of(5, 4, &[4, 3, 7, 6]);
        let set = ns.compute_for_right(&link(8));
        assert_eq!(keys(&set), vec![5, 4, 3]);
        assert!(!set.contains(&link(8)));

        // a wrapped entry equal to right is dropped
        let ns = set_of(5, 4, &[4, 3, 8]);
        assert_eq!(keys(&ns.compute_for_right(&link(8))), vec![5, 4, 3]);
    }

    #[test]
    fn test_compute_for_right_respects_capacity() {
        let ns = set_of(5, 3, &[4, 3, 2]);
        let set = ns.compute_for_right(&link(6));
        assert_eq!(keys(&set), vec![5, 4, 3]);
        assert!(set.len() <= ns.capacity());
    }

    #[test]
    fn test_compute_for_right_wraps() {
        // ring 0..9, owner 9 hands its set to 0
        let ns = set_of(9, 4, &[8, 7, 6, 5]);
        assert_eq!(keys(&ns.compute_for_right(&link(0))), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_send_right_is_idempotent() {
        let mut ns = set_of(5, 4, &[4, 3]);
        let me = link(5);
        let limit = link(4).key;
        let msg = ns.send_right(&me, &link(6), &limit).unwrap();
        assert_eq!(keys(&msg.neighbors), vec![5, 4, 3]);
        assert!(ns.send_right(&me, &link(6), &limit).is_none());

        // a changed set is sent again
        ns.add(link(2));
        assert!(ns.send_right(&me, &link(6), &limit).is_some());
        // so is the same set to another right node
        assert!(ns.send_right(&me, &link(7), &limit).is_some());
    }

    #[test]
    fn test_send_right_stops_at_limit() {
        let mut ns = set_of(5, 4, &[4, 3]);
        let me = link(5);
        // limit lies between owner and right
        assert!(ns.send_right(&me, &link(8), &link(7).key).is_none());
        // right itself is the limit
        assert!(ns.send_right(&me, &link(7), &link(7).key).is_none());
        // limit is behind
        assert!(ns.send_right(&me, &link(6), &link(3).key).is_some());
        // never to itself
        assert!(ns.send_right(&me, &link(5), &link(3).key).is_none());
    }

    #[test]
    fn test_receive_neighbors_replaces_and_forwards() {
        let mut ns = set_of(6, 3, &[2, 1]);
        let src = link(5);
        let msg = ns
            .receive_neighbors(&src, vec![link(5), link(4), link(3)], &link(7), &link(4).key)
            .unwrap();
        assert_eq!(keys(&ns.list()), vec![5, 4, 3]);
        assert_eq!(keys(&msg.neighbors), vec![6, 5, 4]);
        assert_eq!(msg.src, src);
    }

    #[test]
    fn test_repair_candidate_nearest_live() {
        let ns = set_of(5, 4, &[4, 3, 2, 1]);
        assert_eq!(ns.repair_candidate(&link(4), &[]), Some(link(3)));
        assert_eq!(ns.repair_candidate(&link(4), &[link(3)]), Some(link(2)));
        assert_eq!(
            ns.repair_candidate(&link(4), &[link(3), link(2), link(1)]),
            None
        );
    }
}
