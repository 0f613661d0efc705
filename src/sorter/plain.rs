use std::cmp::Ordering;
use std::collections::HashSet;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::sorter::comparator::ComparatorState;
use crate::sorter::{Match, MatchSorter};

/// Bounded top-N queue.
///
/// Keeps the best `max_matches` matches in a binary heap whose root is the
/// current worst entry, so a better newcomer replaces the root in
/// `O(log n)`.
pub struct PlainSorter {
    state: ComparatorState,
    max_matches: usize,
    heap: Vec<Match>,
    seen: HashSet<DocId>,
    total: u64,
}

impl PlainSorter {
    pub fn new(max_matches: usize, state: ComparatorState) -> Self {
        PlainSorter {
            state,
            max_matches,
            heap: Vec::with_capacity(max_matches.min(4096)),
            seen: HashSet::new(),
            total: 0,
        }
    }

    fn worse(&self, i: usize, j: usize) -> bool {
        self.state.compare(&self.heap[i], &self.heap[j]) == Ordering::Greater
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.worse(i, parent) {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let (left, right) = (2 * i + 1, 2 * i + 2);
            let mut worst = i;
            if left < n && self.worse(left, worst) {
                worst = left;
            }
            if right < n && self.worse(right, worst) {
                worst = right;
            }
            if worst == i {
                break;
            }
            self.heap.swap(i, worst);
            i = worst;
        }
    }
}

impl MatchSorter for PlainSorter {
    fn uses_attrs(&self) -> bool {
        self.state.uses_attrs()
    }

    fn set_state(&mut self, state: ComparatorState) -> Result<()> {
        if self.total > 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "sort state cannot change after matches were pushed".to_string(),
            ));
        }
        self.state = state;
        Ok(())
    }

    fn push(&mut self, m: Match) -> bool {
        if !self.seen.insert(m.doc_id) {
            return false;
        }
        self.total += 1;
        if self.max_matches == 0 {
            return true;
        }
        if self.heap.len() < self.max_matches {
            self.heap.push(m);
            let last = self.heap.len() - 1;
            self.sift_up(last);
        } else if self.state.compare(&m, &self.heap[0]) == Ordering::Less {
            self.heap[0] = m;
            self.sift_down(0);
        }
        true
    }

    fn length(&self) -> usize {
        self.heap.len()
    }

    fn total_pushed(&self) -> u64 {
        self.total
    }

    fn flatten(&mut self, tag: Option<u32>) -> Vec<Match> {
        let mut matches = std::mem::take(&mut self.heap);
        matches.sort_by(|a, b| self.state.compare(a, b));
        if let Some(tag) = tag {
            for m in &mut matches {
                m.tag = Some(tag);
            }
        }
        self.seen.clear();
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::schema::Row;

    fn m(id: u64, weight: u32) -> Match {
        Match::new(DocId(id), weight, Row::new(0))
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut sorter = PlainSorter::new(10, ComparatorState::relevance());
        assert!(sorter.push(m(7, 1)));
        assert!(!sorter.push(m(7, 100)));
        assert_eq!(sorter.length(), 1);
        assert_eq!(sorter.total_pushed(), 1);
        assert_eq!(sorter.flatten(None)[0].weight, 1);
    }

    #[test]
    fn zero_capacity_accepts_nothing() {
        let mut sorter = PlainSorter::new(0, ComparatorState::relevance());
        assert!(sorter.push(m(1, 1)));
        assert!(sorter.push(m(2, 2)));
        assert_eq!(sorter.length(), 0);
        assert_eq!(sorter.total_pushed(), 2);
        assert!(sorter.flatten(None).is_empty());
    }

    #[test]
    fn keeps_best_and_tags_on_flatten() {
        let mut sorter = PlainSorter::new(2, ComparatorState::relevance());
        for (id, w) in [(1, 5), (2, 9), (3, 1), (4, 7)] {
            sorter.push(m(id, w));
        }
        assert_eq!(sorter.length(), 2);
        let out = sorter.flatten(Some(3));
        let ids: Vec<u64> = out.iter().map(|m| m.doc_id.0).collect();
        assert_eq!(ids, vec![2, 4]);
        assert!(out.iter().all(|m| m.tag == Some(3)));
    }

    #[test]
    fn state_is_frozen_after_first_push() {
        let mut sorter = PlainSorter::new(2, ComparatorState::relevance());
        assert!(sorter.set_state(ComparatorState::new(0)).is_ok());
        sorter.push(m(1, 1));
        assert!(sorter.set_state(ComparatorState::relevance()).is_err());
    }

    proptest! {
        #[test]
        fn matches_full_sort(weights in proptest::collection::vec(0u32..20, 0..60), cap in 0usize..12) {
            let mut sorter = PlainSorter::new(cap, ComparatorState::relevance());
            for (i, w) in weights.iter().enumerate() {
                sorter.push(m(i as u64 + 1, *w));
            }
            let got: Vec<u64> = sorter.flatten(None).iter().map(|m| m.doc_id.0).collect();

            let mut all: Vec<(u32, u64)> = weights.iter().enumerate().map(|(i, w)| (*w, i as u64 + 1)).collect();
            all.sort_by(|a, b| b.cmp(a));
            let want: Vec<u64> = all.into_iter().take(cap).map(|(_, id)| id).collect();
            prop_assert_eq!(got, want);
        }
    }
}
