use std::collections::HashMap;
use crate::core::types::{HitPos, MAX_FIELDS};
use crate::search::query::MatchMode;

/// One occurrence of a query word in a matched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueryHit {
    pub pos: HitPos,
    /// Position of the word in the query
    pub qpos: u32,
    /// Index of the distinct query word
    pub word: usize,
}

/// Per field, the longest run of hits that are consecutive both in the
/// document and in the query.
pub(crate) fn field_lcs(hits: &mut [QueryHit]) -> [u32; MAX_FIELDS] {
    hits.sort_unstable_by_key(|h| (h.pos, h.qpos));
    let mut runs: HashMap<(u32, u32), u32> = HashMap::with_capacity(hits.len());
    let mut lcs = [0u32; MAX_FIELDS];
    for hit in hits.iter() {
        let prev = if hit.pos.pos() > 1 && hit.qpos > 0 {
            runs.get(&(hit.pos.0 - 1, hit.qpos - 1)).copied().unwrap_or(0)
        } else {
            0
        };
        let run = prev + 1;
        runs.insert((hit.pos.0, hit.qpos), run);
        let field = hit.pos.field();
        if field < MAX_FIELDS {
            lcs[field] = lcs[field].max(run);
        }
    }
    lcs
}

/// Turns a document's query hits into a weight.
///
/// Phrase-style modes score the per-field proximity (LCS) times the
/// field weight. ANY additionally rewards the number of distinct words
/// per field, scaled so that proximity dominates. Boolean matches all
/// weigh 1.
#[derive(Debug, Clone)]
pub(crate) struct Ranker {
    mode: MatchMode,
    field_weights: Vec<u32>,
    words: u32,
}

impl Ranker {
    pub(crate) fn new(mode: MatchMode, field_weights: Vec<u32>, words: usize) -> Self {
        Ranker {
            mode,
            field_weights,
            words: words as u32,
        }
    }

    fn field_weight(&self, field: usize) -> u32 {
        self.field_weights.get(field).copied().unwrap_or(1)
    }

    pub(crate) fn weight(&self, hits: &mut [QueryHit]) -> u32 {
        if self.mode == MatchMode::Boolean {
            return 1;
        }
        let mut present = [0u32; MAX_FIELDS];
        for hit in hits.iter() {
            if hit.pos.field() < MAX_FIELDS && hit.word < 32 {
                present[hit.pos.field()] |= 1 << hit.word;
            }
        }
        let lcs = field_lcs(hits);
        let mut weight = 0u32;
        for field in 0..MAX_FIELDS {
            if lcs[field] == 0 {
                continue;
            }
            let score = match self.mode {
                MatchMode::Any => lcs[field]
                    .saturating_mul(self.words)
                    .saturating_add(present[field].count_ones()),
                _ => lcs[field],
            };
            weight = weight.saturating_add(score.saturating_mul(self.field_weight(field)));
        }
        weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(field: usize, pos: u32, qpos: u32, word: usize) -> QueryHit {
        QueryHit { pos: HitPos::new(field, pos), qpos, word }
    }

    #[test]
    fn lcs_counts_consecutive_query_order() {
        // doc: "a b x a b c", query: "a b c"
        let mut hits = vec![
            hit(0, 1, 0, 0),
            hit(0, 2, 1, 1),
            hit(0, 4, 0, 0),
            hit(0, 5, 1, 1),
            hit(0, 6, 2, 2),
            hit(1, 3, 2, 2),
        ];
        let lcs = field_lcs(&mut hits);
        assert_eq!(lcs[0], 3);
        assert_eq!(lcs[1], 1);
        assert_eq!(lcs[2], 0);
    }

    #[test]
    fn out_of_order_words_do_not_chain() {
        let mut hits = vec![hit(0, 1, 1, 1), hit(0, 2, 0, 0)];
        assert_eq!(field_lcs(&mut hits)[0], 1);
    }

    #[test]
    fn weights_per_mode() {
        let hits = vec![hit(0, 1, 0, 0), hit(0, 2, 1, 1), hit(1, 7, 1, 1)];
        let all = Ranker::new(MatchMode::All, vec![1, 10], 2);
        assert_eq!(all.weight(&mut hits.clone()), 2 + 10);
        let any = Ranker::new(MatchMode::Any, vec![1, 1], 2);
        assert_eq!(any.weight(&mut hits.clone()), (2 * 2 + 2) + (2 + 1));
        let boolean = Ranker::new(MatchMode::Boolean, vec![], 2);
        assert_eq!(boolean.weight(&mut hits.clone()), 1);
    }
}
