use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use roaring::RoaringBitmap;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::schema::AttrLocator;
use crate::sorter::comparator::ComparatorState;
use crate::sorter::{GroupStats, Match, MatchSorter};

/// How the group-by attribute value becomes a group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupFunc {
    /// `YYYYMMDD` of a timestamp, UTC
    Day,
    /// `YYYYWW`, ISO week
    Week,
    /// `YYYYMM`
    Month,
    Year,
    /// Raw attribute value
    Attr,
    /// Attribute value in the high half, the next attribute in the low half
    AttrPair,
}

fn date_of(ts: u32) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts as i64, 0).map(|dt| dt.date_naive())
}

impl GroupFunc {
    pub fn is_time(&self) -> bool {
        matches!(self, GroupFunc::Day | GroupFunc::Week | GroupFunc::Month | GroupFunc::Year)
    }

    pub fn key(&self, value: u32, pair: u32) -> u64 {
        match self {
            GroupFunc::Attr => value as u64,
            GroupFunc::AttrPair => ((value as u64) << 32) | pair as u64,
            time => {
                let Some(date) = date_of(value) else {
                    return 0;
                };
                let (y, m, d) = (date.year() as u64, date.month() as u64, date.day() as u64);
                match time {
                    GroupFunc::Day => y * 10000 + m * 100 + d,
                    GroupFunc::Week => {
                        let week = date.iso_week();
                        week.year() as u64 * 100 + week.week() as u64
                    }
                    GroupFunc::Month => y * 100 + m,
                    _ => y,
                }
            }
        }
    }
}

/// Groups held before the queue is cut, per requested match.
const GROUP_SLACK: usize = 4;
const MIN_GROUP_LIMIT: usize = 1024;

struct GroupEntry {
    best: Match,
    count: u32,
    distinct: RoaringBitmap,
    // distinct counts folded in from already grouped matches
    merged_distinct: u32,
}

impl GroupEntry {
    fn stats(&self, key: u64) -> GroupStats {
        GroupStats {
            key,
            count: self.count,
            distinct: self.distinct.len() as u32 + self.merged_distinct,
        }
    }
}

/// Group-by queue.
///
/// Every group keeps its best match under the match state and an exact
/// count. With a distinct attribute, each group also tracks the set of
/// values seen; the sets are only released when the queue is flattened.
/// Groups are ordered by the separate group state and cut to
/// `max_matches` at flatten time.
///
/// The map holds at most `GROUP_SLACK * max_matches` groups (and never
/// fewer than `MIN_GROUP_LIMIT`). Past that it is cut back to the best
/// `max_matches` groups, so a group dropped by a cut and seen again
/// restarts its count and distinct set from zero.
pub struct GroupSorter {
    state: ComparatorState,
    group_state: ComparatorState,
    max_matches: usize,
    func: GroupFunc,
    attr: AttrLocator,
    pair: Option<AttrLocator>,
    distinct: Option<AttrLocator>,
    groups: HashMap<u64, GroupEntry>,
    group_limit: usize,
    seen: HashSet<DocId>,
    total: u64,
}

impl GroupSorter {
    pub fn new(func: GroupFunc, attr: AttrLocator, max_matches: usize) -> Self {
        GroupSorter {
            state: ComparatorState::relevance(),
            group_state: ComparatorState::new(0),
            max_matches,
            func,
            attr,
            pair: None,
            distinct: None,
            groups: HashMap::new(),
            group_limit: max_matches.saturating_mul(GROUP_SLACK).max(MIN_GROUP_LIMIT),
            seen: HashSet::new(),
            total: 0,
        }
    }

    pub fn with_pair(mut self, pair: AttrLocator) -> Self {
        self.pair = Some(pair);
        self
    }

    pub fn with_distinct(mut self, attr: AttrLocator) -> Self {
        self.distinct = Some(attr);
        self
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn frozen(&self) -> Result<()> {
        if self.total > 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "sort state cannot change after matches were pushed".to_string(),
            ));
        }
        Ok(())
    }

    /// Keeps the best `max_matches` groups under the group state.
    fn cut(&mut self) {
        let mut entries: Vec<(u64, GroupEntry)> = self
            .groups
            .drain()
            .map(|(key, mut entry)| {
                entry.best.group = Some(entry.stats(key));
                (key, entry)
            })
            .collect();
        entries.sort_by(|a, b| self.group_state.compare(&a.1.best, &b.1.best));
        entries.truncate(self.max_matches);
        self.groups.extend(entries);
    }

    fn add(&mut self, key: u64, m: Match, count: u32, distinct: Option<u32>, merged_distinct: u32) {
        match self.groups.get_mut(&key) {
            Some(entry) => {
                entry.count += count;
                entry.merged_distinct += merged_distinct;
                if let Some(value) = distinct {
                    entry.distinct.insert(value);
                }
                if self.state.compare(&m, &entry.best) == Ordering::Less {
                    entry.best = m;
                }
            }
            None => {
                let mut set = RoaringBitmap::new();
                if let Some(value) = distinct {
                    set.insert(value);
                }
                if self.groups.len() >= self.group_limit {
                    self.cut();
                }
                self.groups.insert(key, GroupEntry { best: m, count, distinct: set, merged_distinct });
            }
        }
    }
}

impl MatchSorter for GroupSorter {
    fn uses_attrs(&self) -> bool {
        true
    }

    fn set_state(&mut self, state: ComparatorState) -> Result<()> {
        self.frozen()?;
        self.state = state;
        Ok(())
    }

    fn set_group_state(&mut self, state: ComparatorState) -> Result<()> {
        self.frozen()?;
        self.group_state = state;
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
        let pair = self.pair.map_or(0, |p| m.row.get(&p));
        let key = self.func.key(m.row.get(&self.attr), pair);
        let distinct = self.distinct.map(|d| m.row.get(&d));
        self.add(key, m, 1, distinct, 0);
        true
    }

    /// Folds a match that already carries group totals, as produced by
    /// flattening another group queue. Distinct counts are summed. A
    /// representative whose document was already pushed is rejected.
    fn push_grouped(&mut self, mut m: Match) -> bool {
        let Some(stats) = m.group.take() else {
            return self.push(m);
        };
        if !self.seen.insert(m.doc_id) {
            return false;
        }
        self.total += stats.count as u64;
        if self.max_matches == 0 {
            return true;
        }
        self.add(stats.key, m, stats.count, None, stats.distinct);
        true
    }

    fn length(&self) -> usize {
        self.groups.len().min(self.max_matches)
    }

    fn total_pushed(&self) -> u64 {
        self.total
    }

    fn flatten(&mut self, tag: Option<u32>) -> Vec<Match> {
        let mut matches: Vec<Match> = self
            .groups
            .drain()
            .map(|(key, entry)| {
                let stats = entry.stats(key);
                let mut m = entry.best;
                m.group = Some(stats);
                m
            })
            .collect();
        matches.sort_by(|a, b| self.group_state.compare(a, b));
        matches.truncate(self.max_matches);
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
    use crate::schema::{AttrSource, AttrType, Row, Schema};
    use crate::sorter::comparator::{SortKey, SortOrder};

    const DAY: u32 = 86_400;

    fn schema() -> Schema {
        let mut schema = Schema::new("g");
        schema.add_attr("ts", AttrType::Timestamp, AttrSource::None).unwrap();
        schema.add_attr("author", AttrType::Integer { bits: 16 }, AttrSource::None).unwrap();
        schema
    }

    fn m(schema: &Schema, id: u64, weight: u32, ts: u32, author: u32) -> Match {
        let mut row = Row::new(schema.row_size());
        row.set(&schema.attr(0).locator, ts).unwrap();
        row.set(&schema.attr(1).locator, author).unwrap();
        Match::new(DocId(id), weight, row)
    }

    #[test]
    fn time_keys() {
        // 2024-03-05 12:00:00 UTC
        let ts = 1_709_640_000;
        assert_eq!(GroupFunc::Day.key(ts, 0), 20240305);
        assert_eq!(GroupFunc::Month.key(ts, 0), 202403);
        assert_eq!(GroupFunc::Year.key(ts, 0), 2024);
        assert_eq!(GroupFunc::Week.key(ts, 0), 202410);
        assert_eq!(GroupFunc::AttrPair.key(1, 2), (1 << 32) | 2);
    }

    #[test]
    fn groups_by_day_with_count_and_best_representative() {
        let s = schema();
        let mut sorter = GroupSorter::new(GroupFunc::Day, s.attr(0).locator, 10);
        sorter
            .set_group_state(ComparatorState::new(0).with_key(SortKey::Group, SortOrder::Desc).unwrap())
            .unwrap();
        let day = 19_000 * DAY;
        assert!(sorter.push(m(&s, 1, 3, day + 10, 1)));
        assert!(sorter.push(m(&s, 2, 8, day + 500, 1)));
        assert!(sorter.push(m(&s, 3, 1, day + DAY, 2)));
        assert!(!sorter.push(m(&s, 2, 99, day, 1)));
        assert_eq!(sorter.length(), 2);
        assert_eq!(sorter.total_pushed(), 3);

        let out = sorter.flatten(None);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].doc_id, DocId(3));
        assert_eq!(out[1].doc_id, DocId(2));
        assert_eq!(out[1].group.unwrap().count, 2);
    }

    #[test]
    fn counts_distinct_values_per_group() {
        let s = schema();
        let mut sorter = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10).with_distinct(s.attr(0).locator);
        sorter.push(m(&s, 1, 1, 100, 7));
        sorter.push(m(&s, 2, 1, 100, 7));
        sorter.push(m(&s, 3, 1, 200, 7));
        let out = sorter.flatten(Some(1));
        let stats = out[0].group.unwrap();
        assert_eq!((stats.key, stats.count, stats.distinct), (7, 3, 2));
        assert_eq!(out[0].tag, Some(1));
    }

    #[test]
    fn grouped_matches_fold_their_totals() {
        let s = schema();
        let mut first = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        first.push(m(&s, 1, 1, 0, 4));
        first.push(m(&s, 2, 1, 0, 4));
        let mut second = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        second.push(m(&s, 9, 5, 0, 4));

        let mut merged = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        for g in first.flatten(None).into_iter().chain(second.flatten(None)) {
            merged.push_grouped(g);
        }
        let out = merged.flatten(None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].group.unwrap().count, 3);
        assert_eq!(out[0].doc_id, DocId(9));
    }

    #[test]
    fn grouped_representatives_are_deduplicated() {
        let s = schema();
        let mut a = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        a.push(m(&s, 5, 1, 0, 1));
        let mut b = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        b.push(m(&s, 5, 1, 0, 2));

        let mut merged = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 10);
        assert!(merged.push_grouped(b.flatten(Some(1)).remove(0)));
        assert!(!merged.push_grouped(a.flatten(Some(0)).remove(0)));
        let out = merged.flatten(None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].group.unwrap().key, 2);
        assert_eq!(merged.total_pushed(), 1);
    }

    #[test]
    fn group_map_is_cut_to_the_best_groups() {
        let s = schema();
        let mut sorter = GroupSorter::new(GroupFunc::Attr, s.attr(1).locator, 3);
        sorter
            .set_group_state(ComparatorState::new(0).with_key(SortKey::Group, SortOrder::Desc).unwrap())
            .unwrap();
        for id in 1..=3000u64 {
            sorter.push(m(&s, id, 1, 0, id as u32));
        }
        assert!(sorter.group_count() <= MIN_GROUP_LIMIT);
        let out = sorter.flatten(None);
        let keys: Vec<u64> = out.iter().map(|g| g.group.unwrap().key).collect();
        assert_eq!(keys, vec![3000, 2999, 2998]);
        assert_eq!(out[0].group.unwrap().count, 1);
    }
}
