pub mod comparator;
pub mod geo;
pub mod group;
pub mod plain;

pub use comparator::{ComparatorState, SortKey, SortOrder, MAX_SORT_KEYS};
pub use geo::GeoLocator;
pub use group::{GroupFunc, GroupSorter};
pub use plain::PlainSorter;

use chrono::Utc;
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::schema::{AttrType, Row, Schema};
use crate::search::query::{Query, SortMode};
use comparator::{attr_key, parse_sort_clause};

/// Totals attached to a group representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupStats {
    pub key: u64,
    pub count: u32,
    pub distinct: u32,
}

/// One matched document as seen by the sorters.
#[derive(Debug, Clone)]
pub struct Match {
    pub doc_id: DocId,
    pub weight: u32,
    pub row: Row,
    /// Meters from the query's geo anchor; 0 without an anchor
    pub geodist: f32,
    /// Source index of the match once flattened with a tag
    pub tag: Option<u32>,
    pub group: Option<GroupStats>,
}

impl Match {
    pub fn new(doc_id: DocId, weight: u32, row: Row) -> Self {
        Match {
            doc_id,
            weight,
            row,
            geodist: 0.0,
            tag: None,
            group: None,
        }
    }
}

// Matches are the same match when they name the same document.
impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id == other.doc_id
    }
}

impl Eq for Match {}

/// Common interface of the match queues.
///
/// A sorter is owned by a single worker; none of the methods lock.
pub trait MatchSorter: Send {
    /// Whether comparisons read attribute rows
    fn uses_attrs(&self) -> bool;

    /// Replaces the match comparator. Fails once matches were pushed.
    fn set_state(&mut self, state: ComparatorState) -> Result<()>;

    fn set_group_state(&mut self, _state: ComparatorState) -> Result<()> {
        Ok(())
    }

    /// Returns false if a match for the same document was already pushed;
    /// true otherwise, even if the match did not make the cut.
    fn push(&mut self, m: Match) -> bool;

    /// Pushes a match flattened from another queue of the same kind.
    fn push_grouped(&mut self, m: Match) -> bool {
        self.push(m)
    }

    fn length(&self) -> usize;

    /// Non-duplicate matches pushed so far
    fn total_pushed(&self) -> u64;

    /// Drains the queue in final order, tagging every match when `tag` is set.
    fn flatten(&mut self, tag: Option<u32>) -> Vec<Match>;
}

fn now_ts() -> u32 {
    Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Match comparator for the query's sort mode.
pub fn match_state(query: &Query, schema: &Schema) -> Result<ComparatorState> {
    use SortOrder::{Asc, Desc};
    let now = query.now.unwrap_or_else(now_ts);
    let sort_attr = || {
        if query.sort_by.is_empty() {
            return Err(Error::query(format!("sort mode {:?} needs a sort-by attribute", query.sort_mode)));
        }
        attr_key(schema, &query.sort_by)
    };
    let state = ComparatorState::new(now);
    match query.sort_mode {
        SortMode::Relevance => {
            let state = state.with_key(SortKey::Weight, Desc)?;
            if query.sort_by.is_empty() {
                Ok(state)
            } else {
                state.with_key(attr_key(schema, &query.sort_by)?, Desc)
            }
        }
        SortMode::AttrDesc => state.with_key(sort_attr()?, Desc)?.with_key(SortKey::Weight, Desc),
        SortMode::AttrAsc => state.with_key(sort_attr()?, Asc)?.with_key(SortKey::Weight, Desc),
        SortMode::TimeSegments => {
            let SortKey::Attr(loc) = sort_attr()? else {
                return Err(Error::query(format!(
                    "time segments need an integer or timestamp attribute, got '{}'",
                    query.sort_by
                )));
            };
            state
                .with_key(SortKey::TimeSegment(loc), Asc)?
                .with_key(SortKey::Weight, Desc)?
                .with_key(SortKey::Attr(loc), Desc)
        }
        SortMode::Extended => parse_sort_clause(&query.sort_by, schema, now),
    }
}

/// Builds the queue a query asks for: a group-by queue when the query
/// groups, a plain top-N queue otherwise.
pub fn create_sorter(query: &Query, schema: &Schema) -> Result<Box<dyn MatchSorter>> {
    let state = match_state(query, schema)?;
    let Some(group_by) = &query.group_by else {
        return Ok(Box::new(PlainSorter::new(query.max_matches, state)));
    };

    let index = schema
        .attr_index(&group_by.attr)
        .ok_or_else(|| Error::query(format!("group-by attribute '{}' not found", group_by.attr)))?;
    let attr = schema.attr(index);
    if matches!(attr.attr_type, AttrType::Multi | AttrType::Float) {
        return Err(Error::query(format!(
            "cannot group by {:?} attribute '{}'",
            attr.attr_type, group_by.attr
        )));
    }
    let mut sorter = GroupSorter::new(group_by.func, attr.locator, query.max_matches);
    if group_by.func == GroupFunc::AttrPair {
        let pair = schema
            .attrs()
            .get(index + 1)
            .filter(|a| !matches!(a.attr_type, AttrType::Multi | AttrType::Float))
            .ok_or_else(|| {
                Error::query(format!("group-by pair needs an integer attribute after '{}'", group_by.attr))
            })?;
        sorter = sorter.with_pair(pair.locator);
    }
    if let Some(name) = &group_by.distinct {
        let distinct = schema.require_attr(name)?;
        if matches!(distinct.attr_type, AttrType::Multi | AttrType::Float) {
            return Err(Error::query(format!("cannot count distinct values of '{}'", name)));
        }
        sorter = sorter.with_distinct(distinct.locator);
    }
    sorter.set_state(state.clone())?;
    sorter.set_group_state(parse_sort_clause(&group_by.sort, schema, state.now())?)?;
    Ok(Box::new(sorter))
}
