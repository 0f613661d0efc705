use std::cmp::Ordering;
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{all_consuming, opt, recognize, value};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};
use crate::schema::{AttrLocator, AttrType, Schema};
use crate::sorter::Match;

/// Most keys a single sort clause may name.
pub const MAX_SORT_KEYS: usize = 5;

const HOUR: u32 = 3600;
const DAY: u32 = 24 * HOUR;
const WEEK: u32 = 7 * DAY;
const MONTH: u32 = 30 * DAY;
const QUARTER: u32 = 90 * DAY;

/// One sort column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortKey {
    Weight,
    Id,
    Attr(AttrLocator),
    Float(AttrLocator),
    /// Age bucket of a timestamp attribute, see [`time_segment`]
    TimeSegment(AttrLocator),
    Geodist,
    Group,
    Count,
    Distinct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Age bucket of `ts` relative to `now`: 0 for the last hour, then day,
/// week, month, three months, and 5 for anything older.
pub fn time_segment(ts: u32, now: u32) -> u32 {
    let age = now.saturating_sub(ts);
    match age {
        a if a < HOUR => 0,
        a if a < DAY => 1,
        a if a < WEEK => 2,
        a if a < MONTH => 3,
        a if a < QUARTER => 4,
        _ => 5,
    }
}

/// Ordered sort keys plus the reference time for time segments.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparatorState {
    keys: Vec<(SortKey, SortOrder)>,
    now: u32,
}

impl Default for ComparatorState {
    fn default() -> Self {
        Self::relevance()
    }
}

impl ComparatorState {
    pub fn new(now: u32) -> Self {
        ComparatorState { keys: Vec::new(), now }
    }

    /// Weight descending.
    pub fn relevance() -> Self {
        ComparatorState {
            keys: vec![(SortKey::Weight, SortOrder::Desc)],
            now: 0,
        }
    }

    pub fn add_key(&mut self, key: SortKey, order: SortOrder) -> Result<()> {
        if self.keys.len() >= MAX_SORT_KEYS {
            return Err(Error::query(format!("too many sort keys (max {})", MAX_SORT_KEYS)));
        }
        self.keys.push((key, order));
        Ok(())
    }

    pub fn with_key(mut self, key: SortKey, order: SortOrder) -> Result<Self> {
        self.add_key(key, order)?;
        Ok(self)
    }

    pub fn keys(&self) -> &[(SortKey, SortOrder)] {
        &self.keys
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    pub fn set_now(&mut self, now: u32) {
        self.now = now;
    }

    pub fn uses_attrs(&self) -> bool {
        self.keys.iter().any(|(k, _)| {
            matches!(k, SortKey::Attr(_) | SortKey::Float(_) | SortKey::TimeSegment(_))
        })
    }

    /// True if any key reads a packed bit-field rather than a whole row word.
    pub fn uses_bitfields(&self) -> bool {
        self.keys.iter().any(|(k, _)| match k {
            SortKey::Attr(loc) | SortKey::Float(loc) | SortKey::TimeSegment(loc) => !loc.is_whole_word(),
            _ => false,
        })
    }

    /// `Less` when `a` ranks ahead of `b`. When every key ties, the
    /// higher document id ranks first.
    pub fn compare(&self, a: &Match, b: &Match) -> Ordering {
        for (key, order) in &self.keys {
            let ord = match key {
                SortKey::Float(loc) => a.row.get_float(loc).total_cmp(&b.row.get_float(loc)),
                SortKey::Geodist => a.geodist.total_cmp(&b.geodist),
                _ => self.value(key, a).cmp(&self.value(key, b)),
            };
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        b.doc_id.cmp(&a.doc_id)
    }

    fn value(&self, key: &SortKey, m: &Match) -> u64 {
        match key {
            SortKey::Weight => m.weight as u64,
            SortKey::Id => m.doc_id.0,
            SortKey::Attr(loc) => m.row.get(loc) as u64,
            SortKey::TimeSegment(loc) => time_segment(m.row.get(loc), self.now) as u64,
            SortKey::Group => m.group.map_or(0, |g| g.key),
            SortKey::Count => m.group.map_or(0, |g| g.count as u64),
            SortKey::Distinct => m.group.map_or(0, |g| g.distinct as u64),
            SortKey::Float(_) | SortKey::Geodist => 0,
        }
    }
}

/// Sort key reading a plain attribute by name.
pub fn attr_key(schema: &Schema, name: &str) -> Result<SortKey> {
    let attr = schema
        .find_attr(name)
        .ok_or_else(|| Error::query(format!("sort-by attribute '{}' not found", name)))?;
    match attr.attr_type {
        AttrType::Multi => Err(Error::query(format!(
            "cannot sort by multi-valued attribute '{}'",
            name
        ))),
        AttrType::Float => Ok(SortKey::Float(attr.locator)),
        AttrType::Integer { .. } | AttrType::Timestamp | AttrType::Bool => Ok(SortKey::Attr(attr.locator)),
    }
}

fn column(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('@')),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn order(input: &str) -> IResult<&str, SortOrder> {
    alt((
        value(SortOrder::Desc, tag_no_case("desc")),
        value(SortOrder::Asc, tag_no_case("asc")),
    ))
    .parse(input)
}

fn clause(input: &str) -> IResult<&str, Vec<(&str, Option<SortOrder>)>> {
    all_consuming(delimited(
        multispace0,
        separated_list1(
            delimited(multispace0, char(','), multispace0),
            (column, opt(preceded(multispace1, order))),
        ),
        multispace0,
    ))
    .parse(input)
}

/// Parses `"@weight desc, price asc, @id desc"` style clauses.
///
/// Columns are attribute names or one of `@id`, `@weight` (aliases
/// `@relevance`, `@rank`), `@geodist`, `@group`, `@count`, `@distinct`.
/// A column without an explicit order sorts ascending.
pub fn parse_sort_clause(text: &str, schema: &Schema, now: u32) -> Result<ComparatorState> {
    let (_, items) = clause(text).map_err(|_| Error::query(format!("malformed sort clause '{}'", text)))?;
    let mut state = ComparatorState::new(now);
    for (name, order) in items {
        let key = match name.to_ascii_lowercase().as_str() {
            "@weight" | "@relevance" | "@rank" => SortKey::Weight,
            "@id" => SortKey::Id,
            "@geodist" => SortKey::Geodist,
            "@group" => SortKey::Group,
            "@count" => SortKey::Count,
            "@distinct" => SortKey::Distinct,
            other if other.starts_with('@') => {
                return Err(Error::query(format!("unknown sort column '{}'", name)));
            }
            _ => attr_key(schema, name)?,
        };
        state.add_key(key, order.unwrap_or(SortOrder::Asc))?;
    }
    Ok(state)
}
