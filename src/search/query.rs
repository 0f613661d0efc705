use std::time::Duration;
use serde::{Serialize, Deserialize};
use crate::core::error::Error;
use crate::sorter::{GroupFunc, Match};

pub const DEFAULT_MAX_MATCHES: usize = 1000;
pub const DEFAULT_LIMIT: usize = 20;

/// How query words must occur in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every word
    #[default]
    All,
    /// At least one word
    Any,
    /// Every word, consecutively and in query order
    Phrase,
    /// `&`, `|`, `-`/`!` and parentheses over words
    Boolean,
    /// Boolean operators plus `"phrases"`, `"proximity"~N` and `@field` limits
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Weight descending, then `sort_by` descending when set
    #[default]
    Relevance,
    AttrDesc,
    AttrAsc,
    /// Recency bucket of `sort_by`, then weight, then `sort_by` descending
    TimeSegments,
    /// `sort_by` holds a clause such as `"@weight desc, price asc"`
    Extended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterValues {
    Values(Vec<u64>),
    Range { min: u64, max: u64 },
    FloatRange { min: f32, max: f32 },
}

/// Attribute filter. `@id` filters on the document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub attr: String,
    pub values: FilterValues,
    #[serde(default)]
    pub exclude: bool,
}

impl Filter {
    pub fn values(attr: &str, values: Vec<u64>) -> Self {
        Filter {
            attr: attr.to_string(),
            values: FilterValues::Values(values),
            exclude: false,
        }
    }

    pub fn range(attr: &str, min: u64, max: u64) -> Self {
        Filter {
            attr: attr.to_string(),
            values: FilterValues::Range { min, max },
            exclude: false,
        }
    }

    pub fn float_range(attr: &str, min: f32, max: f32) -> Self {
        Filter {
            attr: attr.to_string(),
            values: FilterValues::FloatRange { min, max },
            exclude: false,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.exclude = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBy {
    pub attr: String,
    pub func: GroupFunc,
    /// Group order clause
    pub sort: String,
    /// Attribute whose distinct values are counted per group
    pub distinct: Option<String>,
}

impl GroupBy {
    pub fn new(attr: &str, func: GroupFunc) -> Self {
        GroupBy {
            attr: attr.to_string(),
            func,
            sort: "@group desc".to_string(),
            distinct: None,
        }
    }

    pub fn with_sort(mut self, clause: &str) -> Self {
        self.sort = clause.to_string();
        self
    }

    pub fn with_distinct(mut self, attr: &str) -> Self {
        self.distinct = Some(attr.to_string());
        self
    }
}

/// Anchor point for `@geodist`, in radians, plus the float attributes
/// holding each document's latitude and longitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAnchor {
    pub lat_attr: String,
    pub long_attr: String,
    pub lat: f32,
    pub long: f32,
}

impl GeoAnchor {
    pub fn new(lat_attr: &str, long_attr: &str, lat: f32, long: f32) -> Self {
        GeoAnchor {
            lat_attr: lat_attr.to_string(),
            long_attr: long_attr.to_string(),
            lat,
            long,
        }
    }
}

/// Search request against one or more indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub text: String,
    pub mode: MatchMode,
    pub sort_mode: SortMode,
    pub sort_by: String,
    pub filters: Vec<Filter>,
    pub group_by: Option<GroupBy>,
    pub geo_anchor: Option<GeoAnchor>,
    pub offset: usize,
    pub limit: usize,
    pub max_matches: usize,
    /// Stop after this many matches; 0 searches everything
    pub cutoff: usize,
    /// Per-field weights by field name; unnamed fields weigh 1
    pub field_weights: Vec<(String, u32)>,
    pub min_id: u64,
    pub max_id: u64,
    /// Reference time for time segments; the wall clock when unset
    pub now: Option<u32>,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            text: String::new(),
            mode: MatchMode::All,
            sort_mode: SortMode::Relevance,
            sort_by: String::new(),
            filters: Vec::new(),
            group_by: None,
            geo_anchor: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
            max_matches: DEFAULT_MAX_MATCHES,
            cutoff: 0,
            field_weights: Vec::new(),
            min_id: 0,
            max_id: u64::MAX,
            now: None,
        }
    }
}

impl Query {
    pub fn new(text: &str) -> Self {
        Query {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sort(mut self, mode: SortMode, sort_by: &str) -> Self {
        self.sort_mode = mode;
        self.sort_by = sort_by.to_string();
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn with_geo_anchor(mut self, anchor: GeoAnchor) -> Self {
        self.geo_anchor = Some(anchor);
        self
    }

    pub fn with_limits(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }

    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_field_weight(mut self, field: &str, weight: u32) -> Self {
        self.field_weights.push((field.to_string(), weight));
        self
    }

    pub fn with_id_range(mut self, min_id: u64, max_id: u64) -> Self {
        self.min_id = min_id;
        self.max_id = max_id;
        self
    }

    pub fn with_now(mut self, now: u32) -> Self {
        self.now = Some(now);
        self
    }
}

/// Per-word statistics of a query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WordStat {
    pub word: String,
    pub docs: u64,
    pub hits: u64,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// The requested window of the sorted matches
    pub matches: Vec<Match>,
    /// Matches found before offset and limit were applied
    pub total: u64,
    pub word_stats: Vec<WordStat>,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn failed(err: &Error) -> Self {
        QueryResult {
            error: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn add_warning(&mut self, message: String) {
        match &mut self.warning {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&message);
            }
            None => self.warning = Some(message),
        }
    }

    /// Keeps `limit` matches starting at `offset`.
    pub(crate) fn set_window(&mut self, matches: Vec<Match>, offset: usize, limit: usize) {
        self.matches = matches.into_iter().skip(offset).take(limit).collect();
    }
}
