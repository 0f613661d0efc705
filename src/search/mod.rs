pub mod executor;
pub mod federated;
pub(crate) mod filter;
pub mod parser;
pub mod query;
pub(crate) mod ranker;

pub use federated::search_federated;
pub use parser::{parse_query, QueryNode};
pub use query::{Filter, FilterValues, GeoAnchor, GroupBy, MatchMode, Query, QueryResult, SortMode, WordStat};
