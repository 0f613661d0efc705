pub mod row;
pub mod schema;

pub use row::Row;
pub use schema::{AttrDefinition, AttrLocator, AttrSource, AttrType, Schema, SchemaMatch};
