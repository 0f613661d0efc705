pub mod document;
pub mod memory;

use crate::core::error::Result;
use crate::core::stats::SourceStats;
use crate::core::types::{DocId, WordHit};
use crate::schema::{Row, Schema};

pub use document::{DocumentSource, InfixMode};
pub use memory::MemoryProvider;

/// Attribute value as delivered by a provider
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Uint(u32),
    Timestamp(u32),
    Bool(bool),
    Float(f32),
    Multi(Vec<u32>),
}

/// Raw document handed over by a provider
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub id: DocId,
    pub fields: Vec<(String, String)>,
    pub attrs: Vec<(String, AttrValue)>,
}

impl Document {
    pub fn new(id: u64) -> Self {
        Document {
            id: DocId(id),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: &str, text: &str) -> Self {
        self.fields.push((name.to_string(), text.to_string()));
        self
    }

    pub fn attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.push((name.to_string(), value));
        self
    }
}

/// One document's worth of pipeline output.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHits {
    pub doc_id: DocId,
    pub row: Row,
    /// Field-sourced multi-valued attributes: (attr index, values)
    pub mva: Vec<(usize, Vec<u32>)>,
    /// Hits in field-then-position order
    pub hits: Vec<WordHit>,
}

/// Supplies raw documents to a [`DocumentSource`]. Concrete connectors
/// (SQL, XML, ...) implement this.
pub trait DocumentProvider: Send {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    /// Next document, `None` once exhausted.
    fn next_document(&mut self) -> Result<Option<Document>>;

    /// (doc id, value) pairs of a query-sourced multi-valued attribute.
    fn multi_values(&mut self, _attr: &str) -> Result<Vec<(DocId, u32)>> {
        Ok(Vec::new())
    }

    fn post_index(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capability consumed by the index builder. Called in order: connect,
/// hits start, hits next until `None`, multi-valued iteration per
/// query-sourced attribute, post index.
pub trait Source: Send {
    fn schema(&self) -> &Schema;

    fn stats(&self) -> &SourceStats;

    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self);

    fn has_attrs_configured(&self) -> bool;

    fn iterate_hits_start(&mut self) -> Result<()>;

    fn iterate_hits_next(&mut self) -> Result<Option<DocumentHits>>;

    fn iterate_multivalued_start(&mut self, attr: usize) -> Result<()>;

    fn iterate_multivalued_next(&mut self) -> Result<Option<(DocId, u32)>>;

    fn post_index(&mut self) -> Result<()>;

    /// Non-fatal anomalies met since the last call, already logged.
    fn take_warnings(&mut self) -> Vec<String> {
        Vec::new()
    }
}
