use std::collections::{HashMap, VecDeque};
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::source::{Document, DocumentProvider};

/// Provider over documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    docs: VecDeque<Document>,
    multi: HashMap<String, Vec<(DocId, u32)>>,
}

impl MemoryProvider {
    pub fn new(docs: Vec<Document>) -> Self {
        MemoryProvider {
            docs: docs.into(),
            multi: HashMap::new(),
        }
    }

    /// Registers values of a query-sourced multi-valued attribute.
    pub fn with_multi_values(mut self, attr: &str, values: Vec<(DocId, u32)>) -> Self {
        self.multi.insert(attr.to_string(), values);
        self
    }
}

impl DocumentProvider for MemoryProvider {
    fn next_document(&mut self) -> Result<Option<Document>> {
        Ok(self.docs.pop_front())
    }

    fn multi_values(&mut self, attr: &str) -> Result<Vec<(DocId, u32)>> {
        Ok(self.multi.remove(attr).unwrap_or_default())
    }
}
