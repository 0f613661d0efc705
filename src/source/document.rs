use std::collections::VecDeque;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};
use crate::analysis::{Tokenizer, TokenizerSettings};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::SourceStats;
use crate::core::types::{DocId, HitPos, WordHit};
use crate::dict::Dictionary;
use crate::schema::{AttrSource, AttrType, Row, Schema};
use crate::source::{AttrValue, Document, DocumentHits, DocumentProvider, Source};

/// Extra substring hits emitted next to every word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfixMode {
    None,
    Prefixes,
    Infixes,
}

/// Turns provider documents into rows and word hits.
pub struct DocumentSource<P: DocumentProvider> {
    name: String,
    provider: P,
    tokenizer: Arc<TokenizerSettings>,
    dict: Arc<dyn Dictionary>,
    schema: Schema,
    attrs_configured: bool,
    schema_defined: bool,
    infix_mode: InfixMode,
    min_infix_len: usize,
    stats: SourceStats,
    connected: bool,
    multi_values: VecDeque<(DocId, u32)>,
    warnings: Vec<String>,
}

impl<P: DocumentProvider> DocumentSource<P> {
    pub fn new(name: &str, provider: P, tokenizer: &Tokenizer<'_>, dict: Arc<dyn Dictionary>) -> Self {
        DocumentSource {
            name: name.to_string(),
            provider,
            tokenizer: Arc::clone(tokenizer.settings()),
            dict,
            schema: Schema::new(name),
            attrs_configured: false,
            schema_defined: false,
            infix_mode: InfixMode::None,
            min_infix_len: 0,
            stats: SourceStats::default(),
            connected: false,
            multi_values: VecDeque::new(),
            warnings: Vec::new(),
        }
    }

    /// Declares the attribute layout up front instead of inferring it
    /// from the first document.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.attrs_configured = true;
        self.schema = schema;
        self
    }

    pub fn with_infixes(mut self, mode: InfixMode, min_len: usize) -> Self {
        self.infix_mode = mode;
        self.min_infix_len = min_len.max(1);
        self
    }

    fn define_schema(&mut self, doc: &Document) -> Result<()> {
        if !self.attrs_configured {
            for (name, value) in &doc.attrs {
                let (attr_type, source) = match value {
                    AttrValue::Uint(_) => (AttrType::integer(), AttrSource::None),
                    AttrValue::Timestamp(_) => (AttrType::Timestamp, AttrSource::None),
                    AttrValue::Bool(_) => (AttrType::Bool, AttrSource::None),
                    AttrValue::Float(_) => (AttrType::Float, AttrSource::None),
                    AttrValue::Multi(_) => (AttrType::Multi, AttrSource::Field),
                };
                self.schema.add_attr(name, attr_type, source)?;
            }
        }
        self.schema_defined = true;
        debug!(
            source = %self.name,
            fields = doc.fields.len(),
            attrs = self.schema.attrs().len(),
            "schema defined"
        );
        Ok(())
    }

    fn add_new_fields(&mut self, doc: &Document) -> Result<()> {
        for (name, _) in &doc.fields {
            if self.schema.field_index(name).is_none() {
                self.schema.add_field(name)?;
            }
        }
        Ok(())
    }

    /// Packs the document's attributes. Integers wider than their
    /// attribute saturate and are reported through `clamped`.
    fn build_row(&self, doc: &Document, clamped: &mut Vec<String>) -> Result<(Row, Vec<(usize, Vec<u32>)>)> {
        let mut row = Row::new(self.schema.row_size());
        let mut mva = Vec::new();
        for (name, value) in &doc.attrs {
            let index = self.schema.attr_index(name).ok_or_else(|| {
                Error::schema(format!(
                    "source '{}': document {} has attribute '{}' missing from the schema",
                    self.name, doc.id.0, name
                ))
            })?;
            let attr = self.schema.attr(index);
            let mismatch = || {
                Error::schema(format!(
                    "source '{}': document {} attribute '{}' is {:?}, schema says {:?}",
                    self.name, doc.id.0, name, value, attr.attr_type
                ))
            };
            match (value, attr.attr_type) {
                (AttrValue::Uint(v), AttrType::Integer { .. } | AttrType::Timestamp | AttrType::Bool)
                | (AttrValue::Timestamp(v), AttrType::Timestamp | AttrType::Integer { .. }) => {
                    let (value, cut) = attr.locator.saturate(*v);
                    if cut {
                        clamped.push(format!(
                            "source '{}': document {} attribute '{}' value {} clamped to {}",
                            self.name, doc.id.0, name, v, value
                        ));
                    }
                    row.set(&attr.locator, value)?;
                }
                (AttrValue::Bool(b), AttrType::Bool | AttrType::Integer { .. }) => {
                    row.set(&attr.locator, *b as u32)?;
                }
                (AttrValue::Float(f), AttrType::Float) => row.set_float(&attr.locator, *f)?,
                (AttrValue::Multi(values), AttrType::Multi) if attr.source == AttrSource::Field => {
                    let mut values = values.clone();
                    values.sort_unstable();
                    values.dedup();
                    mva.push((index, values));
                }
                _ => return Err(mismatch()),
            }
        }
        Ok((row, mva))
    }

    fn collect_hits(&self, doc: &Document) -> Vec<WordHit> {
        let mut tok = Tokenizer::with_settings(Arc::clone(&self.tokenizer));
        let mut hits = Vec::new();
        for (field, def) in self.schema.fields().iter().enumerate() {
            let Some((_, text)) = doc.fields.iter().find(|(name, _)| *name == def.name) else {
                continue;
            };
            tok.set_buffer(text.as_bytes(), true);
            let mut pos = 0u32;
            while let Some(token) = tok.next_token() {
                let mut word = token.to_vec();
                pos += 1;
                if pos > HitPos::max_in_field() {
                    break;
                }
                let hit_pos = HitPos::new(field, pos);
                if self.infix_mode != InfixMode::None {
                    self.emit_infixes(&word, tok.last_token_len(), doc.id, hit_pos, &mut hits);
                }
                if let Some(word_id) = self.dict.word_id(&mut word) {
                    hits.push(WordHit { word_id, doc_id: doc.id, pos: hit_pos });
                }
            }
        }
        hits
    }

    /// Prefix or infix hits at the word's own position. The whole word is
    /// left to the regular path so it can be stemmed.
    fn emit_infixes(&self, word: &[u8], len: usize, doc_id: DocId, pos: HitPos, hits: &mut Vec<WordHit>) {
        let min = self.min_infix_len;
        if len <= min {
            return;
        }
        let bounds: Vec<usize> = if len == word.len() {
            (0..=word.len()).collect()
        } else {
            word.iter()
                .enumerate()
                .filter(|(_, b)| (**b & 0xc0) != 0x80)
                .map(|(i, _)| i)
                .chain(std::iter::once(word.len()))
                .collect()
        };
        let n = bounds.len() - 1;
        let starts = match self.infix_mode {
            InfixMode::Prefixes => 0..1,
            _ => 0..n,
        };
        for s in starts {
            for e in s + min..=n {
                if s == 0 && e == n {
                    continue;
                }
                if let Some(word_id) = self.dict.word_id_raw(&word[bounds[s]..bounds[e]]) {
                    hits.push(WordHit { word_id, doc_id, pos });
                }
            }
        }
    }
}

impl<P: DocumentProvider> Source for DocumentSource<P> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn stats(&self) -> &SourceStats {
        &self.stats
    }

    fn connect(&mut self) -> Result<()> {
        self.provider.connect()?;
        self.connected = true;
        debug!(source = %self.name, "connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.provider.disconnect();
            self.connected = false;
        }
    }

    fn has_attrs_configured(&self) -> bool {
        self.attrs_configured
    }

    fn iterate_hits_start(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("source '{}' is not connected", self.name),
            ));
        }
        self.stats.reset();
        Ok(())
    }

    fn iterate_hits_next(&mut self) -> Result<Option<DocumentHits>> {
        loop {
            let Some(doc) = self.provider.next_document()? else {
                return Ok(None);
            };
            if !doc.id.is_valid() {
                warn!(source = %self.name, "skipping document with reserved id 0");
                continue;
            }
            if !self.schema_defined {
                self.define_schema(&doc)?;
            }
            self.add_new_fields(&doc)?;

            let mut clamped = Vec::new();
            let (row, mva) = self.build_row(&doc, &mut clamped)?;
            for message in clamped {
                warn!("{}", message);
                self.warnings.push(message);
            }
            let hits = self.collect_hits(&doc);
            self.stats.total_documents += 1;
            self.stats.total_bytes += doc.fields.iter().map(|(_, t)| t.len() as u64).sum::<u64>();
            if hits.is_empty() {
                warn!(source = %self.name, doc_id = doc.id.0, "document has no indexable text");
            }
            return Ok(Some(DocumentHits { doc_id: doc.id, row, mva, hits }));
        }
    }

    fn iterate_multivalued_start(&mut self, attr: usize) -> Result<()> {
        let def = self.schema.attrs().get(attr).ok_or_else(|| {
            Error::schema(format!("source '{}': no attribute #{}", self.name, attr))
        })?;
        if def.attr_type != AttrType::Multi || def.source != AttrSource::Query {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("attribute '{}' is not query-sourced multi-valued", def.name),
            ));
        }
        let name = def.name.clone();
        let mut values = self.provider.multi_values(&name)?;
        values.retain(|(doc, _)| doc.is_valid());
        self.multi_values = values.into();
        Ok(())
    }

    fn iterate_multivalued_next(&mut self) -> Result<Option<(DocId, u32)>> {
        Ok(self.multi_values.pop_front())
    }

    fn post_index(&mut self) -> Result<()> {
        self.provider.post_index()
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
