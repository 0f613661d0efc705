use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::builder::write_rows;
use crate::index::codec::{read_u32_le, read_u64_le};
use crate::schema::{AttrLocator, AttrType, Row, Schema};
use crate::source::AttrValue;

/// Immutable block of external rows sorted by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrBlock {
    doc_ids: Vec<u64>,
    words: Vec<u32>,
    row_size: usize,
}

impl AttrBlock {
    pub fn empty(row_size: usize) -> Self {
        AttrBlock {
            doc_ids: Vec::new(),
            words: Vec::new(),
            row_size,
        }
    }

    pub fn load(path: &Path, row_size: usize) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            Error::io(format!("failed to read attributes '{}': {}", path.display(), e))
        })?;
        let stride = 8 + 4 * row_size;
        if data.len() % stride != 0 {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("'{}' size {} is not a multiple of the row stride {}", path.display(), data.len(), stride),
            ));
        }
        let count = data.len() / stride;
        let mut block = AttrBlock {
            doc_ids: Vec::with_capacity(count),
            words: Vec::with_capacity(count * row_size),
            row_size,
        };
        for i in 0..count {
            let at = i * stride;
            block.doc_ids.push(read_u64_le(&data, at)?);
            for w in 0..row_size {
                block.words.push(read_u32_le(&data, at + 8 + 4 * w)?);
            }
        }
        if block.doc_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("'{}' rows are not sorted by document id", path.display()),
            ));
        }
        Ok(block)
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn find(&self, doc_id: DocId) -> Option<usize> {
        self.doc_ids.binary_search(&doc_id.0).ok()
    }

    pub fn doc_id(&self, index: usize) -> DocId {
        DocId(self.doc_ids[index])
    }

    pub fn row(&self, index: usize) -> Row {
        let at = index * self.row_size;
        Row::from_words(self.words[at..at + self.row_size].to_vec())
    }

    pub fn row_for(&self, doc_id: DocId) -> Option<Row> {
        self.find(doc_id).map(|i| self.row(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, Row)> + '_ {
        (0..self.len()).map(|i| (self.doc_id(i), self.row(i)))
    }

    fn set(&mut self, index: usize, loc: &AttrLocator, value: u32) -> Result<()> {
        let at = index * self.row_size;
        let mut row = Row::from_words(self.words[at..at + self.row_size].to_vec());
        row.set(loc, value)?;
        self.words[at..at + self.row_size].copy_from_slice(row.words());
        Ok(())
    }

    fn rows(&self) -> Vec<(DocId, Row)> {
        self.iter().collect()
    }
}

/// Attribute values to apply to existing documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrUpdate {
    pub attrs: Vec<String>,
    pub docs: Vec<(DocId, Vec<AttrValue>)>,
}

impl AttrUpdate {
    pub fn new(attrs: &[&str]) -> Self {
        AttrUpdate {
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
            docs: Vec::new(),
        }
    }

    pub fn set(mut self, doc_id: u64, values: Vec<AttrValue>) -> Self {
        self.docs.push((DocId(doc_id), values));
        self
    }
}

/// Snapshot handle over the external row store.
///
/// Readers take an `Arc` to the current block and keep it for the whole
/// query. Updates copy the block, apply the changes and swap the handle,
/// so a reader sees every row either entirely before or entirely after
/// an update.
pub struct AttrStore {
    current: RwLock<Arc<AttrBlock>>,
    writer: Mutex<()>,
    updated: AtomicBool,
}

impl AttrStore {
    pub fn new(block: AttrBlock) -> Self {
        AttrStore {
            current: RwLock::new(Arc::new(block)),
            writer: Mutex::new(()),
            updated: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<AttrBlock> {
        Arc::clone(&self.current.read())
    }

    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }

    /// Applies `update`, returning how many documents were found and changed.
    pub fn update(&self, schema: &Schema, update: &AttrUpdate) -> Result<usize> {
        let mut targets = Vec::with_capacity(update.attrs.len());
        for name in &update.attrs {
            let attr = schema.require_attr(name)?;
            if attr.attr_type == AttrType::Multi {
                return Err(Error::query(format!("multi-valued attribute '{}' cannot be updated", name)));
            }
            targets.push((attr.locator, attr.attr_type));
        }

        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let mut changed = 0;
        for (doc_id, values) in &update.docs {
            if values.len() != targets.len() {
                return Err(Error::query(format!(
                    "document {}: {} values for {} attributes",
                    doc_id.0,
                    values.len(),
                    targets.len()
                )));
            }
            let Some(index) = next.find(*doc_id) else {
                continue;
            };
            for ((locator, attr_type), value) in targets.iter().zip(values) {
                let raw = match (value, attr_type) {
                    (AttrValue::Float(f), AttrType::Float) => f.to_bits(),
                    (AttrValue::Uint(v) | AttrValue::Timestamp(v), t) if *t != AttrType::Float => *v,
                    (AttrValue::Bool(b), t) if *t != AttrType::Float => *b as u32,
                    _ => {
                        return Err(Error::query(format!(
                            "document {}: value {:?} does not fit {:?}",
                            doc_id.0, value, attr_type
                        )));
                    }
                };
                let (raw, cut) = locator.saturate(raw);
                if cut {
                    warn!(doc_id = doc_id.0, value = ?value, stored = raw, "attribute update clamped to its width");
                }
                next.set(index, locator, raw)?;
            }
            changed += 1;
        }

        if changed > 0 {
            *self.current.write() = Arc::new(next);
            self.updated.store(true, Ordering::Release);
        }
        debug!(documents = changed, "attributes updated");
        Ok(changed)
    }

    /// Persists the current block to `path` through a temporary file and
    /// rename; the inverted index files are not touched.
    pub fn save(&self, path: &Path) -> Result<()> {
        let _guard = self.writer.lock();
        let block = self.snapshot();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        write_rows(&tmp, &block.rows())?;
        fs::rename(&tmp, path)?;
        self.updated.store(false, Ordering::Release);
        info!(path = %path.display(), rows = block.len(), "attributes saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttrSource;

    fn store() -> (Schema, AttrStore) {
        let mut schema = Schema::new("t");
        schema.add_attr("price", AttrType::integer(), AttrSource::None).unwrap();
        schema.add_attr("score", AttrType::Float, AttrSource::None).unwrap();
        let rows: Vec<(DocId, Row)> = (1..=3)
            .map(|id| {
                let mut row = Row::new(schema.row_size());
                row.set(&schema.attr(0).locator, id as u32 * 5).unwrap();
                (DocId(id), row)
            })
            .collect();
        let block = AttrBlock {
            doc_ids: rows.iter().map(|(d, _)| d.0).collect(),
            words: rows.iter().flat_map(|(_, r)| r.words().to_vec()).collect(),
            row_size: schema.row_size(),
        };
        (schema, AttrStore::new(block))
    }

    #[test]
    fn update_swaps_a_new_block_and_old_snapshots_stay_intact() {
        let (schema, store) = store();
        let price = schema.attr(0).locator;
        let before = store.snapshot();

        let update = AttrUpdate::new(&["price", "score"])
            .set(1, vec![AttrValue::Uint(10), AttrValue::Float(0.5)])
            .set(99, vec![AttrValue::Uint(1), AttrValue::Float(1.0)]);
        assert_eq!(store.update(&schema, &update).unwrap(), 1);
        assert!(store.is_updated());

        assert_eq!(before.row_for(DocId(1)).unwrap().get(&price), 5);
        let after = store.snapshot();
        let row = after.row_for(DocId(1)).unwrap();
        assert_eq!(row.get(&price), 10);
        assert_eq!(row.get_float(&schema.attr(1).locator), 0.5);
    }

    #[test]
    fn rejects_unknown_and_mistyped_values() {
        let (schema, store) = store();
        let unknown = AttrUpdate::new(&["nope"]).set(1, vec![AttrValue::Uint(1)]);
        assert!(store.update(&schema, &unknown).unwrap_err().is_kind(ErrorKind::Query));
        let mistyped = AttrUpdate::new(&["score"]).set(1, vec![AttrValue::Uint(1)]);
        assert!(store.update(&schema, &mistyped).is_err());
        assert!(!store.is_updated());
    }

    #[test]
    fn narrow_updates_saturate() {
        let mut schema = Schema::new("t");
        schema.add_attr("rating", AttrType::Integer { bits: 3 }, AttrSource::None).unwrap();
        schema.add_attr("flag", AttrType::Bool, AttrSource::None).unwrap();
        let block = AttrBlock { doc_ids: vec![1], words: vec![0], row_size: schema.row_size() };
        let store = AttrStore::new(block);
        let update = AttrUpdate::new(&["rating", "flag"]).set(1, vec![AttrValue::Uint(100), AttrValue::Uint(2)]);
        assert_eq!(store.update(&schema, &update).unwrap(), 1);
        let row = store.snapshot().row_for(DocId(1)).unwrap();
        assert_eq!(row.get(&schema.attr(0).locator), 7);
        assert_eq!(row.get(&schema.attr(1).locator), 1);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.spa");
        let (schema, store) = store();
        store
            .update(&schema, &AttrUpdate::new(&["price"]).set(2, vec![AttrValue::Uint(77)]))
            .unwrap();
        store.save(&path).unwrap();
        assert!(!store.is_updated());

        let loaded = AttrBlock::load(&path, schema.row_size()).unwrap();
        assert_eq!(loaded, *store.snapshot());
        assert_eq!(loaded.row_for(DocId(2)).unwrap().get(&schema.attr(0).locator), 77);
    }
}
