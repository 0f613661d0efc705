use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use rayon::slice::ParallelSliceMut;
use tracing::{debug, info, warn};
use crate::core::config::IndexConfig;
use crate::core::error::{Error, Result};
use crate::core::stats::{Phase, ProgressCallback, ProgressReporter, SourceStats};
use crate::core::types::{DocId, HitPos, WordHit};
use crate::index::format::{Docinfo, IndexFile, IndexHeader};
use crate::index::spill::{MvaEntry, RunSpiller};
use crate::index::writer::{PostingWriter, WriterTotals};
use crate::schema::{AttrSource, Row, Schema, SchemaMatch};
use crate::source::Source;

/// Summary of a finished build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: u64,
    pub bytes: u64,
    pub words: u64,
    pub hits: u64,
    pub spilled_runs: usize,
    /// Non-fatal anomalies, also logged as warnings
    pub warnings: Vec<String>,
}

struct Collector {
    hits: RunSpiller<WordHit>,
    mva: RunSpiller<MvaEntry>,
    rows: Vec<(DocId, Row)>,
    keep_rows: bool,
    seen: HashSet<DocId>,
    schema: Option<Schema>,
    stats: SourceStats,
    warnings: Vec<String>,
}

impl Collector {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Builds an on-disk index from one or more sources.
///
/// Phases: collect hits (spilling sorted runs past the memory limit),
/// collect and sort multi-valued attributes, then k-way merge the hit
/// runs straight into the posting files. The header is written last;
/// on error, partial files are left for the caller to discard.
pub struct IndexBuilder {
    config: IndexConfig,
    progress: ProgressReporter,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        IndexBuilder {
            config,
            progress: ProgressReporter::new(None),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = ProgressReporter::new(Some(callback));
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn work_dir(&self) -> PathBuf {
        match self.config.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn build(&mut self, sources: &mut [Box<dyn Source>]) -> Result<BuildReport> {
        let base = self.config.path.clone();
        let dir = self.work_dir();
        fs::create_dir_all(&dir)?;
        info!(index = %base.display(), sources = sources.len(), "indexing started");

        let mem_limit = self.config.mem_limit;
        let mut c = Collector {
            hits: RunSpiller::new(&dir, mem_limit),
            mva: RunSpiller::new(&dir, (mem_limit / 8).max(1)),
            rows: Vec::new(),
            keep_rows: self.config.docinfo != Docinfo::None,
            seen: HashSet::new(),
            schema: None,
            stats: SourceStats::default(),
            warnings: Vec::new(),
        };

        self.progress.enter(Phase::Collect);
        for source in sources.iter_mut() {
            source.connect()?;
            let result = self.collect_source(source.as_mut(), &mut c);
            source.disconnect();
            result?;
        }
        self.progress.finish_phase();

        let index_name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let schema = c.schema.take().unwrap_or_else(|| Schema::new(index_name));
        c.rows.par_sort_unstable_by_key(|(id, _)| *id);

        let Collector { hits, mva, mut rows, seen, stats, warnings, .. } = c;
        let spilled_runs = hits.run_count();

        let mva_words = if rows.is_empty() { vec![0] } else { self.sort_mva(mva, &schema, &mut rows)? };
        write_words(&IndexFile::Mva.path(&base), &mva_words)?;

        let inline = self.config.docinfo == Docinfo::Inline;
        let totals = self.sort_hits(hits, &base, &rows, if inline { schema.row_size() } else { 0 })?;

        let extern_rows: &[(DocId, Row)] = if self.config.docinfo == Docinfo::Extern { rows.as_slice() } else { &[] };
        write_rows(&IndexFile::Attrs.path(&base), extern_rows)?;

        let mut header = IndexHeader::new(schema, self.config.docinfo, self.config.analysis.clone())?;
        header.total_documents = seen.len() as u64;
        header.total_bytes = stats.total_bytes;
        header.total_words = totals.words;
        header.total_hits = totals.hits;
        header.min_doc_id = seen.iter().map(|d| d.0).min().unwrap_or(0);
        header.write(&base)?;

        info!(
            index = %base.display(),
            documents = header.total_documents,
            words = totals.words,
            hits = totals.hits,
            runs = spilled_runs,
            "indexing finished"
        );
        Ok(BuildReport {
            documents: header.total_documents,
            bytes: stats.total_bytes,
            words: totals.words,
            hits: totals.hits,
            spilled_runs,
            warnings,
        })
    }

    fn collect_source(&mut self, source: &mut dyn Source, c: &mut Collector) -> Result<()> {
        source.iterate_hits_start()?;
        let mut docs = 0u64;
        // source field -> index field; empty while the source defines the schema
        let mut field_map: Vec<usize> = Vec::new();
        while let Some(doc) = source.iterate_hits_next()? {
            docs += 1;
            if let Some(schema) = &c.schema {
                if field_map.len() < source.schema().fields().len() {
                    field_map = schema.field_map(source.schema())?;
                }
            }
            if !c.seen.insert(doc.doc_id) {
                c.warn(format!("duplicate document id {}, keeping the first copy", doc.doc_id.0));
                continue;
            }
            if c.keep_rows {
                for (attr, values) in &doc.mva {
                    for &value in values {
                        c.mva.push(MvaEntry { doc_id: doc.doc_id, attr: *attr as u32, value })?;
                    }
                }
                c.rows.push((doc.doc_id, doc.row));
            }
            for mut hit in doc.hits {
                if let Some(&field) = field_map.get(hit.pos.field()) {
                    hit.pos = HitPos::new(field, hit.pos.pos());
                }
                c.hits.push(hit)?;
            }

            let progress = self.progress.get_mut();
            progress.documents += 1;
            self.progress.tick();
        }

        if docs > 0 || source.has_attrs_configured() {
            match c.schema.as_ref().map(|s| s.compare_to(source.schema())) {
                None => c.schema = Some(source.schema().clone()),
                Some((SchemaMatch::Incompatible, reason)) => {
                    return Err(Error::schema(format!(
                        "source '{}' does not match index schema: {}",
                        source.schema().name, reason
                    )));
                }
                Some(_) => {}
            }
        }

        let query_attrs: Vec<usize> = source
            .schema()
            .mva_attrs()
            .filter(|(_, a)| a.source == AttrSource::Query)
            .map(|(i, _)| i)
            .collect();
        if c.keep_rows && !query_attrs.is_empty() {
            self.progress.enter(Phase::CollectMva);
            for attr in query_attrs {
                source.iterate_multivalued_start(attr)?;
                while let Some((doc_id, value)) = source.iterate_multivalued_next()? {
                    if !c.seen.contains(&doc_id) {
                        continue;
                    }
                    c.mva.push(MvaEntry { doc_id, attr: attr as u32, value })?;
                    self.progress.get_mut().attrs += 1;
                    self.progress.tick();
                }
            }
            self.progress.finish_phase();
        }

        source.post_index()?;
        c.warnings.extend(source.take_warnings());
        c.stats.total_documents += source.stats().total_documents;
        c.stats.total_bytes += source.stats().total_bytes;
        self.progress.get_mut().bytes = c.stats.total_bytes;
        debug!(source = %source.schema().name, documents = docs, "source collected");
        Ok(())
    }

    /// Lays out multi-valued lists and stores their offsets in the rows.
    /// Word 0 of the storage is the shared empty list.
    fn sort_mva(&mut self, mva: RunSpiller<MvaEntry>, schema: &Schema, rows: &mut [(DocId, Row)]) -> Result<Vec<u32>> {
        self.progress.enter(Phase::SortMva);
        self.progress.get_mut().attrs_total = mva.total();
        let mut words = vec![0u32];
        let mut merger = mva.into_merge()?;
        let mut group: Option<(DocId, u32)> = None;
        let mut values: Vec<u32> = Vec::new();

        loop {
            let next = merger.next_record()?;
            let key = next.map(|e| (e.doc_id, e.attr));
            if group.is_some() && group != key {
                if let Some((doc_id, attr)) = group {
                    store_list(&mut words, &values, doc_id, attr, schema, rows)?;
                }
                values.clear();
            }
            let Some(entry) = next else { break };
            group = key;
            values.push(entry.value);
            self.progress.get_mut().attrs += 1;
            self.progress.tick();
        }
        self.progress.finish_phase();
        Ok(words)
    }

    fn sort_hits(
        &mut self,
        hits: RunSpiller<WordHit>,
        base: &Path,
        rows: &[(DocId, Row)],
        inline_row_size: usize,
    ) -> Result<WriterTotals> {
        self.progress.enter(Phase::Sort);
        self.progress.get_mut().hits_total = hits.total();

        let mut writer = PostingWriter::create(base, inline_row_size)?;
        let mut merger = hits.into_merge()?;
        let empty_row = vec![0u32; inline_row_size];
        let mut current: Option<(u64, DocId)> = None;
        let mut positions: Vec<u32> = Vec::new();

        loop {
            let next = merger.next_record()?;
            let key = next.map(|h| (h.word_id, h.doc_id));
            if current.is_some() && current != key {
                if let Some((word_id, doc_id)) = current {
                    let row = if inline_row_size == 0 {
                        &empty_row[..]
                    } else {
                        match rows.binary_search_by_key(&doc_id, |(id, _)| *id) {
                            Ok(i) => rows[i].1.words(),
                            Err(_) => &empty_row[..],
                        }
                    };
                    writer.write_doc(word_id, doc_id, row, &positions)?;
                }
                positions.clear();
            }
            let Some(hit) = next else { break };
            current = key;
            positions.push(hit.pos.0);
            self.progress.get_mut().hits += 1;
            self.progress.tick();
        }

        let totals = writer.finish()?;
        self.progress.get_mut().words = totals.words;
        self.progress.finish_phase();
        Ok(totals)
    }
}

fn store_list(
    words: &mut Vec<u32>,
    values: &[u32],
    doc_id: DocId,
    attr: u32,
    schema: &Schema,
    rows: &mut [(DocId, Row)],
) -> Result<()> {
    let Ok(i) = rows.binary_search_by_key(&doc_id, |(id, _)| *id) else {
        return Ok(());
    };
    let offset = words.len() as u32;
    words.push(values.len() as u32);
    words.extend_from_slice(values);
    let locator = schema.attr(attr as usize).locator;
    rows[i].1.set(&locator, offset)
}

pub(crate) fn write_words(path: &Path, words: &[u32]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for word in words {
        out.write_all(&word.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// External rows: `doc_id` (u64) then the row words, sorted by id.
pub(crate) fn write_rows(path: &Path, rows: &[(DocId, Row)]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (doc_id, row) in rows {
        out.write_all(&doc_id.0.to_le_bytes())?;
        for word in row.words() {
            out.write_all(&word.to_le_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}
