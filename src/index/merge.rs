use std::collections::HashSet;
use std::iter::Peekable;
use std::path::Path;
use tracing::info;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{Phase, ProgressCallback, ProgressReporter};
use crate::core::types::{DocId, HitPos};
use crate::index::builder::{write_rows, write_words};
use crate::index::format::{Docinfo, IndexFile, IndexHeader, WordEntry};
use crate::index::reader::Index;
use crate::index::writer::PostingWriter;
use crate::schema::{AttrLocator, AttrType, Row, SchemaMatch};

/// Drops documents whose attribute falls outside `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeFilter {
    pub attr: String,
    pub min: u32,
    pub max: u32,
}

impl PurgeFilter {
    pub fn new(attr: &str, min: u32, max: u32) -> Self {
        PurgeFilter { attr: attr.to_string(), min, max }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub documents: u64,
    pub words: u64,
    pub hits: u64,
    /// Base documents replaced by a document of the incremental index
    pub superseded: u64,
    pub purged: u64,
}

/// Collects every document's row, ascending by id.
fn rows_of(index: &Index) -> Result<Vec<(DocId, Row)>> {
    match index.docinfo() {
        Docinfo::Extern => Ok(index.attr_snapshot().iter().collect()),
        Docinfo::None => Ok(index.doc_ids()?.into_iter().map(|d| (d, Row::new(0))).collect()),
        Docinfo::Inline => {
            let mut rows = Vec::new();
            let mut seen = HashSet::new();
            for entry in index.word_entries() {
                let entry = entry?;
                for posting in index.doclist(&entry) {
                    let posting = posting?;
                    if seen.insert(posting.doc_id) {
                        rows.push((posting.doc_id, Row::from_words(posting.inline_row)));
                    }
                }
            }
            rows.sort_by_key(|(id, _)| *id);
            Ok(rows)
        }
    }
}

/// Copies a row, re-homing its multi-valued lists into `mva`.
fn relay_row(index: &Index, row: &Row, mva_locators: &[AttrLocator], mva: &mut Vec<u32>) -> Result<Row> {
    let mut out = row.clone();
    for locator in mva_locators {
        let values = index.mva_values(row.get(locator));
        let offset = if values.is_empty() {
            0
        } else {
            let offset = mva.len() as u32;
            mva.push(values.len() as u32);
            mva.extend_from_slice(values);
            offset
        };
        out.set(locator, offset)?;
    }
    Ok(out)
}

fn check_compatible(base: &Index, delta: &Index, out: &Path) -> Result<()> {
    if out == base.base() || out == delta.base() {
        return Err(Error::new(
            ErrorKind::InvalidState,
            format!("merge output '{}' must differ from its inputs", out.display()),
        ));
    }
    let (m, reason) = base.schema().compare_to(delta.schema());
    if m == SchemaMatch::Incompatible {
        return Err(Error::schema(format!("cannot merge incompatible schemas: {}", reason)));
    }
    if base.docinfo() != delta.docinfo() {
        return Err(Error::schema(format!(
            "cannot merge docinfo {:?} with {:?}",
            base.docinfo(),
            delta.docinfo()
        )));
    }
    if base.header().word_id_bits != delta.header().word_id_bits {
        return Err(Error::schema("cannot merge indexes with different word id widths"));
    }
    Ok(())
}

/// Byte total of `kept` documents, prorated from the header since sizes
/// are not stored per document.
fn kept_bytes(index: &Index, kept: usize) -> u64 {
    let header = index.header();
    if header.total_documents == 0 {
        return 0;
    }
    (header.total_bytes as u128 * kept as u128 / header.total_documents as u128) as u64
}

/// Next word id present in either stream.
fn next_word<A, B>(a: &mut Peekable<A>, b: &mut Peekable<B>) -> Result<Option<(Option<WordEntry>, Option<WordEntry>)>>
where
    A: Iterator<Item = Result<WordEntry>>,
    B: Iterator<Item = Result<WordEntry>>,
{
    let wa = match a.peek() {
        Some(Ok(e)) => Some(e.word_id),
        Some(Err(_)) => return a.next().transpose().map(|_| None),
        None => None,
    };
    let wb = match b.peek() {
        Some(Ok(e)) => Some(e.word_id),
        Some(Err(_)) => return b.next().transpose().map(|_| None),
        None => None,
    };
    let word = match (wa, wb) {
        (None, None) => return Ok(None),
        (Some(x), None) => x,
        (None, Some(y)) => y,
        (Some(x), Some(y)) => x.min(y),
    };
    let ea = if wa == Some(word) { a.next().transpose()? } else { None };
    let eb = if wb == Some(word) { b.next().transpose()? } else { None };
    Ok(Some((ea, eb)))
}

/// Merges `delta` into `base`, writing a new index at `out`.
///
/// Documents present in `delta` replace same-id documents of `base`.
/// The purge filter is evaluated once per document; a purged document
/// loses all of its hits.
pub fn merge_indexes(
    base: &Index,
    delta: &Index,
    out: &Path,
    purge: Option<&PurgeFilter>,
    progress: Option<ProgressCallback>,
) -> Result<MergeReport> {
    check_compatible(base, delta, out)?;
    let schema = base.schema().clone();
    // delta hits address delta fields; rewrite them to base fields
    let delta_fields = schema.field_map(delta.schema())?;
    let same_fields = delta_fields.iter().enumerate().all(|(i, &f)| i == f);
    let docinfo = base.docinfo();
    let mut progress = ProgressReporter::new(progress);
    info!(base = %base.base().display(), delta = %delta.base().display(), out = %out.display(), "merge started");

    let purge_locator = match purge {
        Some(filter) if docinfo != Docinfo::None => {
            let attr = schema.require_attr(&filter.attr)?;
            if attr.attr_type == AttrType::Multi || attr.attr_type == AttrType::Float {
                return Err(Error::query(format!("cannot purge by attribute '{}'", filter.attr)));
            }
            Some((attr.locator, filter.min, filter.max))
        }
        Some(filter) => {
            return Err(Error::query(format!(
                "cannot purge by '{}': index stores no attributes",
                filter.attr
            )));
        }
        None => None,
    };
    let keep = |row: &Row| match purge_locator {
        Some((loc, min, max)) => (min..=max).contains(&row.get(&loc)),
        None => true,
    };
    let mva_locators: Vec<AttrLocator> = match docinfo {
        Docinfo::None => Vec::new(),
        Docinfo::Inline | Docinfo::Extern => schema.mva_attrs().map(|(_, a)| a.locator).collect(),
    };

    let mut report = MergeReport::default();
    let delta_rows = rows_of(delta)?;
    let delta_ids: HashSet<DocId> = delta_rows.iter().map(|(id, _)| *id).collect();

    let mut mva = vec![0u32];
    let mut rows: Vec<(DocId, Row)> = Vec::new();
    let mut base_keep = HashSet::new();
    let mut delta_keep = HashSet::new();
    for (doc_id, row) in rows_of(base)? {
        if delta_ids.contains(&doc_id) {
            report.superseded += 1;
        } else if !keep(&row) {
            report.purged += 1;
        } else {
            rows.push((doc_id, relay_row(base, &row, &mva_locators, &mut mva)?));
            base_keep.insert(doc_id);
        }
    }
    for (doc_id, row) in &delta_rows {
        if keep(row) {
            rows.push((*doc_id, relay_row(delta, row, &mva_locators, &mut mva)?));
            delta_keep.insert(*doc_id);
        } else {
            report.purged += 1;
        }
    }
    rows.sort_by_key(|(id, _)| *id);
    report.documents = rows.len() as u64;

    progress.enter(Phase::Merge);
    let inline_row_size = if docinfo == Docinfo::Inline { schema.row_size() } else { 0 };
    let empty_row = vec![0u32; inline_row_size];
    let mut writer = PostingWriter::create(out, inline_row_size)?;
    let mut base_words = base.word_entries().peekable();
    let mut delta_words = delta.word_entries().peekable();

    while let Some((from_base, from_delta)) = next_word(&mut base_words, &mut delta_words)? {
        let word_id = from_base.or(from_delta).map(|e| e.word_id).unwrap_or_default();
        let mut postings = Vec::new();
        if let Some(entry) = from_base {
            for posting in base.doclist(&entry) {
                let posting = posting?;
                if base_keep.contains(&posting.doc_id) {
                    postings.push((posting.doc_id, false, posting));
                }
            }
        }
        if let Some(entry) = from_delta {
            for posting in delta.doclist(&entry) {
                let posting = posting?;
                if delta_keep.contains(&posting.doc_id) {
                    postings.push((posting.doc_id, true, posting));
                }
            }
        }
        postings.sort_by_key(|(id, _, _)| *id);

        for (doc_id, is_delta, posting) in &postings {
            let mut positions = if *is_delta { delta.positions(posting)? } else { base.positions(posting)? };
            if *is_delta && !same_fields {
                for pos in positions.iter_mut() {
                    let hit = HitPos(*pos);
                    if let Some(&field) = delta_fields.get(hit.field()) {
                        *pos = HitPos::new(field, hit.pos()).0;
                    }
                }
                positions.sort_unstable();
            }
            let row = if inline_row_size == 0 {
                &empty_row[..]
            } else {
                match rows.binary_search_by_key(doc_id, |(id, _)| *id) {
                    Ok(i) => rows[i].1.words(),
                    Err(_) => &empty_row[..],
                }
            };
            writer.write_doc(word_id, *doc_id, row, &positions)?;
        }
        progress.get_mut().words += 1;
        progress.tick();
    }
    let totals = writer.finish()?;
    progress.finish_phase();

    write_words(&IndexFile::Mva.path(out), &mva)?;
    let extern_rows: &[(DocId, Row)] = if docinfo == Docinfo::Extern { &rows } else { &[] };
    write_rows(&IndexFile::Attrs.path(out), extern_rows)?;

    let mut header = IndexHeader::new(schema, docinfo, base.header().analysis.clone())?;
    header.total_documents = report.documents;
    header.total_bytes = kept_bytes(base, base_keep.len()) + kept_bytes(delta, delta_keep.len());
    header.total_words = totals.words;
    header.total_hits = totals.hits;
    header.min_doc_id = rows.first().map(|(id, _)| id.0).unwrap_or(0);
    header.write(out)?;

    report.words = totals.words;
    report.hits = totals.hits;
    info!(
        out = %out.display(),
        documents = report.documents,
        superseded = report.superseded,
        purged = report.purged,
        "merge finished"
    );
    Ok(report)
}
