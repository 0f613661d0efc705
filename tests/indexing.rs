mod common;

use std::thread;
use common::*;
use inkdex::core::config::IndexConfig;
use inkdex::index::{merge_indexes, AttrUpdate, Index, PurgeFilter};
use inkdex::core::types::DocId;
use inkdex::schema::{AttrSource, AttrType, Schema};
use inkdex::search::{Filter, MatchMode, Query, SortMode};
use inkdex::source::{AttrValue, Document, MemoryProvider};
use inkdex::ErrorKind;

fn configured_schema() -> Schema {
    let mut schema = Schema::new("test");
    schema.add_field("title").unwrap();
    schema.add_field("body").unwrap();
    schema.add_attr("price", AttrType::integer(), AttrSource::None).unwrap();
    schema.add_attr("published", AttrType::Timestamp, AttrSource::None).unwrap();
    schema
}

fn tagged(id: u64, body: &str, tags: Vec<u32>) -> Document {
    Document::new(id).field("body", body).attr("tags", AttrValue::Multi(tags))
}

fn extended(index: &Index, text: &str) -> Vec<u64> {
    sorted(&index.query(&Query::new(text).with_mode(MatchMode::Extended)).unwrap())
}

fn filtered(index: &Index, filter: Filter) -> Vec<u64> {
    sorted(&index.query(&Query::new("quick").with_filter(filter)).unwrap())
}

/// Values of the multi-valued `attr` stored for `doc_id`.
fn mva_of(index: &Index, attr: &str, doc_id: u64) -> Vec<u32> {
    let loc = index.schema().find_attr(attr).unwrap().locator;
    let row = index.attr_snapshot().row_for(DocId(doc_id)).unwrap();
    index.mva_values(row.get(&loc)).to_vec()
}

fn sorted_ids(index: &Index, text: &str) -> Vec<u64> {
    let q = Query::new(text).with_sort(SortMode::Extended, "@id asc");
    ids(&index.query(&q).unwrap())
}

#[test]
fn build_report_counts_documents_and_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("idx"));
    let mut docs = sample_docs();
    docs.push(doc(2, "dup", "duplicate copy", 1, T));
    let report = build_with(&config, docs, None);
    assert_eq!(report.documents, 3);
    assert_eq!(report.warnings.len(), 1);

    let index = Index::open(&config.path).unwrap();
    assert_eq!(index.header().total_documents, 3);
    assert!(sorted_ids(&index, "duplicate").is_empty());
    assert_eq!(index.doc_ids().unwrap().len(), 3);
}

#[test]
fn spilled_runs_index_like_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = IndexConfig::new(dir.path().join("spilled"));
    config.mem_limit = 64;
    let report = build_with(&config, sample_docs(), None);
    assert!(report.spilled_runs > 1);

    let spilled = Index::open(&config.path).unwrap();
    let memory = build(dir.path(), "memory", sample_docs());
    assert_eq!(spilled.word_count(), memory.word_count());
    for text in ["quick", "quick fox", "dog", "programming"] {
        let a = spilled.query(&Query::new(text)).unwrap();
        let b = memory.query(&Query::new(text)).unwrap();
        assert_eq!(ids(&a), ids(&b), "{}", text);
        let weights = |r: &inkdex::QueryResult| r.matches.iter().map(|m| m.weight).collect::<Vec<_>>();
        assert_eq!(weights(&a), weights(&b));
    }
}

#[test]
fn preread_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let index = build(dir.path(), "idx", sample_docs());
    let before = sorted_ids(&index, "quick");
    assert!(!index.is_preread());
    assert!(index.preread().unwrap() > 0);
    assert!(index.is_preread());
    assert_eq!(sorted_ids(&index, "quick"), before);
}

#[test]
fn merge_prefers_delta_documents() {
    let dir = tempfile::tempdir().unwrap();
    let base = build(dir.path(), "base", sample_docs());
    let delta = build(
        dir.path(),
        "delta",
        vec![doc(1, "Rust again", "slow turtle", 7, T), doc(5, "New", "quick hare", 3, T)],
    );
    let out = dir.path().join("merged");
    let report = merge_indexes(&base, &delta, &out, None, None).unwrap();
    assert_eq!(report.documents, 4);
    assert_eq!(report.superseded, 1);

    let merged = Index::open(&out).unwrap();
    // two of three base documents survive, prorated from 84 bytes
    assert_eq!(base.header().total_bytes, 84);
    assert_eq!(merged.header().total_bytes, 56 + delta.header().total_bytes);
    // doc 1 lost its old text along with its old row
    assert_eq!(sorted_ids(&merged, "quick"), vec![2, 3, 5]);
    assert_eq!(sorted_ids(&merged, "turtle"), vec![1]);
    let result = merged.query(&Query::new("turtle")).unwrap();
    assert_eq!(price(&merged, &result, 1), 7);
}

#[test]
fn merging_identical_indexes_has_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let a = build(dir.path(), "a", sample_docs());
    let b = build(dir.path(), "b", sample_docs());
    let out = dir.path().join("ab");
    let report = merge_indexes(&a, &b, &out, None, None).unwrap();
    assert_eq!(report.documents, 3);

    let merged = Index::open(&out).unwrap();
    assert_eq!(merged.header().total_bytes, b.header().total_bytes);
    let result = merged.query(&Query::new("quick")).unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(ids(&result).len(), 3);
    let single = a.query(&Query::new("quick fox")).unwrap();
    let double = merged.query(&Query::new("quick fox")).unwrap();
    assert_eq!(ids(&single), ids(&double));
}

#[test]
fn merging_with_empty_index_is_query_identical() {
    let dir = tempfile::tempdir().unwrap();
    let full = build(dir.path(), "full", sample_docs());
    let config = IndexConfig::new(dir.path().join("empty"));
    build_with(&config, Vec::new(), Some(configured_schema()));
    let empty = Index::open(&config.path).unwrap();
    assert_eq!(empty.word_count(), 0);

    let out = dir.path().join("merged");
    merge_indexes(&full, &empty, &out, None, None).unwrap();
    let merged = Index::open(&out).unwrap();
    for text in ["quick", "quick fox", "lazy", "unicorn"] {
        let a = full.query(&Query::new(text)).unwrap();
        let b = merged.query(&Query::new(text)).unwrap();
        assert_eq!(ids(&a), ids(&b), "{}", text);
        assert_eq!(a.total, b.total);
    }
}

#[test]
fn merge_purges_out_of_range_rows() {
    let dir = tempfile::tempdir().unwrap();
    let base = build(dir.path(), "base", sample_docs());
    let delta = build(dir.path(), "delta", vec![doc(9, "Nine", "quick nine", 50, T)]);
    let out = dir.path().join("merged");
    let purge = PurgeFilter::new("price", 10, 30);
    let report = merge_indexes(&base, &delta, &out, Some(&purge), None).unwrap();
    assert_eq!(report.purged, 2);

    let merged = Index::open(&out).unwrap();
    assert_eq!(sorted_ids(&merged, "quick"), vec![2, 3]);
}

#[test]
fn merge_rejects_output_over_input() {
    let dir = tempfile::tempdir().unwrap();
    let a = build(dir.path(), "a", sample_docs());
    let b = build(dir.path(), "b", sample_docs());
    assert!(merge_indexes(&a, &b, &dir.path().join("a"), None, None).is_err());
}

#[test]
fn attribute_updates_are_visible_to_concurrent_queries() {
    let dir = tempfile::tempdir().unwrap();
    let index = build(dir.path(), "idx", sample_docs());
    let q = Query::new("quick").with_filter(Filter::range("price", 8, u64::MAX));
    assert_eq!(sorted_ids(&index, "quick").len(), 3);

    thread::scope(|s| {
        s.spawn(|| {
            let update = AttrUpdate::new(&["price"]).set(1, vec![AttrValue::Uint(10)]);
            assert_eq!(index.update_attributes(&update).unwrap(), 1);
        });
        s.spawn(|| {
            for _ in 0..20 {
                let found = ids(&index.query(&q).unwrap()).len();
                assert!(found == 2 || found == 3);
            }
        });
    });

    let mut found = ids(&index.query(&q).unwrap());
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3]);
    assert!(index.attrs_updated());

    index.save_attributes().unwrap();
    let reopened = Index::open(index.base()).unwrap();
    let result = reopened.query(&Query::new("brown")).unwrap();
    assert_eq!(price(&reopened, &result, 1), 10);
}

#[test]
fn updates_need_external_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = IndexConfig::new(dir.path().join("inline"));
    config.docinfo = inkdex::index::Docinfo::Inline;
    build_with(&config, sample_docs(), None);
    let index = Index::open(&config.path).unwrap();
    let update = AttrUpdate::new(&["price"]).set(1, vec![AttrValue::Uint(10)]);
    assert!(index.update_attributes(&update).is_err());
}

#[test]
fn sources_with_reordered_fields_keep_field_limits() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("idx"));
    let a = MemoryProvider::new(vec![Document::new(1).field("title", "alpha").field("body", "fox")]);
    let b = MemoryProvider::new(vec![Document::new(2).field("body", "fox").field("title", "omega")]);
    build_sources(&config, vec![a, b], None).unwrap();
    let index = open(&config);

    assert_eq!(index.schema().field_index("title"), Some(0));
    assert!(extended(&index, "@title fox").is_empty());
    assert_eq!(extended(&index, "@body fox"), vec![1, 2]);
    assert_eq!(extended(&index, "@title omega"), vec![2]);
    assert!(extended(&index, "@body omega").is_empty());

    let weighted = index.query(&Query::new("fox").with_field_weight("body", 5)).unwrap();
    assert_eq!(weighted.matches[0].weight, weighted.matches[1].weight);
}

#[test]
fn source_with_unknown_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("idx"));
    let a = MemoryProvider::new(vec![Document::new(1).field("title", "alpha")]);
    let b = MemoryProvider::new(vec![Document::new(2).field("summary", "fox")]);
    let err = build_sources(&config, vec![a, b], None).unwrap_err();
    assert!(err.is_kind(ErrorKind::Schema));
}

#[test]
fn merge_maps_delta_fields_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let base = build(dir.path(), "base", vec![Document::new(1).field("title", "alpha").field("body", "fox")]);
    let delta = build(dir.path(), "delta", vec![Document::new(2).field("body", "fox").field("title", "omega")]);
    assert_eq!(delta.schema().field_index("title"), Some(1));

    let out = dir.path().join("merged");
    merge_indexes(&base, &delta, &out, None, None).unwrap();
    let merged = Index::open(&out).unwrap();
    assert!(extended(&merged, "@title fox").is_empty());
    assert_eq!(extended(&merged, "@body fox"), vec![1, 2]);
    assert_eq!(extended(&merged, "@title omega"), vec![2]);

    let other = build(dir.path(), "other", vec![Document::new(3).field("summary", "fox")]);
    let err = merge_indexes(&base, &other, &dir.path().join("bad"), None, None).unwrap_err();
    assert!(err.is_kind(ErrorKind::Schema));
}

#[test]
fn field_sourced_multi_values_filter_queries() {
    let dir = tempfile::tempdir().unwrap();
    let index = build(
        dir.path(),
        "idx",
        vec![
            tagged(1, "quick fox", vec![3, 1, 3]),
            tagged(2, "quick dog", vec![2]),
            tagged(3, "quick cat", vec![]),
        ],
    );
    let tags = index.schema().find_attr("tags").unwrap();
    assert_eq!((tags.attr_type, tags.source), (AttrType::Multi, AttrSource::Field));
    assert_eq!(mva_of(&index, "tags", 1), vec![1, 3]);
    assert!(mva_of(&index, "tags", 3).is_empty());

    assert_eq!(filtered(&index, Filter::values("tags", vec![3])), vec![1]);
    assert_eq!(filtered(&index, Filter::range("tags", 1, 2)), vec![1, 2]);
    assert_eq!(filtered(&index, Filter::values("tags", vec![3]).excluded()), vec![2, 3]);
}

#[test]
fn query_sourced_multi_values_skip_unknown_documents() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("idx"));
    let mut schema = configured_schema();
    schema.add_attr("tags", AttrType::Multi, AttrSource::Query).unwrap();
    let provider = MemoryProvider::new(sample_docs()).with_multi_values(
        "tags",
        vec![(DocId(3), 8), (DocId(1), 7), (DocId(99), 7), (DocId(3), 7)],
    );
    build_sources(&config, vec![provider], Some(schema)).unwrap();
    let index = open(&config);

    assert_eq!(mva_of(&index, "tags", 3), vec![7, 8]);
    assert!(mva_of(&index, "tags", 2).is_empty());
    assert_eq!(filtered(&index, Filter::values("tags", vec![7])), vec![1, 3]);
    assert_eq!(filtered(&index, Filter::values("tags", vec![8])), vec![3]);
}

#[test]
fn merge_relays_multi_values() {
    let dir = tempfile::tempdir().unwrap();
    let base = build(
        dir.path(),
        "base",
        vec![tagged(1, "quick fox", vec![1, 2]), tagged(2, "quick dog", vec![5])],
    );
    let delta = build(
        dir.path(),
        "delta",
        vec![tagged(2, "quick dog", vec![6]), tagged(3, "quick cat", vec![1])],
    );
    let out = dir.path().join("merged");
    merge_indexes(&base, &delta, &out, None, None).unwrap();
    let merged = Index::open(&out).unwrap();

    assert_eq!(mva_of(&merged, "tags", 1), vec![1, 2]);
    assert_eq!(mva_of(&merged, "tags", 2), vec![6]);
    assert_eq!(filtered(&merged, Filter::values("tags", vec![1])), vec![1, 3]);
    assert!(filtered(&merged, Filter::values("tags", vec![5])).is_empty());
    assert_eq!(filtered(&merged, Filter::values("tags", vec![6])), vec![2]);
}

#[test]
fn oversized_values_are_clamped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("idx"));
    let mut schema = Schema::new("test");
    schema.add_attr("rating", AttrType::Integer { bits: 4 }, AttrSource::None).unwrap();
    let docs = vec![
        Document::new(1).field("body", "quick fox").attr("rating", AttrValue::Uint(40)),
        Document::new(2).field("body", "quick dog").attr("rating", AttrValue::Uint(3)),
    ];
    let report = build_with(&config, docs, Some(schema));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("rating"));

    let index = open(&config);
    assert_eq!(filtered(&index, Filter::values("rating", vec![15])), vec![1]);
}
