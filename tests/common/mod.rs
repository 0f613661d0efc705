#![allow(dead_code)]

use std::path::Path;
use inkdex::core::config::IndexConfig;
use inkdex::index::{BuildReport, Index, IndexBuilder};
use inkdex::schema::Schema;
use inkdex::search::QueryResult;
use inkdex::source::{AttrValue, Document, DocumentSource, InfixMode, MemoryProvider, Source};

pub const DAY: u32 = 86_400;
/// 2024-03-05 12:00:00 UTC
pub const T: u32 = 1_709_640_000;

pub fn doc(id: u64, title: &str, body: &str, price: u32, published: u32) -> Document {
    Document::new(id)
        .field("title", title)
        .field("body", body)
        .attr("price", AttrValue::Uint(price))
        .attr("published", AttrValue::Timestamp(published))
}

pub fn sample_docs() -> Vec<Document> {
    vec![
        doc(1, "Rust programming", "quick brown fox", 5, T),
        doc(2, "Fox news", "the quick fox jumps", 20, T + 3600),
        doc(3, "Lazy dog", "a quick dog sleeps", 12, T - 2 * DAY),
    ]
}

/// One source per provider, all sharing `schema` when given. Sources
/// emit prefixes or infixes as the config asks.
pub fn build_sources(config: &IndexConfig, providers: Vec<MemoryProvider>, schema: Option<Schema>) -> inkdex::Result<BuildReport> {
    let tokenizer = config.create_tokenizer().unwrap();
    let dict = config.create_dictionary(&tokenizer).unwrap();
    let mut sources: Vec<Box<dyn Source>> = Vec::new();
    for (i, provider) in providers.into_iter().enumerate() {
        let mut source = DocumentSource::new(&format!("src{}", i), provider, &tokenizer, dict.clone());
        if let Some(schema) = &schema {
            source = source.with_schema(schema.clone());
        }
        if config.analysis.infix_mode != InfixMode::None {
            source = source.with_infixes(config.analysis.infix_mode, config.analysis.min_infix_len);
        }
        sources.push(Box::new(source));
    }
    IndexBuilder::new(config.clone()).build(&mut sources)
}

pub fn build_with(config: &IndexConfig, docs: Vec<Document>, schema: Option<Schema>) -> BuildReport {
    build_sources(config, vec![MemoryProvider::new(docs)], schema).unwrap()
}

pub fn build(dir: &Path, name: &str, docs: Vec<Document>) -> Index {
    let config = IndexConfig::new(dir.join(name));
    build_with(&config, docs, None);
    Index::open(&config.path).unwrap()
}

pub fn open(config: &IndexConfig) -> Index {
    Index::open(&config.path).unwrap()
}

/// Document ids of `result`, ascending.
pub fn sorted(result: &QueryResult) -> Vec<u64> {
    let mut found = ids(result);
    found.sort_unstable();
    found
}

pub fn ids(result: &QueryResult) -> Vec<u64> {
    result.matches.iter().map(|m| m.doc_id.0).collect()
}

pub fn price(index: &Index, result: &QueryResult, doc_id: u64) -> u32 {
    let loc = index.schema().find_attr("price").unwrap().locator;
    let m = result.matches.iter().find(|m| m.doc_id.0 == doc_id).unwrap();
    m.row.get(&loc)
}
