use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inkdex::core::config::IndexConfig;
use inkdex::index::{Index, IndexBuilder};
use inkdex::search::{Filter, GroupBy, MatchMode, Query, SortMode};
use inkdex::sorter::GroupFunc;
use inkdex::source::{AttrValue, Document, DocumentSource, MemoryProvider, Source};
use rand::Rng;
use std::path::Path;

const WORDS: [&str; 12] = [
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "rust", "index", "search", "engine",
];

/// Helper to create test documents
fn create_test_document(id: u64, content_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ");

    Document::new(id)
        .field("title", &format!("Document {}", id))
        .field("content", &content)
        .attr("category", AttrValue::Uint((id % 10) as u32))
        .attr("published", AttrValue::Timestamp(1_700_000_000 + (id as u32 % 90) * 86_400))
}

fn build_index(path: &Path, docs: usize, mem_limit: usize) -> Index {
    let mut config = IndexConfig::new(path);
    config.mem_limit = mem_limit;
    let tokenizer = config.create_tokenizer().unwrap();
    let dict = config.create_dictionary(&tokenizer).unwrap();
    let documents = (1..=docs as u64).map(|id| create_test_document(id, 100)).collect();
    let source = DocumentSource::new("bench", MemoryProvider::new(documents), &tokenizer, dict);
    let mut sources: Vec<Box<dyn Source>> = vec![Box::new(source)];
    IndexBuilder::new(config).build(&mut sources).unwrap();
    Index::open(path).unwrap()
}

/// Benchmark index builds of growing size
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    for docs in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(docs), docs, |b, &docs| {
            let dir = tempfile::tempdir().unwrap();
            b.iter(|| black_box(build_index(&dir.path().join("idx"), docs, 32 * 1024 * 1024)));
        });
    }

    // Same data with a tiny hit buffer forces many spilled runs
    group.bench_function("spilled_1000", |b| {
        let dir = tempfile::tempdir().unwrap();
        b.iter(|| black_box(build_index(&dir.path().join("idx"), 1000, 64 * 1024)));
    });

    group.finish();
}

/// Benchmark query evaluation per match mode
fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = build_index(&dir.path().join("idx"), 5000, 32 * 1024 * 1024);
    index.preread().unwrap();

    let mut group = c.benchmark_group("search");
    let queries = [
        ("all", Query::new("quick fox")),
        ("any", Query::new("quick fox lazy").with_mode(MatchMode::Any)),
        ("phrase", Query::new("quick brown").with_mode(MatchMode::Phrase)),
        ("boolean", Query::new("(rust | search) -lazy").with_mode(MatchMode::Boolean)),
        ("extended", Query::new("@content \"index engine\"~3").with_mode(MatchMode::Extended)),
    ];
    for (name, query) in queries.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| black_box(index.query(query).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark filtering, attribute sorting and grouping
fn bench_sorters(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = build_index(&dir.path().join("idx"), 5000, 32 * 1024 * 1024);

    let mut group = c.benchmark_group("sorters");
    let filtered = Query::new("quick").with_filter(Filter::range("category", 2, 5));
    group.bench_function("filter", |b| b.iter(|| black_box(index.query(&filtered).unwrap())));

    let sorted = Query::new("quick").with_sort(SortMode::Extended, "published desc, @weight desc");
    group.bench_function("sort_extended", |b| b.iter(|| black_box(index.query(&sorted).unwrap())));

    let grouped = Query::new("quick").with_group_by(GroupBy::new("published", GroupFunc::Week).with_distinct("category"));
    group.bench_function("group_by_week", |b| b.iter(|| black_box(index.query(&grouped).unwrap())));
    group.finish();
}

criterion_group!(benches, bench_build, bench_search, bench_sorters);
criterion_main!(benches);
