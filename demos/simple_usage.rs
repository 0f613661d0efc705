/// Complete inkdex API Demo
///
/// Demonstrates the main operations:
/// - Building an index from in-memory documents
/// - Searching in every match mode
/// - Filtering, sorting and grouping
/// - Attribute updates and merging a delta index

use inkdex::core::config::IndexConfig;
use inkdex::index::{merge_indexes, AttrUpdate, Index, IndexBuilder};
use inkdex::search::{search_federated, Filter, GroupBy, MatchMode, Query, QueryResult, SortMode};
use inkdex::sorter::GroupFunc;
use inkdex::source::{AttrValue, Document, DocumentSource, MemoryProvider, Source};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║      inkdex Search Core - API Demo            ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    let dir = tempfile::tempdir()?;

    // Step 1: BUILD - Index a few documents
    println!("Step 1: BUILD - Indexing documents...");
    let main_path = dir.path().join("main");
    let report = build(
        &main_path,
        vec![
            create_document(1, "Rust Programming", "Learn the Rust language", 30, 1_709_640_000),
            create_document(2, "Database Systems", "SQL and NoSQL databases in Rust", 45, 1_709_650_000),
            create_document(3, "Web Development", "Building web apps", 25, 1_709_400_000),
        ],
    )?;
    println!("  Indexed {} documents, {} words, {} hits\n", report.documents, report.words, report.hits);
    let index = Index::open(&main_path)?;

    // Step 2: SEARCH - Different match modes
    println!("Step 2: SEARCH - Querying...");
    print_result("rust", &index.search(&Query::new("rust")));
    print_result(
        "rust -sql (boolean)",
        &index.search(&Query::new("rust -sql").with_mode(MatchMode::Boolean)),
    );
    print_result(
        "@title rust (extended)",
        &index.search(&Query::new("@title rust").with_mode(MatchMode::Extended)),
    );
    print_result(
        "\"web apps\" (phrase)",
        &index.search(&Query::new("web apps").with_mode(MatchMode::Phrase)),
    );
    println!();

    // Step 3: FILTER & SORT
    println!("Step 3: FILTER & SORT - Attribute queries...");
    let q = Query::new("rust")
        .with_filter(Filter::range("price", 40, 100))
        .with_sort(SortMode::AttrDesc, "price");
    print_result("rust, price >= 40", &index.search(&q));

    let q = Query::new("rust")
        .with_mode(MatchMode::Any)
        .with_group_by(GroupBy::new("published", GroupFunc::Day));
    let grouped = index.search(&q);
    for m in &grouped.matches {
        if let Some(group) = m.group {
            println!("  day {}: {} documents", group.key, group.count);
        }
    }
    println!();

    // Step 4: UPDATE - Change attributes in place
    println!("Step 4: UPDATE - Updating attributes...");
    let updated = index.update_attributes(&AttrUpdate::new(&["price"]).set(3, vec![AttrValue::Uint(99)]))?;
    index.save_attributes()?;
    println!("  Updated {} documents\n", updated);

    // Step 5: MERGE - Fold a delta index into the main one
    println!("Step 5: MERGE - Merging a delta index...");
    let delta_path = dir.path().join("delta");
    build(
        &delta_path,
        vec![create_document(4, "Async Rust", "Futures and executors", 50, 1_709_700_000)],
    )?;
    let delta = Index::open(&delta_path)?;
    print_result("rust (federated)", &search_federated(&[&index, &delta], &Query::new("rust")));

    let merged_path = dir.path().join("merged");
    let merge = merge_indexes(&index, &delta, &merged_path, None, None)?;
    println!("  Merged index holds {} documents", merge.documents);
    let merged = Index::open(&merged_path)?;
    print_result("rust (merged)", &merged.search(&Query::new("rust")));

    println!("\n╔════════════════════════════════════════╗");
    println!("║    All API Operations Completed!      ║");
    println!("╚════════════════════════════════════════╝\n");

    Ok(())
}

fn build(path: &std::path::Path, docs: Vec<Document>) -> inkdex::Result<inkdex::index::BuildReport> {
    let config = IndexConfig::new(path);
    let tokenizer = config.create_tokenizer()?;
    let dict = config.create_dictionary(&tokenizer)?;
    let source = DocumentSource::new("demo", MemoryProvider::new(docs), &tokenizer, dict);
    let mut sources: Vec<Box<dyn Source>> = vec![Box::new(source)];
    IndexBuilder::new(config).build(&mut sources)
}

fn print_result(label: &str, result: &QueryResult) {
    match &result.error {
        Some(error) => println!("  '{}': failed: {}", label, error),
        None => {
            let ids: Vec<u64> = result.matches.iter().map(|m| m.doc_id.0).collect();
            println!("  '{}': {} total, top {:?}", label, result.total, ids);
        }
    }
}

/// Helper function to create a document
fn create_document(id: u64, title: &str, content: &str, price: u32, published: u32) -> Document {
    Document::new(id)
        .field("title", title)
        .field("content", content)
        .attr("price", AttrValue::Uint(price))
        .attr("published", AttrValue::Timestamp(published))
}
