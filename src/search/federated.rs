use std::time::Instant;
use rayon::prelude::*;
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::index::Index;
use crate::search::query::{Query, QueryResult};
use crate::sorter::{create_sorter, Match};

struct Partial {
    matches: Vec<Match>,
    result: QueryResult,
}

fn run_one(index: &Index, query: &Query, tag: u32) -> Result<Partial> {
    let tokenizer = index.tokenizer();
    let mut sorter = create_sorter(query, index.schema())?;
    let mut result = QueryResult::default();
    index.query_ex(&tokenizer, index.dictionary().as_ref(), query, &mut result, sorter.as_mut())?;
    Ok(Partial {
        matches: sorter.flatten(Some(tag)),
        result,
    })
}

/// Runs `query` against several indexes in parallel and merges the
/// results as if they were one index.
///
/// Every match is tagged with the position of the index it came from.
/// When the same document matches in more than one index, the match from
/// the later index wins. Indexes that fail are reported as warnings; the
/// query fails only if every index does.
pub fn search_federated(indexes: &[&Index], query: &Query) -> QueryResult {
    let started = Instant::now();
    let Some(first) = indexes.first() else {
        return QueryResult::failed(&Error::query("no indexes to search"));
    };
    let mut merged = match create_sorter(query, first.schema()) {
        Ok(sorter) => sorter,
        Err(e) => return QueryResult::failed(&e),
    };

    let partials: Vec<Result<Partial>> = indexes
        .par_iter()
        .enumerate()
        .map(|(i, index)| run_one(index, query, i as u32))
        .collect();

    let mut result = QueryResult::default();
    let mut failures = Vec::new();
    let mut succeeded = 0usize;
    for (i, partial) in partials.into_iter().enumerate().rev() {
        match partial {
            Ok(partial) => {
                succeeded += 1;
                result.total += partial.result.total;
                if let Some(warning) = partial.result.warning {
                    result.add_warning(format!("index {}: {}", i, warning));
                }
                if result.word_stats.is_empty() {
                    result.word_stats = partial.result.word_stats;
                } else {
                    for (acc, stat) in result.word_stats.iter_mut().zip(partial.result.word_stats) {
                        acc.docs += stat.docs;
                        acc.hits += stat.hits;
                    }
                }
                for m in partial.matches {
                    merged.push_grouped(m);
                }
            }
            Err(e) => {
                warn!(index = %indexes[i].base().display(), error = %e, "federated search failed for index");
                failures.push((i, e));
            }
        }
    }

    if succeeded == 0 {
        let (_, e) = failures.remove(0);
        return QueryResult {
            elapsed: started.elapsed(),
            ..QueryResult::failed(&e)
        };
    }
    for (i, e) in failures.into_iter().rev() {
        result.add_warning(format!("index {}: {}", i, e));
    }

    let matches = merged.flatten(None);
    debug!(indexes = indexes.len(), total = result.total, merged = matches.len(), "federated search finished");
    result.set_window(matches, query.offset, query.limit);
    result.elapsed = started.elapsed();
    result
}
