pub mod core;
pub mod analysis;
pub mod dict;
pub mod schema;
pub mod source;
pub mod index;
pub mod sorter;
pub mod search;

pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, HitPos, WordId};
pub use crate::index::{merge_indexes, Index, IndexBuilder};
pub use crate::search::{search_federated, Query, QueryResult};

/*
┌──────────────────────────────────────────────────────────────────────────────────────┐
│                              INKDEX STRUCT ARCHITECTURE                              │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── ANALYSIS ────────────────────────────────────────┐
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌────────────────────────────┐  │
│  │ struct Lowercaser    │  │ struct Tokenizer<'b> │  │ trait Dictionary           │  │
│  │ • remap table        │  │ • sbcs / utf8 / ngram│  │ • word_id() (stem + hash)  │  │
│  │ • to_lower()         │  │ • set_buffer()       │  │ • word_id_raw()            │  │
│  │ • ranges, synonyms   │  │ • next_token()       │  │ • stopwords, 32/64 bit ids │  │
│  └──────────────────────┘  └──────────────────────┘  └────────────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── INDEXING ───────────────────────────────────────┐
│  DocumentSource ──next_document()──> fields + Row ──tokenize──> WordHit (word,doc,pos)│
│        │                                                                             │
│        └──> IndexBuilder ──sorted runs (spill)──> k-way merge ──> .spi/.spd/.spp      │
│                   │                                                                  │
│                   ├──> AttrBlock (.spa) + MVA pool (.spm)                            │
│                   └──> IndexHeader (.sph) + word directory (.spk, fst)               │
│                                                                                      │
│  merge_indexes(base, delta, PurgeFilter) ──> new index, delta wins on duplicate ids  │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── SEARCH ────────────────────────────────────────┐
│  Query ──Planner──> Node tree ──roaring candidates──> per-doc hit check ──> Ranker   │
│                                                         │                            │
│                              BoundFilter / GeoLocator ──┤                            │
│                                                         ▼                            │
│                    MatchSorter (PlainSorter | GroupSorter) ──flatten──> QueryResult  │
│                                                                                      │
│  search_federated(indexes) ──rayon──> per-index sorter ──push_grouped──> merged       │
└──────────────────────────────────────────────────────────────────────────────────────┘
*/
