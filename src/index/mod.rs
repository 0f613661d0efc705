pub mod attrs;
pub mod builder;
pub mod codec;
pub mod format;
pub mod merge;
pub mod reader;
pub(crate) mod spill;
pub(crate) mod writer;

pub use attrs::{AttrBlock, AttrStore, AttrUpdate};
pub use builder::{BuildReport, IndexBuilder};
pub use format::{Docinfo, IndexHeader, WordEntry};
pub use merge::{merge_indexes, MergeReport, PurgeFilter};
pub use reader::{Index, Posting};
