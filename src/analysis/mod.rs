pub mod charset;
pub mod synonym;
pub mod tokenizer;

pub use charset::{Lowercaser, RemapRange};
pub use tokenizer::{Tokenizer, TokenizerKind, TokenizerSettings};
