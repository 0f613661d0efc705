pub mod hash_dict;
pub mod morphology;

use std::path::PathBuf;
use serde::{Serialize, Deserialize};
use crate::analysis::Tokenizer;
use crate::core::error::{Error, Result};
use crate::core::types::WordId;

pub use hash_dict::HashDictionary;
pub use morphology::Morphology;

/// Word identifier width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordIdBits {
    Bits32,
    Bits64,
}

impl WordIdBits {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            32 => Ok(WordIdBits::Bits32),
            64 => Ok(WordIdBits::Bits64),
            other => Err(Error::config(format!("word id width must be 32 or 64, got {}", other))),
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            WordIdBits::Bits32 => 32,
            WordIdBits::Bits64 => 64,
        }
    }
}

/// Maps normalized tokens to word ids.
pub trait Dictionary: Send + Sync {
    /// Applies morphology to `word` in place and returns its id, or `None`
    /// when the word is a stopword and must be discarded.
    fn word_id(&self, word: &mut Vec<u8>) -> Option<WordId>;

    /// Id of the exact bytes, never stemmed. Used for prefixes and infixes.
    fn word_id_raw(&self, word: &[u8]) -> Option<WordId>;

    /// Replaces the stopword set with the words found in `files`.
    fn load_stopwords(&mut self, files: &[PathBuf], tokenizer: &Tokenizer<'_>) -> Result<()>;

    fn set_morphology(&mut self, spec: &str) -> Result<()>;

    fn word_id_bits(&self) -> WordIdBits;
}
