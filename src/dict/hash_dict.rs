use std::fs;
use std::path::PathBuf;
use tracing::debug;
use xxhash_rust::xxh64::xxh64;
use crate::analysis::Tokenizer;
use crate::core::error::{Error, Result};
use crate::core::types::WordId;
use crate::dict::{Dictionary, Morphology, WordIdBits};

/// Hashing dictionary: word ids are CRC32 (32-bit) or xxh64 (64-bit)
/// digests of the normalized token.
///
/// Distinct words may hash to the same id. No string table is kept, so
/// such collisions are never detected; see [`collision_probability`] for
/// the expected rate at a given vocabulary size.
pub struct HashDictionary {
    bits: WordIdBits,
    morphology: Morphology,
    // sorted, deduplicated raw ids
    stopwords: Vec<WordId>,
}

impl HashDictionary {
    pub fn new(bits: WordIdBits) -> Self {
        HashDictionary {
            bits,
            morphology: Morphology::none(),
            stopwords: Vec::new(),
        }
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    #[inline]
    fn hash(&self, word: &[u8]) -> WordId {
        let id = match self.bits {
            WordIdBits::Bits32 => crc32fast::hash(word) as WordId,
            WordIdBits::Bits64 => xxh64(word, 0),
        };
        // zero terminates doclists and never names a word
        if id == 0 { 1 } else { id }
    }

    #[inline]
    fn is_stopword(&self, id: WordId) -> bool {
        !self.stopwords.is_empty() && self.stopwords.binary_search(&id).is_ok()
    }
}

impl Dictionary for HashDictionary {
    fn word_id(&self, word: &mut Vec<u8>) -> Option<WordId> {
        if word.is_empty() || self.is_stopword(self.hash(word)) {
            return None;
        }
        self.morphology.apply(word);
        Some(self.hash(word))
    }

    fn word_id_raw(&self, word: &[u8]) -> Option<WordId> {
        if word.is_empty() {
            return None;
        }
        let id = self.hash(word);
        if self.is_stopword(id) { None } else { Some(id) }
    }

    fn load_stopwords(&mut self, files: &[PathBuf], tokenizer: &Tokenizer<'_>) -> Result<()> {
        let mut ids = Vec::new();
        for path in files {
            let text = fs::read(path).map_err(|e| {
                Error::config(format!("failed to read stopwords '{}': {}", path.display(), e))
            })?;
            let mut tok = tokenizer.spawn();
            tok.set_buffer(&text, true);
            while let Some(token) = tok.next_token() {
                ids.push(self.hash(token));
            }
        }
        ids.sort_unstable();
        ids.dedup();
        debug!(files = files.len(), stopwords = ids.len(), "stopwords loaded");
        self.stopwords = ids;
        Ok(())
    }

    fn set_morphology(&mut self, spec: &str) -> Result<()> {
        self.morphology = Morphology::parse(spec)?;
        Ok(())
    }

    fn word_id_bits(&self) -> WordIdBits {
        self.bits
    }
}

/// Probability that at least two of `words` distinct words share an id
/// (birthday bound).
pub fn collision_probability(words: u64, bits: WordIdBits) -> f64 {
    let n = words as f64;
    let space = 2f64.powi(bits.bits() as i32);
    1.0 - (-(n * (n - 1.0)) / (2.0 * space)).exp()
}
