use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::analysis::{Tokenizer, TokenizerKind};
use crate::core::error::{Error, Result};
use crate::dict::{Dictionary, HashDictionary, WordIdBits};
use crate::index::format::Docinfo;
use crate::source::InfixMode;

/// Text analysis settings. Recorded in the index header so queries
/// tokenize exactly like indexing did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub charset_type: TokenizerKind,
    /// Case folding table; `None` keeps the charset type's default
    pub charset_table: Option<String>,
    /// Characters indexed as standalone single-character tokens
    pub specials: String,
    pub ngram_len: usize,
    pub ngram_chars: String,
    pub synonyms: Option<PathBuf>,
    pub min_word_len: usize,
    pub stopwords: Vec<PathBuf>,
    pub morphology: String,
    pub word_id_bits: u32,
    pub infix_mode: InfixMode,
    pub min_infix_len: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            charset_type: TokenizerKind::Utf8,
            charset_table: None,
            specials: String::new(),
            ngram_len: 1,
            ngram_chars: String::new(),
            synonyms: None,
            min_word_len: 1,
            stopwords: Vec::new(),
            morphology: String::new(),
            word_id_bits: 64,
            infix_mode: InfixMode::None,
            min_infix_len: 0,
        }
    }
}

impl AnalysisSettings {
    pub fn create_tokenizer<'b>(&self) -> Result<Tokenizer<'b>> {
        let mut tokenizer = Tokenizer::new(self.charset_type)?;
        if let Some(table) = &self.charset_table {
            tokenizer.set_case_folding(table)?;
        }
        if !self.specials.is_empty() {
            tokenizer.add_specials(&self.specials)?;
        }
        if self.charset_type == TokenizerKind::Ngram {
            tokenizer.set_ngram_chars(&self.ngram_chars)?;
            tokenizer.set_ngram_len(self.ngram_len)?;
        }
        tokenizer.set_min_word_len(self.min_word_len)?;
        if let Some(path) = &self.synonyms {
            tokenizer.load_synonyms(path)?;
        }
        Ok(tokenizer)
    }

    pub fn create_dictionary(&self, tokenizer: &Tokenizer<'_>) -> Result<Arc<dyn Dictionary>> {
        let mut dict = HashDictionary::new(WordIdBits::from_bits(self.word_id_bits)?);
        dict.set_morphology(&self.morphology)?;
        if !self.stopwords.is_empty() {
            dict.load_stopwords(&self.stopwords, tokenizer)?;
        }
        Ok(Arc::new(dict))
    }
}

/// Build-time configuration of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base path; index files are `<path>.sph`, `<path>.spd`, ...
    pub path: PathBuf,
    /// Hit collection budget before a sorted run is spilled, bytes
    pub mem_limit: usize,
    pub docinfo: Docinfo,
    #[serde(flatten)]
    pub analysis: AnalysisSettings,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            path: PathBuf::from("./data/index"),
            mem_limit: 32 * 1024 * 1024,   // 32MB hit buffer
            docinfo: Docinfo::Extern,
            analysis: AnalysisSettings::default(),
        }
    }
}

impl IndexConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IndexConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config '{}': {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn create_tokenizer<'b>(&self) -> Result<Tokenizer<'b>> {
        self.analysis.create_tokenizer()
    }

    pub fn create_dictionary(&self, tokenizer: &Tokenizer<'_>) -> Result<Arc<dyn Dictionary>> {
        self.analysis.create_dictionary(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::core::error::ErrorKind;

    #[test]
    fn reads_flat_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"path": "/tmp/idx", "docinfo": "inline", "min_word_len": 3, "morphology": "stem_en", "word_id_bits": 32}}"#
        )
        .unwrap();
        let config = IndexConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.docinfo, Docinfo::Inline);
        assert_eq!(config.analysis.min_word_len, 3);
        assert_eq!(config.analysis.charset_type, TokenizerKind::Utf8);
        assert_eq!(config.mem_limit, IndexConfig::default().mem_limit);

        let tokenizer = config.create_tokenizer().unwrap();
        assert_eq!(tokenizer.min_word_len(), 3);
        let dict = config.create_dictionary(&tokenizer).unwrap();
        assert_eq!(dict.word_id_bits(), WordIdBits::Bits32);
    }

    #[test]
    fn bad_settings_surface_as_config_errors() {
        let mut config = IndexConfig::default();
        config.analysis.word_id_bits = 48;
        let tokenizer = config.create_tokenizer().unwrap();
        assert!(config.create_dictionary(&tokenizer).err().unwrap().is_kind(ErrorKind::Config));

        config.analysis.charset_table = Some("a..z->A".to_string());
        assert!(config.create_tokenizer().err().unwrap().is_kind(ErrorKind::Config));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(IndexConfig::from_json_file(file.path()).unwrap_err().is_kind(ErrorKind::Config));
    }
}
