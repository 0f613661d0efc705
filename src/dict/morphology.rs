use rust_stemmers::{Algorithm, Stemmer};
use crate::core::error::{Error, Result};

/// Maps a morphology name to its stemming algorithm.
fn algorithm_by_name(name: &str) -> Option<Algorithm> {
    let algorithm = match name {
        "stem_en" => Algorithm::English,
        "stem_ru" => Algorithm::Russian,
        "stem_de" => Algorithm::German,
        "stem_fr" => Algorithm::French,
        "stem_es" => Algorithm::Spanish,
        "stem_it" => Algorithm::Italian,
        "stem_pt" => Algorithm::Portuguese,
        "stem_nl" => Algorithm::Dutch,
        "stem_sv" => Algorithm::Swedish,
        "stem_no" => Algorithm::Norwegian,
        "stem_da" => Algorithm::Danish,
        "stem_fi" => Algorithm::Finnish,
        "stem_hu" => Algorithm::Hungarian,
        "stem_ro" => Algorithm::Romanian,
        "stem_tr" => Algorithm::Turkish,
        "stem_el" => Algorithm::Greek,
        "stem_ar" => Algorithm::Arabic,
        _ => return None,
    };
    Some(algorithm)
}

/// Ordered chain of stemmers. The first stemmer that changes a word wins.
pub struct Morphology {
    names: Vec<String>,
    stemmers: Vec<Stemmer>,
}

impl Morphology {
    pub fn none() -> Self {
        Morphology {
            names: Vec::new(),
            stemmers: Vec::new(),
        }
    }

    /// Parses a comma or space separated list such as `"stem_en, stem_ru"`.
    /// `none` (or an empty list) disables stemming.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut morph = Morphology::none();
        for name in spec
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            let name = name.to_ascii_lowercase();
            if name == "none" {
                continue;
            }
            let algorithm = algorithm_by_name(&name)
                .ok_or_else(|| Error::config(format!("unknown morphology '{}'", name)))?;
            if !morph.names.contains(&name) {
                morph.stemmers.push(Stemmer::create(algorithm));
                morph.names.push(name);
            }
        }
        Ok(morph)
    }

    pub fn is_empty(&self) -> bool {
        self.stemmers.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Stems `word` in place. Non UTF-8 input is left alone.
    pub fn apply(&self, word: &mut Vec<u8>) {
        if self.stemmers.is_empty() {
            return;
        }
        let Ok(text) = std::str::from_utf8(word) else {
            return;
        };
        let stemmed = self
            .stemmers
            .iter()
            .map(|s| s.stem(text))
            .find(|s| s.as_ref() != text && !s.is_empty())
            .map(|s| s.into_owned());
        if let Some(stemmed) = stemmed {
            word.clear();
            word.extend_from_slice(stemmed.as_bytes());
        }
    }
}
