use std::fs;
use std::path::Path;
use crate::core::error::{Error, Result};

/// Longest accepted map-from sequence, in bytes
pub const MAX_SYNONYM_LEN: usize = 1024;

/// Synonym entry. `from` holds the normalized map-from token sequence
/// (folded word characters, single spaces between words).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synonym {
    pub from: Vec<u8>,
    pub to: Vec<u8>,
}

impl Synonym {
    pub fn from_len(&self) -> usize {
        self.from.len()
    }

    pub fn to_len(&self) -> usize {
        self.to.len()
    }
}

/// Parses `from => to` lines. Blank lines and `#` comments are skipped.
pub fn parse_synonyms(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (from, to) = line.split_once("=>").ok_or_else(|| {
            Error::config(format!("synonyms line {}: expected 'from => to'", lineno + 1))
        })?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(Error::config(format!(
                "synonyms line {}: empty side in '{}'",
                lineno + 1,
                line
            )));
        }
        if from.len() > MAX_SYNONYM_LEN {
            return Err(Error::config(format!(
                "synonyms line {}: map-from sequence exceeds {} bytes",
                lineno + 1,
                MAX_SYNONYM_LEN
            )));
        }
        if to.split_whitespace().count() != 1 {
            return Err(Error::config(format!(
                "synonyms line {}: map-to must be a single token",
                lineno + 1
            )));
        }
        pairs.push((from.to_string(), to.to_string()));
    }
    Ok(pairs)
}

pub fn load_synonyms_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read synonyms '{}': {}", path.display(), e))
    })?;
    parse_synonyms(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_skips_comments() {
        let pairs = parse_synonyms("# comment\n\nc++ => cplusplus\nnew york => nyc\n").unwrap();
        assert_eq!(pairs, vec![
            ("c++".to_string(), "cplusplus".to_string()),
            ("new york".to_string(), "nyc".to_string()),
        ]);
    }

    #[test]
    fn reports_line_of_malformed_entry() {
        let err = parse_synonyms("a => b\nbroken line\n").unwrap_err();
        assert!(err.context.contains("line 2"));
        assert!(parse_synonyms("a => two words").is_err());
    }
}
