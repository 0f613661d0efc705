use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::analysis::charset::{
    parse_ranges, Lowercaser, RemapRange, DEFAULT_SBCS_TABLE, DEFAULT_UTF8_TABLE, FLAG_DUAL,
    FLAG_NGRAM, FLAG_SPECIAL, MASK_CODEPOINT,
};
use crate::analysis::synonym::{load_synonyms_file, Synonym, MAX_SYNONYM_LEN};
use crate::core::error::{Error, Result};
use crate::core::types::MAX_WORD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// One byte per character, codepoints below 256
    Sbcs,
    Utf8,
    /// UTF-8 with n-gram splitting of n-gram characters
    Ngram,
}

/// Immutable tokenizer configuration, shared between a tokenizer and
/// everything spawned from it.
#[derive(Clone)]
pub struct TokenizerSettings {
    kind: TokenizerKind,
    lowercaser: Lowercaser,
    case_folding: String,
    extra_remaps: Vec<RemapRange>,
    specials: String,
    ngram_chars: String,
    ngram_len: usize,
    min_word_len: usize,
    synonym_pairs: Vec<(String, String)>,
    synonyms: Vec<Synonym>,
}

impl TokenizerSettings {
    pub fn new(kind: TokenizerKind) -> Result<Self> {
        let case_folding = match kind {
            TokenizerKind::Sbcs => DEFAULT_SBCS_TABLE,
            TokenizerKind::Utf8 | TokenizerKind::Ngram => DEFAULT_UTF8_TABLE,
        };
        let mut settings = TokenizerSettings {
            kind,
            lowercaser: Lowercaser::new(),
            case_folding: case_folding.to_string(),
            extra_remaps: Vec::new(),
            specials: String::new(),
            ngram_chars: String::new(),
            ngram_len: 1,
            min_word_len: 1,
            synonym_pairs: Vec::new(),
            synonyms: Vec::new(),
        };
        settings.rebuild()?;
        Ok(settings)
    }

    pub fn lowercaser(&self) -> &Lowercaser {
        &self.lowercaser
    }

    pub fn synonyms(&self) -> &[Synonym] {
        &self.synonyms
    }

    /// Recomputes the derived lowercaser and synonym table.
    fn rebuild(&mut self) -> Result<()> {
        let mut lc = Lowercaser::from_config(&self.case_folding)?;
        lc.add_remaps(&self.extra_remaps, 0, 0);
        if self.kind == TokenizerKind::Ngram && !self.ngram_chars.is_empty() {
            lc.add_remaps(&parse_ranges(&self.ngram_chars)?, FLAG_NGRAM, 0);
        }
        lc.add_specials(&self.specials);

        if self.kind == TokenizerKind::Sbcs {
            if let Some(code) = lc.mapped_codes().find(|&c| c > 0xff || lc.fold(c) > 0xff) {
                return Err(Error::config(format!(
                    "single-byte tokenizer cannot map U+{:04X}",
                    code
                )));
            }
        }
        self.lowercaser = lc;

        let mut synonyms = Vec::with_capacity(self.synonym_pairs.len());
        for (from, to) in &self.synonym_pairs {
            let from_key = self.normalize(from.as_bytes());
            let to_key = self.normalize(to.as_bytes());
            if from_key.is_empty() || to_key.is_empty() {
                return Err(Error::config(format!("synonym '{}' normalizes to nothing", from)));
            }
            synonyms.push(Synonym { from: from_key, to: to_key });
        }
        synonyms.sort_by(|a, b| a.from.cmp(&b.from));
        synonyms.dedup_by(|b, a| a.from == b.from);
        self.synonyms = synonyms;
        Ok(())
    }

    #[inline]
    fn decode(&self, buf: &[u8], pos: usize) -> (u32, usize) {
        match self.kind {
            TokenizerKind::Sbcs => (buf[pos] as u32, 1),
            TokenizerKind::Utf8 | TokenizerKind::Ngram => decode_utf8(&buf[pos..]),
        }
    }

    #[inline]
    fn encode(&self, code: u32, out: &mut Vec<u8>) {
        match self.kind {
            TokenizerKind::Sbcs => out.push(code as u8),
            TokenizerKind::Utf8 | TokenizerKind::Ngram => {
                if let Some(c) = char::from_u32(code) {
                    let mut tmp = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                }
            }
        }
    }

    pub fn codepoint_len(&self, token: &[u8]) -> usize {
        match self.kind {
            TokenizerKind::Sbcs => token.len(),
            TokenizerKind::Utf8 | TokenizerKind::Ngram => {
                token.iter().filter(|&&b| (b & 0xc0) != 0x80).count()
            }
        }
    }

    /// Synonym-matching form of a codepoint. `None` is whitespace;
    /// non-word characters are kept verbatim.
    #[inline]
    fn synonym_char(&self, code: u32) -> Option<u32> {
        if matches!(code, 0x09 | 0x0a | 0x0d | 0x20) {
            return None;
        }
        match self.lowercaser.fold(code) {
            0 => Some(code),
            folded => Some(folded),
        }
    }

    /// Folds word characters and collapses whitespace runs to one space.
    fn normalize(&self, text: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(text.len());
        let mut pos = 0;
        let mut space = false;
        while pos < text.len() {
            let (code, width) = self.decode(text, pos);
            pos += width;
            match self.synonym_char(code) {
                None => space = !key.is_empty(),
                Some(c) => {
                    if space {
                        key.push(b' ');
                        space = false;
                    }
                    self.encode(c, &mut key);
                }
            }
        }
        key
    }
}

/// Decodes one UTF-8 sequence. Malformed input decodes as an unmapped
/// codepoint of width 1.
#[inline]
fn decode_utf8(bytes: &[u8]) -> (u32, usize) {
    const INVALID: (u32, usize) = (u32::MAX, 1);
    let lead = bytes[0];
    let (len, init) = match lead {
        0x00..=0x7f => return (lead as u32, 1),
        0xc2..=0xdf => (2, (lead & 0x1f) as u32),
        0xe0..=0xef => (3, (lead & 0x0f) as u32),
        0xf0..=0xf4 => (4, (lead & 0x07) as u32),
        _ => return INVALID,
    };
    if bytes.len() < len {
        return INVALID;
    }
    let mut code = init;
    for &b in &bytes[1..len] {
        if (b & 0xc0) != 0x80 {
            return INVALID;
        }
        code = (code << 6) | (b & 0x3f) as u32;
    }
    (code, len)
}

/// Streaming tokenizer over a borrowed byte buffer.
///
/// Emits lowercased words, single-character tokens for special
/// characters, n-grams for n-gram characters and map-to tokens for
/// matched synonyms.
pub struct Tokenizer<'b> {
    settings: Arc<TokenizerSettings>,
    buf: &'b [u8],
    pos: usize,
    last_chunk: bool,
    word: Vec<u8>,
    word_len: usize,
    in_word: bool,
    out: Vec<u8>,
    last_token_len: usize,
    pending: VecDeque<(Vec<u8>, usize)>,
}

impl<'b> Tokenizer<'b> {
    pub fn new(kind: TokenizerKind) -> Result<Self> {
        Ok(Self::with_settings(Arc::new(TokenizerSettings::new(kind)?)))
    }

    pub fn with_settings(settings: Arc<TokenizerSettings>) -> Self {
        Tokenizer {
            settings,
            buf: &[],
            pos: 0,
            last_chunk: true,
            word: Vec::with_capacity(MAX_WORD_LEN * 4),
            word_len: 0,
            in_word: false,
            out: Vec::with_capacity(MAX_WORD_LEN * 4),
            last_token_len: 0,
            pending: VecDeque::new(),
        }
    }

    /// Fresh tokenizer sharing this one's tables, with its own cursor.
    pub fn spawn<'c>(&self) -> Tokenizer<'c> {
        Tokenizer::with_settings(Arc::clone(&self.settings))
    }

    pub fn settings(&self) -> &Arc<TokenizerSettings> {
        &self.settings
    }

    pub fn kind(&self) -> TokenizerKind {
        self.settings.kind
    }

    pub fn is_utf8(&self) -> bool {
        self.settings.kind != TokenizerKind::Sbcs
    }

    pub fn lowercaser(&self) -> &Lowercaser {
        &self.settings.lowercaser
    }

    pub fn min_word_len(&self) -> usize {
        self.settings.min_word_len
    }

    pub fn codepoint_len(&self, token: &[u8]) -> usize {
        self.settings.codepoint_len(token)
    }

    /// Length in codepoints of the token most recently returned.
    pub fn last_token_len(&self) -> usize {
        self.last_token_len
    }

    // Configuration setters apply to a copy; on error the previous
    // configuration stays in effect.
    fn reconfigure(&mut self, apply: impl FnOnce(&mut TokenizerSettings)) -> Result<()> {
        let mut next = (*self.settings).clone();
        apply(&mut next);
        next.rebuild()?;
        self.settings = Arc::new(next);
        Ok(())
    }

    /// Replaces the case folding table (see [`Lowercaser::from_config`]).
    pub fn set_case_folding(&mut self, config: &str) -> Result<()> {
        let config = config.to_string();
        self.reconfigure(|s| {
            s.case_folding = config;
            s.extra_remaps.clear();
        })
    }

    pub fn add_case_folding(&mut self, range: RemapRange) -> Result<()> {
        self.reconfigure(|s| s.extra_remaps.push(range))
    }

    pub fn add_specials(&mut self, specials: &str) -> Result<()> {
        self.reconfigure(|s| s.specials.push_str(specials))
    }

    pub fn set_min_word_len(&mut self, len: usize) -> Result<()> {
        self.reconfigure(|s| s.min_word_len = len.max(1))
    }

    /// Only meaningful for n-gram tokenizers; others accept and ignore it.
    pub fn set_ngram_chars(&mut self, config: &str) -> Result<()> {
        let config = config.to_string();
        self.reconfigure(|s| s.ngram_chars = config)
    }

    pub fn set_ngram_len(&mut self, len: usize) -> Result<()> {
        self.reconfigure(|s| s.ngram_len = len.max(1))
    }

    pub fn set_synonyms(&mut self, pairs: &[(String, String)]) -> Result<()> {
        if let Some((from, _)) = pairs.iter().find(|(f, _)| f.len() > MAX_SYNONYM_LEN) {
            return Err(Error::config(format!("synonym '{}' is too long", from)));
        }
        let pairs = pairs.to_vec();
        self.reconfigure(|s| s.synonym_pairs = pairs)
    }

    pub fn load_synonyms(&mut self, path: &Path) -> Result<()> {
        let pairs = load_synonyms_file(path)?;
        self.set_synonyms(&pairs)
    }

    /// Points the tokenizer at the next chunk of text. When the previous
    /// chunk was not `last`, an unfinished word carries over.
    pub fn set_buffer(&mut self, buf: &'b [u8], last: bool) {
        if self.last_chunk {
            self.word.clear();
            self.word_len = 0;
            self.in_word = false;
        }
        self.buf = buf;
        self.pos = 0;
        self.last_chunk = last;
    }

    pub fn next_token(&mut self) -> Option<&[u8]> {
        if self.advance() {
            Some(self.out.as_slice())
        } else {
            None
        }
    }

    fn advance(&mut self) -> bool {
        if self.take_pending() {
            return true;
        }
        loop {
            if self.pos >= self.buf.len() {
                return self.last_chunk && self.in_word && self.flush_word();
            }

            if !self.in_word {
                if let Some((idx, end)) = self.match_synonym() {
                    let to = &self.settings.synonyms[idx].to;
                    self.out.clear();
                    self.out.extend_from_slice(to);
                    self.last_token_len = self.settings.codepoint_len(to);
                    self.pos = end;
                    return true;
                }
            }

            let (code, width) = self.settings.decode(self.buf, self.pos);
            let folded = self.settings.lowercaser.to_lower(code);

            if folded == 0 {
                self.pos += width;
                if self.in_word && self.flush_word() {
                    return true;
                }
                continue;
            }

            if folded & FLAG_NGRAM != 0 {
                if self.in_word {
                    if self.flush_word() {
                        return true;
                    }
                    continue;
                }
                self.split_ngrams();
                if self.take_pending() {
                    return true;
                }
                continue;
            }

            let dual_in_word = folded & FLAG_DUAL != 0 && self.in_word;
            if folded & FLAG_SPECIAL != 0 && !dual_in_word {
                if self.in_word {
                    if self.flush_word() {
                        return true;
                    }
                    continue;
                }
                self.pos += width;
                self.out.clear();
                self.settings.encode(folded & MASK_CODEPOINT, &mut self.out);
                self.last_token_len = 1;
                return true;
            }

            if self.word_len < MAX_WORD_LEN {
                self.settings.encode(folded & MASK_CODEPOINT, &mut self.word);
                self.word_len += 1;
            }
            self.in_word = true;
            self.pos += width;
        }
    }

    fn take_pending(&mut self) -> bool {
        match self.pending.pop_front() {
            Some((token, len)) => {
                self.out = token;
                self.last_token_len = len;
                true
            }
            None => false,
        }
    }

    fn flush_word(&mut self) -> bool {
        self.in_word = false;
        let len = std::mem::take(&mut self.word_len);
        if len < self.settings.min_word_len {
            self.word.clear();
            return false;
        }
        std::mem::swap(&mut self.out, &mut self.word);
        self.word.clear();
        self.last_token_len = len;
        true
    }

    fn split_ngrams(&mut self) {
        let mut run = Vec::new();
        while self.pos < self.buf.len() {
            let (code, width) = self.settings.decode(self.buf, self.pos);
            let folded = self.settings.lowercaser.to_lower(code);
            if folded & FLAG_NGRAM == 0 {
                break;
            }
            run.push(folded & MASK_CODEPOINT);
            self.pos += width;
        }

        let n = self.settings.ngram_len;
        let windows: Vec<&[u32]> = if run.len() <= n {
            vec![run.as_slice()]
        } else {
            run.windows(n).collect()
        };
        for gram in windows {
            let mut token = Vec::with_capacity(gram.len() * 3);
            for &c in gram {
                self.settings.encode(c, &mut token);
            }
            self.pending.push_back((token, gram.len()));
        }
    }

    /// Longest synonym starting at the cursor, as (index, end offset).
    fn match_synonym(&self) -> Option<(usize, usize)> {
        let settings = &self.settings;
        if settings.synonyms.is_empty() {
            return None;
        }

        let mut key: Vec<u8> = Vec::new();
        let mut pos = self.pos;
        let mut space = false;
        let mut best = None;
        while pos < self.buf.len() && key.len() <= MAX_SYNONYM_LEN {
            let (code, width) = settings.decode(self.buf, pos);
            pos += width;
            let c = match settings.synonym_char(code) {
                Some(c) => c,
                None if key.is_empty() => return None,
                None => {
                    space = true;
                    continue;
                }
            };
            if space {
                key.push(b' ');
                space = false;
            }
            settings.encode(c, &mut key);

            let at = settings.synonyms.partition_point(|s| s.from.as_slice() < key.as_slice());
            match settings.synonyms.get(at) {
                Some(syn) if syn.from.starts_with(&key) => {
                    if syn.from == key && self.ends_at_boundary(pos, code) {
                        best = Some((at, pos));
                    }
                }
                _ => break,
            }
        }
        best
    }

    fn ends_at_boundary(&self, pos: usize, last_code: u32) -> bool {
        if pos >= self.buf.len() {
            return true;
        }
        let lc = &self.settings.lowercaser;
        let (next, _) = self.settings.decode(self.buf, pos);
        lc.to_lower(next) == 0 || lc.to_lower(last_code) == 0
    }
}

pub fn create_sbcs_tokenizer<'b>() -> Result<Tokenizer<'b>> {
    Tokenizer::new(TokenizerKind::Sbcs)
}

pub fn create_utf8_tokenizer<'b>() -> Result<Tokenizer<'b>> {
    Tokenizer::new(TokenizerKind::Utf8)
}

pub fn create_ngram_tokenizer<'b>() -> Result<Tokenizer<'b>> {
    Tokenizer::new(TokenizerKind::Ngram)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(tok: &mut Tokenizer<'_>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(t) = tok.next_token() {
            out.push(String::from_utf8_lossy(t).into_owned());
        }
        out
    }

    #[test]
    fn splits_and_lowercases_words() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_buffer(b"The Quick, brown FOX!", true);
        assert_eq!(tokens(&mut tok), ["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn folds_cyrillic_in_utf8_mode() {
        let mut tok = create_utf8_tokenizer().unwrap();
        let text = "ПРИВЕТ мир";
        tok.set_buffer(text.as_bytes(), true);
        assert_eq!(tokens(&mut tok), ["привет", "мир"]);
        assert_eq!(tok.last_token_len(), 3);
    }

    #[test]
    fn sbcs_rejects_wide_codepoints() {
        let mut tok = create_sbcs_tokenizer().unwrap();
        assert!(tok.set_case_folding("a..z, U+410").is_err());
        // previous table survives the failed call
        tok.set_buffer(b"Abc", true);
        assert_eq!(tokens(&mut tok), ["abc"]);
    }

    #[test]
    fn min_word_len_drops_short_words_but_not_specials() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_min_word_len(3).unwrap();
        tok.add_specials("+").unwrap();
        tok.set_buffer(b"a bc def + g", true);
        assert_eq!(tokens(&mut tok), ["def", "+"]);
    }

    #[test]
    fn specials_split_words_and_duals_stay_inside() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_case_folding("a..z, -").unwrap();
        tok.add_specials("+-").unwrap();
        tok.set_buffer(b"c+d x-y -z", true);
        assert_eq!(tokens(&mut tok), ["c", "+", "d", "x-y", "-", "z"]);
    }

    #[test]
    fn long_words_are_truncated() {
        let mut tok = create_utf8_tokenizer().unwrap();
        let word = "a".repeat(100);
        tok.set_buffer(word.as_bytes(), true);
        let t = tok.next_token().unwrap().len();
        assert_eq!(t, MAX_WORD_LEN);
        assert_eq!(tok.next_token(), None);
    }

    #[test]
    fn partial_word_carries_across_buffers() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_buffer(b"hello wo", false);
        assert_eq!(tokens(&mut tok), ["hello"]);
        tok.set_buffer(b"rld again", true);
        assert_eq!(tokens(&mut tok), ["world", "again"]);
    }

    #[test]
    fn ngram_characters_become_unigrams() {
        let mut tok = create_ngram_tokenizer().unwrap();
        tok.set_ngram_chars("U+4E00..U+9FFF").unwrap();
        tok.set_buffer("abc 中文字 def".as_bytes(), true);
        assert_eq!(tokens(&mut tok), ["abc", "中", "文", "字", "def"]);
    }

    #[test]
    fn bigrams_slide_over_runs() {
        let mut tok = create_ngram_tokenizer().unwrap();
        tok.set_ngram_chars("U+4E00..U+9FFF").unwrap();
        tok.set_ngram_len(2).unwrap();
        tok.set_buffer("中文字".as_bytes(), true);
        assert_eq!(tokens(&mut tok), ["中文", "文字"]);
    }

    #[test]
    fn synonyms_replace_longest_match() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_synonyms(&[
            ("c++".to_string(), "cplusplus".to_string()),
            ("New York".to_string(), "nyc".to_string()),
            ("new".to_string(), "fresh".to_string()),
        ])
        .unwrap();
        tok.set_buffer(b"I like C++ in new  york, new things", true);
        assert_eq!(tokens(&mut tok), ["i", "like", "cplusplus", "in", "nyc", "fresh", "things"]);
    }

    #[test]
    fn synonym_needs_word_boundary() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_synonyms(&[("new".to_string(), "fresh".to_string())]).unwrap();
        tok.set_buffer(b"newest", true);
        assert_eq!(tokens(&mut tok), ["newest"]);
    }

    #[test]
    fn spawned_tokenizer_shares_tables_not_cursor() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_min_word_len(2).unwrap();
        tok.set_buffer(b"one two", true);
        assert_eq!(tok.next_token(), Some(&b"one"[..]));

        let mut other = tok.spawn();
        other.set_buffer(b"x three", true);
        assert_eq!(tokens(&mut other), ["three"]);
        assert_eq!(tok.next_token(), Some(&b"two"[..]));
    }

    #[test]
    fn malformed_utf8_is_a_separator() {
        let mut tok = create_utf8_tokenizer().unwrap();
        tok.set_buffer(b"ab\xffcd", true);
        assert_eq!(tokens(&mut tok), ["ab", "cd"]);
    }
}
