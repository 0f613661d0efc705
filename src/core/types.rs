use serde::{Serialize, Deserialize};

/// Document identifier. Zero is reserved as the end-of-documents sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// Word identifier produced by the dictionary. Zero never names a word.
pub type WordId = u64;

/// Longest token the tokenizers will accumulate, in codepoints.
pub const MAX_WORD_LEN: usize = 64;

/// Maximum number of full-text fields in one schema.
pub const MAX_FIELDS: usize = 32;

/// Maximum number of distinct words considered per query.
pub const MAX_QUERY_WORDS: usize = 10;

const FIELD_SHIFT: u32 = 24;
const POS_MASK: u32 = (1 << FIELD_SHIFT) - 1;

/// Packed in-document position: field index in the top byte, 1-based
/// in-field position below it. Hits from different fields can never be
/// adjacent, which keeps phrase matching inside one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HitPos(pub u32);

impl HitPos {
    pub fn new(field: usize, pos: u32) -> Self {
        HitPos(((field as u32) << FIELD_SHIFT) | (pos & POS_MASK))
    }

    pub fn field(&self) -> usize {
        (self.0 >> FIELD_SHIFT) as usize
    }

    pub fn pos(&self) -> u32 {
        self.0 & POS_MASK
    }

    pub fn max_in_field() -> u32 {
        POS_MASK
    }
}

/// One occurrence of a word in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordHit {
    // field order matters: derived Ord sorts by (word, doc, pos)
    pub word_id: WordId,
    pub doc_id: DocId,
    pub pos: HitPos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_pos_packs_field_above_position() {
        let p = HitPos::new(3, 17);
        assert_eq!(p.field(), 3);
        assert_eq!(p.pos(), 17);
        assert!(HitPos::new(1, HitPos::max_in_field()) < HitPos::new(2, 1));
    }

    #[test]
    fn hits_order_by_word_then_doc_then_pos() {
        let a = WordHit { word_id: 1, doc_id: DocId(9), pos: HitPos::new(0, 5) };
        let b = WordHit { word_id: 2, doc_id: DocId(1), pos: HitPos::new(0, 1) };
        let c = WordHit { word_id: 1, doc_id: DocId(9), pos: HitPos::new(1, 1) };
        let mut hits = vec![b, c, a];
        hits.sort();
        assert_eq!(hits, vec![a, c, b]);
    }
}
