use crate::core::error::{Error, ErrorKind, Result};
use crate::schema::schema::AttrLocator;

/// Fixed-width packed attribute row.
///
/// Storage is only reachable through locator-based accessors; the width
/// is fixed at construction and [`Row::resized`] always reallocates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row {
    words: Box<[u32]>,
}

impl Row {
    pub fn new(width: usize) -> Self {
        Row {
            words: vec![0u32; width].into_boxed_slice(),
        }
    }

    pub(crate) fn from_words(words: Vec<u32>) -> Self {
        Row {
            words: words.into_boxed_slice(),
        }
    }

    pub fn width(&self) -> usize {
        self.words.len()
    }

    pub(crate) fn words(&self) -> &[u32] {
        &self.words
    }

    fn check(&self, loc: &AttrLocator) -> Result<()> {
        if !loc.is_valid() || loc.rowitem() >= self.words.len() {
            return Err(Error::new(
                ErrorKind::Internal,
                format!(
                    "locator {}:{} out of bounds for row of {} words",
                    loc.bit_offset,
                    loc.bit_count,
                    self.words.len()
                ),
            ));
        }
        Ok(())
    }

    /// Reads a value through a schema-validated locator. Out of range
    /// locators read as zero.
    #[inline]
    pub fn get(&self, loc: &AttrLocator) -> u32 {
        match self.words.get(loc.rowitem()) {
            Some(&word) if loc.is_whole_word() => word,
            Some(&word) => (word >> loc.shift()) & loc.mask(),
            None => 0,
        }
    }

    pub fn try_get(&self, loc: &AttrLocator) -> Result<u32> {
        self.check(loc)?;
        Ok(self.get(loc))
    }

    #[inline]
    pub fn get_float(&self, loc: &AttrLocator) -> f32 {
        f32::from_bits(self.get(loc))
    }

    /// Writes `value`, truncated to the locator width.
    pub fn set(&mut self, loc: &AttrLocator, value: u32) -> Result<()> {
        self.check(loc)?;
        let item = &mut self.words[loc.rowitem()];
        if loc.is_whole_word() {
            *item = value;
        } else {
            let mask = loc.mask() << loc.shift();
            *item = (*item & !mask) | ((value << loc.shift()) & mask);
        }
        Ok(())
    }

    pub fn set_float(&mut self, loc: &AttrLocator, value: f32) -> Result<()> {
        self.set(loc, value.to_bits())
    }

    /// Copy of this row widened or narrowed to `width` words.
    pub fn resized(&self, width: usize) -> Row {
        let mut words = vec![0u32; width];
        let n = width.min(self.words.len());
        words[..n].copy_from_slice(&self.words[..n]);
        Row::from_words(words)
    }
}
