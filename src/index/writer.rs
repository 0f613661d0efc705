use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use fst::MapBuilder;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, WordId};
use crate::index::codec::VByte;
use crate::index::format::{word_key, IndexFile, WordEntry};

struct CountingWriter {
    inner: BufWriter<File>,
    offset: u64,
}

impl CountingWriter {
    fn create(path: &Path) -> Result<Self> {
        Ok(CountingWriter {
            inner: BufWriter::new(File::create(path)?),
            offset: 0,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;
        Ok(())
    }
}

/// Totals reported once all words are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterTotals {
    pub words: u64,
    pub hits: u64,
}

/// Streams postings into the word map, word directory, doclist and
/// hitlist files. Words must arrive in ascending id order and documents
/// in ascending id order within a word.
pub(crate) struct PostingWriter {
    doclists: CountingWriter,
    hitlists: CountingWriter,
    entries: BufWriter<File>,
    word_map: MapBuilder<BufWriter<File>>,
    inline_row_size: usize,
    current: Option<WordEntry>,
    last_doc: u64,
    last_hitlist: u64,
    totals: WriterTotals,
    scratch: Vec<u8>,
}

impl PostingWriter {
    pub(crate) fn create(base: &Path, inline_row_size: usize) -> Result<Self> {
        let word_map = MapBuilder::new(BufWriter::new(File::create(IndexFile::WordMap.path(base))?))?;
        Ok(PostingWriter {
            doclists: CountingWriter::create(&IndexFile::Doclists.path(base))?,
            hitlists: CountingWriter::create(&IndexFile::Hitlists.path(base))?,
            entries: BufWriter::new(File::create(IndexFile::WordEntries.path(base))?),
            word_map,
            inline_row_size,
            current: None,
            last_doc: 0,
            last_hitlist: 0,
            totals: WriterTotals::default(),
            scratch: Vec::with_capacity(256),
        })
    }

    /// Appends one document's occurrences of `word_id`. `positions` are
    /// packed hit positions, strictly ascending and non-zero.
    pub(crate) fn write_doc(&mut self, word_id: WordId, doc_id: DocId, row: &[u32], positions: &[u32]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        if row.len() != self.inline_row_size {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("inline row has {} words, expected {}", row.len(), self.inline_row_size),
            ));
        }

        match self.current {
            Some(entry) if entry.word_id == word_id => {
                if doc_id.0 <= self.last_doc {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        format!("document {} out of order in word {}", doc_id.0, word_id),
                    ));
                }
            }
            Some(entry) if entry.word_id > word_id => {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("word {} written after {}", word_id, entry.word_id),
                ));
            }
            _ => {
                self.finish_word()?;
                self.current = Some(WordEntry {
                    word_id,
                    doclist_offset: self.doclists.offset,
                    hitlist_offset: self.hitlists.offset,
                    docs: 0,
                    hits: 0,
                });
                self.last_doc = 0;
                self.last_hitlist = self.hitlists.offset;
            }
        }

        let hitlist_start = self.hitlists.offset;
        self.scratch.clear();
        let mut prev = 0u32;
        for &pos in positions {
            if pos <= prev {
                return Err(Error::new(
                    ErrorKind::Internal,
                    format!("positions not ascending in document {}", doc_id.0),
                ));
            }
            VByte::encode_u32(&mut self.scratch, pos - prev);
            prev = pos;
        }
        VByte::encode_u32(&mut self.scratch, 0);
        self.hitlists.write(&self.scratch)?;

        self.scratch.clear();
        VByte::encode_u64(&mut self.scratch, doc_id.0 - self.last_doc);
        for &word in row {
            VByte::encode_u32(&mut self.scratch, word);
        }
        VByte::encode_u64(&mut self.scratch, hitlist_start - self.last_hitlist);
        VByte::encode_u32(&mut self.scratch, positions.len() as u32);
        self.doclists.write(&self.scratch)?;

        self.last_doc = doc_id.0;
        self.last_hitlist = hitlist_start;
        if let Some(entry) = self.current.as_mut() {
            entry.docs += 1;
            entry.hits += positions.len() as u32;
        }
        self.totals.hits += positions.len() as u64;
        Ok(())
    }

    fn finish_word(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };
        self.doclists.write(&[0])?;
        self.scratch.clear();
        entry.encode(&mut self.scratch);
        self.entries.write_all(&self.scratch)?;
        self.word_map.insert(word_key(entry.word_id), self.totals.words)?;
        self.totals.words += 1;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<WriterTotals> {
        self.finish_word()?;
        self.doclists.finish()?;
        self.hitlists.finish()?;
        self.entries.flush()?;
        let mut map_file = self.word_map.into_inner()?;
        map_file.flush()?;
        Ok(self.totals)
    }
}
