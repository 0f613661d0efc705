use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use fst::Map;
use memmap2::{Mmap, MmapOptions};
use tracing::{debug, info};
use crate::analysis::{Tokenizer, TokenizerSettings};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, WordId};
use crate::dict::Dictionary;
use crate::index::attrs::{AttrBlock, AttrStore, AttrUpdate};
use crate::index::codec::{read_u32_le, ByteCursor};
use crate::index::format::{word_key, Docinfo, IndexFile, IndexHeader, WordEntry};
use crate::schema::{Row, Schema};

const PAGE_SIZE: usize = 4096;

/// Read-only file contents, memory-mapped when non-empty.
enum FileBlob {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl FileBlob {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::io(format!("failed to open '{}': {}", path.display(), e))
        })?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(FileBlob::Owned(Vec::new()));
        }
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(FileBlob::Mapped(mmap))
    }

    fn data(&self) -> &[u8] {
        match self {
            FileBlob::Mapped(mmap) => &mmap[..],
            FileBlob::Owned(bytes) => bytes,
        }
    }

    /// Reads one byte per page so the data is resident.
    fn touch(&self) -> usize {
        let data = self.data();
        let mut sum = 0u8;
        for offset in (0..data.len()).step_by(PAGE_SIZE) {
            sum = sum.wrapping_add(data[offset]);
        }
        std::hint::black_box(sum);
        data.len()
    }
}

/// One document of a word's doclist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    /// Inline row words (empty unless docinfo is inline)
    pub inline_row: Vec<u32>,
    pub hitlist_offset: u64,
    pub hits: u32,
}

/// Sequential reader over one word's doclist.
pub struct DoclistReader<'a> {
    cursor: ByteCursor<'a>,
    row_size: usize,
    last_doc: u64,
    last_hitlist: u64,
    done: bool,
}

impl<'a> DoclistReader<'a> {
    pub fn next_posting(&mut self) -> Result<Option<Posting>> {
        if self.done {
            return Ok(None);
        }
        let delta = self.cursor.read_vbyte()?;
        if delta == 0 {
            self.done = true;
            return Ok(None);
        }
        self.last_doc += delta;
        let mut inline_row = Vec::with_capacity(self.row_size);
        for _ in 0..self.row_size {
            inline_row.push(self.cursor.read_vbyte_u32()?);
        }
        self.last_hitlist += self.cursor.read_vbyte()?;
        let hits = self.cursor.read_vbyte_u32()?;
        Ok(Some(Posting {
            doc_id: DocId(self.last_doc),
            inline_row,
            hitlist_offset: self.last_hitlist,
            hits,
        }))
    }
}

impl Iterator for DoclistReader<'_> {
    type Item = Result<Posting>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_posting().transpose()
    }
}

/// Opened on-disk index.
///
/// The header, schema and word directory are loaded at open time; the
/// posting files are memory-mapped and paged in lazily unless
/// [`Index::preread`] is called.
pub struct Index {
    base: PathBuf,
    header: IndexHeader,
    word_map: Map<Vec<u8>>,
    entries: FileBlob,
    doclists: FileBlob,
    hitlists: FileBlob,
    mva: Vec<u32>,
    attrs: AttrStore,
    tokenizer: Arc<TokenizerSettings>,
    dict: Arc<dyn Dictionary>,
    preread: AtomicBool,
}

impl Index {
    pub fn open(base: &Path) -> Result<Self> {
        let header = IndexHeader::read(base)?;
        let tokenizer = header.analysis.create_tokenizer()?;
        let dict = header.analysis.create_dictionary(&tokenizer)?;
        Self::open_with(base, header, Arc::clone(tokenizer.settings()), dict)
    }

    /// Opens with caller-supplied analysis components. The dictionary
    /// must produce ids of the width recorded in the header.
    pub fn open_with_analysis(base: &Path, tokenizer: &Tokenizer<'_>, dict: Arc<dyn Dictionary>) -> Result<Self> {
        let header = IndexHeader::read(base)?;
        Self::open_with(base, header, Arc::clone(tokenizer.settings()), dict)
    }

    fn open_with(
        base: &Path,
        header: IndexHeader,
        tokenizer: Arc<TokenizerSettings>,
        dict: Arc<dyn Dictionary>,
    ) -> Result<Self> {
        if dict.word_id_bits() != header.word_id_bits {
            return Err(Error::config(format!(
                "dictionary produces {}-bit ids, index '{}' uses {}-bit ids",
                dict.word_id_bits().bits(),
                base.display(),
                header.word_id_bits.bits()
            )));
        }

        let word_map = Map::new(fs::read(IndexFile::WordMap.path(base))?)?;
        let entries = FileBlob::open(&IndexFile::WordEntries.path(base))?;
        if entries.data().len() % WordEntry::SIZE != 0 || entries.data().len() / WordEntry::SIZE != word_map.len() {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("word directory of '{}' is inconsistent", base.display()),
            ));
        }
        let doclists = FileBlob::open(&IndexFile::Doclists.path(base))?;
        let hitlists = FileBlob::open(&IndexFile::Hitlists.path(base))?;

        let mva_bytes = fs::read(IndexFile::Mva.path(base))?;
        let mva = (0..mva_bytes.len() / 4)
            .map(|i| read_u32_le(&mva_bytes, i * 4))
            .collect::<Result<Vec<u32>>>()?;

        let block = match header.docinfo {
            Docinfo::Extern => AttrBlock::load(&IndexFile::Attrs.path(base), header.schema.row_size())?,
            Docinfo::Inline | Docinfo::None => AttrBlock::empty(header.schema.row_size()),
        };

        debug!(
            index = %base.display(),
            words = word_map.len(),
            documents = header.total_documents,
            "index opened"
        );
        Ok(Index {
            base: base.to_path_buf(),
            header,
            word_map,
            entries,
            doclists,
            hitlists,
            mva,
            attrs: AttrStore::new(block),
            tokenizer,
            dict,
            preread: AtomicBool::new(false),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    pub fn docinfo(&self) -> Docinfo {
        self.header.docinfo
    }

    /// Fresh tokenizer with this index's settings.
    pub fn tokenizer<'b>(&self) -> Tokenizer<'b> {
        Tokenizer::with_settings(Arc::clone(&self.tokenizer))
    }

    pub fn dictionary(&self) -> &Arc<dyn Dictionary> {
        &self.dict
    }

    /// Pages in every data file. Returns the number of bytes touched.
    pub fn preread(&self) -> Result<usize> {
        let bytes = self.entries.touch() + self.doclists.touch() + self.hitlists.touch();
        self.preread.store(true, Ordering::Release);
        info!(index = %self.base.display(), bytes, "preread finished");
        Ok(bytes)
    }

    pub fn is_preread(&self) -> bool {
        self.preread.load(Ordering::Acquire)
    }

    pub fn word_count(&self) -> usize {
        self.word_map.len()
    }

    pub fn word_entry(&self, word_id: WordId) -> Result<Option<WordEntry>> {
        match self.word_map.get(word_key(word_id)) {
            Some(index) => WordEntry::decode(self.entries.data(), index as usize).map(Some),
            None => Ok(None),
        }
    }

    /// All word entries in ascending word id order.
    pub fn word_entries(&self) -> impl Iterator<Item = Result<WordEntry>> + '_ {
        let data = self.entries.data();
        (0..data.len() / WordEntry::SIZE).map(move |i| WordEntry::decode(data, i))
    }

    pub fn doclist(&self, entry: &WordEntry) -> DoclistReader<'_> {
        DoclistReader {
            cursor: ByteCursor::new(self.doclists.data(), entry.doclist_offset as usize),
            row_size: match self.header.docinfo {
                Docinfo::Inline => self.header.schema.row_size(),
                Docinfo::Extern | Docinfo::None => 0,
            },
            last_doc: 0,
            last_hitlist: entry.hitlist_offset,
            done: false,
        }
    }

    /// Packed hit positions of one posting, ascending.
    pub fn positions(&self, posting: &Posting) -> Result<Vec<u32>> {
        let mut cursor = ByteCursor::new(self.hitlists.data(), posting.hitlist_offset as usize);
        let mut positions = Vec::with_capacity(posting.hits as usize);
        let mut pos = 0u32;
        loop {
            let delta = cursor.read_vbyte_u32()?;
            if delta == 0 {
                break;
            }
            pos = pos.checked_add(delta).ok_or_else(|| {
                Error::new(ErrorKind::Parse, format!("hit position overflow in document {}", posting.doc_id.0))
            })?;
            positions.push(pos);
        }
        if positions.len() != posting.hits as usize {
            return Err(Error::new(
                ErrorKind::Parse,
                format!(
                    "document {}: hitlist has {} hits, doclist says {}",
                    posting.doc_id.0,
                    positions.len(),
                    posting.hits
                ),
            ));
        }
        Ok(positions)
    }

    /// Attribute row of a posting, read from the given snapshot when rows
    /// are external.
    pub fn row_for(&self, block: &AttrBlock, posting: &Posting) -> Option<Row> {
        match self.header.docinfo {
            Docinfo::Inline => Some(Row::from_words(posting.inline_row.clone())),
            Docinfo::Extern => block.row_for(posting.doc_id),
            Docinfo::None => Some(Row::new(0)),
        }
    }

    /// Values of a multi-valued attribute given its stored offset.
    pub fn mva_values(&self, offset: u32) -> &[u32] {
        let offset = offset as usize;
        let Some(&count) = self.mva.get(offset) else {
            return &[];
        };
        if offset == 0 {
            return &[];
        }
        self.mva
            .get(offset + 1..offset + 1 + count as usize)
            .unwrap_or(&[])
    }

    /// Every document id stored in the index, ascending.
    pub fn doc_ids(&self) -> Result<Vec<DocId>> {
        if self.header.docinfo == Docinfo::Extern {
            let block = self.attrs.snapshot();
            return Ok((0..block.len()).map(|i| block.doc_id(i)).collect());
        }
        let mut ids = BTreeSet::new();
        for entry in self.word_entries() {
            let entry = entry?;
            for posting in self.doclist(&entry) {
                ids.insert(posting?.doc_id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    pub fn attr_snapshot(&self) -> Arc<AttrBlock> {
        self.attrs.snapshot()
    }

    /// Updates numeric attributes of existing documents. Only external
    /// rows can be updated.
    pub fn update_attributes(&self, update: &AttrUpdate) -> Result<usize> {
        if self.header.docinfo != Docinfo::Extern {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("index '{}' does not keep external attributes", self.base.display()),
            ));
        }
        self.attrs.update(&self.header.schema, update)
    }

    pub fn attrs_updated(&self) -> bool {
        self.attrs.is_updated()
    }

    /// Writes updated attributes back to the row file.
    pub fn save_attributes(&self) -> Result<()> {
        if !self.attrs.is_updated() {
            return Ok(());
        }
        self.attrs.save(&IndexFile::Attrs.path(&self.base))
    }
}
