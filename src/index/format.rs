use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use crate::core::config::AnalysisSettings;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::WordId;
use crate::dict::WordIdBits;
use crate::index::codec::{read_u32_le, read_u64_le};
use crate::schema::Schema;

pub const INDEX_MAGIC: u32 = 0x5844_4e49; // "INDX"
pub const INDEX_VERSION: u32 = 1;

/// Where document attribute rows are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Docinfo {
    /// Attributes are not stored
    None,
    /// Row copied into every doclist entry
    Inline,
    /// Separate row file sorted by document id
    Extern,
}

/// Index file kinds, one per extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFile {
    Header,
    WordMap,
    WordEntries,
    Doclists,
    Hitlists,
    Attrs,
    Mva,
}

impl IndexFile {
    pub const ALL: [IndexFile; 7] = [
        IndexFile::Header,
        IndexFile::WordMap,
        IndexFile::WordEntries,
        IndexFile::Doclists,
        IndexFile::Hitlists,
        IndexFile::Attrs,
        IndexFile::Mva,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            IndexFile::Header => "sph",
            IndexFile::WordMap => "spk",
            IndexFile::WordEntries => "spi",
            IndexFile::Doclists => "spd",
            IndexFile::Hitlists => "spp",
            IndexFile::Attrs => "spa",
            IndexFile::Mva => "spm",
        }
    }

    pub fn path(&self, base: &Path) -> PathBuf {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(self.extension());
        PathBuf::from(name)
    }
}

/// Index header, written last so a partially built index never opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub magic: u32,
    pub version: u32,
    pub schema: Schema,
    pub docinfo: Docinfo,
    pub word_id_bits: WordIdBits,
    pub analysis: AnalysisSettings,
    pub total_documents: u64,
    pub total_bytes: u64,
    pub total_words: u64,
    pub total_hits: u64,
    pub min_doc_id: u64,
}

impl IndexHeader {
    pub fn new(schema: Schema, docinfo: Docinfo, analysis: AnalysisSettings) -> Result<Self> {
        let word_id_bits = WordIdBits::from_bits(analysis.word_id_bits)?;
        Ok(IndexHeader {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            schema,
            docinfo,
            word_id_bits,
            analysis,
            total_documents: 0,
            total_bytes: 0,
            total_words: 0,
            total_hits: 0,
            min_doc_id: 0,
        })
    }

    /// Row words stored per document (zero when attributes are not kept).
    pub fn stored_row_size(&self) -> usize {
        match self.docinfo {
            Docinfo::None => 0,
            Docinfo::Inline | Docinfo::Extern => self.schema.row_size(),
        }
    }

    /// Serializes with a trailing CRC32 of the encoded body.
    pub fn write(&self, base: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let mut file = fs::File::create(IndexFile::Header.path(base))?;
        file.write_all(&body)?;
        file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn read(base: &Path) -> Result<Self> {
        let path = IndexFile::Header.path(base);
        let data = fs::read(&path).map_err(|e| {
            Error::io(format!("failed to read header '{}': {}", path.display(), e))
        })?;
        if data.len() < 4 {
            return Err(Error::new(ErrorKind::Parse, format!("header '{}' is truncated", path.display())));
        }
        let (body, crc) = data.split_at(data.len() - 4);
        if crc32fast::hash(body) != read_u32_le(crc, 0)? {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("header '{}' checksum mismatch", path.display()),
            ));
        }
        let header: IndexHeader = bincode::deserialize(body)?;
        if header.magic != INDEX_MAGIC || header.version != INDEX_VERSION {
            return Err(Error::new(
                ErrorKind::Parse,
                format!(
                    "'{}' is not a supported index (magic {:08x}, version {})",
                    path.display(),
                    header.magic,
                    header.version
                ),
            ));
        }
        Ok(header)
    }
}

/// Fixed-width word directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WordEntry {
    pub word_id: WordId,
    pub doclist_offset: u64,
    pub hitlist_offset: u64,
    pub docs: u32,
    pub hits: u32,
}

impl WordEntry {
    pub const SIZE: usize = 32;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.word_id.to_le_bytes());
        out.extend_from_slice(&self.doclist_offset.to_le_bytes());
        out.extend_from_slice(&self.hitlist_offset.to_le_bytes());
        out.extend_from_slice(&self.docs.to_le_bytes());
        out.extend_from_slice(&self.hits.to_le_bytes());
    }

    pub fn decode(data: &[u8], index: usize) -> Result<Self> {
        let at = index * Self::SIZE;
        Ok(WordEntry {
            word_id: read_u64_le(data, at)?,
            doclist_offset: read_u64_le(data, at + 8)?,
            hitlist_offset: read_u64_le(data, at + 16)?,
            docs: read_u32_le(data, at + 24)?,
            hits: read_u32_le(data, at + 28)?,
        })
    }
}

/// Key under which a word id is stored in the word map; big-endian so
/// byte order matches numeric order.
pub fn word_key(word_id: WordId) -> [u8; 8] {
    word_id.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrSource, AttrType};

    #[test]
    fn header_round_trips_and_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("idx");
        let mut schema = Schema::new("idx");
        schema.add_field("title").unwrap();
        schema.add_attr("gid", AttrType::integer(), AttrSource::None).unwrap();
        let mut header = IndexHeader::new(schema, Docinfo::Extern, AnalysisSettings::default()).unwrap();
        header.total_documents = 42;
        header.write(&base).unwrap();

        let back = IndexHeader::read(&base).unwrap();
        assert_eq!(back, header);

        let path = IndexFile::Header.path(&base);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xff;
        fs::write(&path, bytes).unwrap();
        assert!(IndexHeader::read(&base).unwrap_err().is_kind(ErrorKind::Parse));
    }

    #[test]
    fn file_names_append_extensions() {
        let base = Path::new("/data/products.main");
        assert_eq!(IndexFile::Doclists.path(base), PathBuf::from("/data/products.main.spd"));
    }

    #[test]
    fn word_keys_sort_numerically() {
        assert!(word_key(255) < word_key(256));
    }
}
