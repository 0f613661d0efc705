use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use rayon::slice::ParallelSliceMut;
use tracing::debug;
use crate::core::error::Result;
use crate::core::types::{DocId, HitPos, WordHit};

/// Fixed-size record that can be spilled to a run file.
pub(crate) trait RunRecord: Copy + Ord + Send {
    const SIZE: usize;

    fn encode(&self, out: &mut Vec<u8>);

    fn decode(buf: &[u8]) -> Self;
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

impl RunRecord for WordHit {
    const SIZE: usize = 20;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.word_id.to_le_bytes());
        out.extend_from_slice(&self.doc_id.0.to_le_bytes());
        out.extend_from_slice(&self.pos.0.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        WordHit {
            word_id: u64_at(buf, 0),
            doc_id: DocId(u64_at(buf, 8)),
            pos: HitPos(u32_at(buf, 16)),
        }
    }
}

/// One multi-valued attribute value. Ordering keeps each document's
/// values for one attribute contiguous and sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MvaEntry {
    pub doc_id: DocId,
    pub attr: u32,
    pub value: u32,
}

impl RunRecord for MvaEntry {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.doc_id.0.to_le_bytes());
        out.extend_from_slice(&self.attr.to_le_bytes());
        out.extend_from_slice(&self.value.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        MvaEntry {
            doc_id: DocId(u64_at(buf, 0)),
            attr: u32_at(buf, 8),
            value: u32_at(buf, 12),
        }
    }
}

/// Accumulates records up to a memory budget, spilling sorted runs to
/// anonymous temporary files.
pub(crate) struct RunSpiller<T: RunRecord> {
    dir: PathBuf,
    buffer: Vec<T>,
    limit: usize,
    runs: Vec<File>,
    total: u64,
}

impl<T: RunRecord> RunSpiller<T> {
    pub(crate) fn new(dir: &Path, mem_limit: usize) -> Self {
        RunSpiller {
            dir: dir.to_path_buf(),
            buffer: Vec::new(),
            limit: (mem_limit / std::mem::size_of::<T>()).max(1),
            runs: Vec::new(),
            total: 0,
        }
    }

    pub(crate) fn push(&mut self, record: T) -> Result<()> {
        self.buffer.push(record);
        self.total += 1;
        if self.buffer.len() >= self.limit {
            self.spill()?;
        }
        Ok(())
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.len()
    }

    fn sort_buffer(&mut self) {
        self.buffer.par_sort_unstable();
        self.buffer.dedup();
    }

    fn spill(&mut self) -> Result<()> {
        self.sort_buffer();
        let mut file = tempfile::tempfile_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(&mut file);
            let mut bytes = Vec::with_capacity(T::SIZE * 1024);
            for chunk in self.buffer.chunks(1024) {
                bytes.clear();
                for record in chunk {
                    record.encode(&mut bytes);
                }
                writer.write_all(&bytes)?;
            }
            writer.flush()?;
        }
        file.seek(SeekFrom::Start(0))?;
        debug!(records = self.buffer.len(), run = self.runs.len(), "spilled sorted run");
        self.runs.push(file);
        self.buffer.clear();
        Ok(())
    }

    /// Sorts the in-memory tail and opens a k-way merge over all runs.
    pub(crate) fn into_merge(mut self) -> Result<RunMerger<T>> {
        self.sort_buffer();
        let mut cursors: Vec<RunCursor<T>> = self
            .runs
            .into_iter()
            .map(|f| RunCursor::File(BufReader::new(f), vec![0u8; T::SIZE]))
            .collect();
        cursors.push(RunCursor::Memory(self.buffer.into_iter()));

        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for (i, cursor) in cursors.iter_mut().enumerate() {
            if let Some(record) = cursor.next_record()? {
                heap.push(Reverse((record, i)));
            }
        }
        Ok(RunMerger { cursors, heap, last: None })
    }
}

enum RunCursor<T> {
    File(BufReader<File>, Vec<u8>),
    Memory(std::vec::IntoIter<T>),
}

impl<T: RunRecord> RunCursor<T> {
    fn next_record(&mut self) -> Result<Option<T>> {
        match self {
            RunCursor::Memory(iter) => Ok(iter.next()),
            RunCursor::File(reader, buf) => match reader.read_exact(buf) {
                Ok(()) => Ok(Some(T::decode(buf))),
                Err(e) if e.kind() == IoErrorKind::UnexpectedEof => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }
}

/// Min-heap merge of sorted runs; yields each distinct record once.
pub(crate) struct RunMerger<T: RunRecord> {
    cursors: Vec<RunCursor<T>>,
    heap: BinaryHeap<Reverse<(T, usize)>>,
    last: Option<T>,
}

impl<T: RunRecord> RunMerger<T> {
    pub(crate) fn next_record(&mut self) -> Result<Option<T>> {
        while let Some(Reverse((record, source))) = self.heap.pop() {
            if let Some(next) = self.cursors[source].next_record()? {
                self.heap.push(Reverse((next, source)));
            }
            if self.last == Some(record) {
                continue;
            }
            self.last = Some(record);
            return Ok(Some(record));
        }
        Ok(None)
    }
}
