use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default chunk size: 64KB (same as PDF.js)
pub const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Standardized lock error handling for the shared chunk store.
#[inline]
fn read_store(store: &Arc<RwLock<ChunkStore>>) -> PDFResult<RwLockReadGuard<'_, ChunkStore>> {
    store
        .read()
        .map_err(|_| PDFError::Transport("chunk store lock poisoned".to_string()))
}

#[inline]
pub(crate) fn write_store(
    store: &Arc<RwLock<ChunkStore>>,
) -> PDFResult<RwLockWriteGuard<'_, ChunkStore>> {
    store
        .write()
        .map_err(|_| PDFError::Transport("chunk store lock poisoned".to_string()))
}

/// Tracks which byte ranges of a document are resident.
///
/// The store divides the document into fixed-size chunks and records the
/// data of every chunk that has arrived, either from explicit range fetches
/// or from progressively pushed bytes. Chunks are never evicted: the update
/// path must be able to materialize the complete buffer, so resident data
/// only grows.
pub struct ChunkStore {
    /// Total length of the document in bytes
    total_length: usize,
    /// Size of each chunk in bytes
    chunk_size: usize,
    /// Total number of chunks
    num_chunks: usize,
    /// Resident chunk data (chunk number -> bytes)
    chunks: FxHashMap<usize, Vec<u8>>,
    /// Chunk numbers that are resident
    loaded: FxHashSet<usize>,
    /// Absolute position of the next progressively pushed byte
    progressive_end: usize,
    /// Staging buffer for a partially pushed chunk
    pending: Vec<u8>,
}

impl ChunkStore {
    pub fn new(total_length: usize, chunk_size: Option<usize>) -> Self {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let num_chunks = total_length.div_ceil(chunk_size);

        ChunkStore {
            total_length,
            chunk_size,
            num_chunks,
            chunks: FxHashMap::default(),
            loaded: FxHashSet::default(),
            progressive_end: 0,
            pending: Vec::new(),
        }
    }

    pub fn length(&self) -> usize {
        self.total_length
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn num_chunks_loaded(&self) -> usize {
        self.loaded.len()
    }

    /// Gets the chunk number for a given byte position.
    pub fn chunk_of(&self, pos: usize) -> usize {
        pos / self.chunk_size
    }

    /// The expected byte length of a chunk (the last one may be short).
    fn chunk_len(&self, chunk_num: usize) -> usize {
        let begin = chunk_num * self.chunk_size;
        self.chunk_size.min(self.total_length - begin)
    }

    /// Stores the data of one chunk.
    pub fn on_receive_chunk(&mut self, chunk_num: usize, data: Vec<u8>) -> PDFResult<()> {
        if chunk_num >= self.num_chunks {
            return Err(PDFError::InvalidByteRange {
                begin: chunk_num * self.chunk_size,
                end: (chunk_num + 1) * self.chunk_size,
            });
        }
        if data.len() != self.chunk_len(chunk_num) {
            return Err(PDFError::Transport(format!(
                "chunk {} has length {}, expected {}",
                chunk_num,
                data.len(),
                self.chunk_len(chunk_num)
            )));
        }

        self.loaded.insert(chunk_num);
        self.chunks.insert(chunk_num, data);
        Ok(())
    }

    /// Accepts progressively received bytes.
    ///
    /// Pushed bytes fill the document front to back; complete chunks are
    /// committed immediately, a trailing partial chunk is staged until the
    /// rest of it (or the end of the document) arrives.
    pub fn push_progressive(&mut self, data: &[u8]) -> PDFResult<()> {
        self.pending.extend_from_slice(data);

        loop {
            let chunk_num = self.chunk_of(self.progressive_end);
            if chunk_num >= self.num_chunks {
                if !self.pending.is_empty() {
                    return Err(PDFError::Transport(
                        "received more bytes than the document length".to_string(),
                    ));
                }
                break;
            }
            let need = self.chunk_len(chunk_num);
            if self.pending.len() < need {
                break;
            }
            let rest = self.pending.split_off(need);
            let chunk = std::mem::replace(&mut self.pending, rest);
            self.on_receive_chunk(chunk_num, chunk)?;
            self.progressive_end += need;
        }

        Ok(())
    }

    pub fn has_chunk(&self, chunk_num: usize) -> bool {
        self.loaded.contains(&chunk_num)
    }

    /// Returns true if every chunk covering `[begin, end)` is resident.
    pub fn has_range(&self, begin: usize, end: usize) -> bool {
        if begin >= end || end > self.total_length {
            return false;
        }
        let first = self.chunk_of(begin);
        let last = self.chunk_of(end - 1);
        (first..=last).all(|c| self.loaded.contains(&c))
    }

    pub fn is_complete(&self) -> bool {
        self.loaded.len() == self.num_chunks
    }

    /// Returns the chunk-aligned byte ranges that are missing within
    /// `[begin, end)`, one entry per run of consecutive absent chunks.
    pub fn missing_runs(&self, begin: usize, end: usize) -> Vec<(usize, usize)> {
        let end = end.min(self.total_length);
        if begin >= end {
            return Vec::new();
        }

        let mut runs = Vec::new();
        let mut run_start: Option<usize> = None;
        let first = self.chunk_of(begin);
        let last = self.chunk_of(end - 1);

        for chunk in first..=last {
            if self.loaded.contains(&chunk) {
                if let Some(start) = run_start.take() {
                    runs.push((start * self.chunk_size, chunk * self.chunk_size));
                }
            } else if run_start.is_none() {
                run_start = Some(chunk);
            }
        }
        if let Some(start) = run_start {
            runs.push((
                start * self.chunk_size,
                ((last + 1) * self.chunk_size).min(self.total_length),
            ));
        }

        runs
    }

    /// Reads a single byte, or signals the missing range.
    pub fn byte_at(&self, pos: usize) -> PDFResult<u8> {
        if pos >= self.total_length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let chunk_num = self.chunk_of(pos);
        let chunk = self
            .chunks
            .get(&chunk_num)
            .ok_or(PDFError::DataMissing {
                begin: pos,
                end: pos + 1,
            })?;
        Ok(chunk[pos % self.chunk_size])
    }

    /// Reads `[begin, end)`, or signals the requested range as missing.
    pub fn read_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin >= end || end > self.total_length {
            return Err(PDFError::InvalidByteRange { begin, end });
        }
        if !self.has_range(begin, end) {
            return Err(PDFError::DataMissing { begin, end });
        }

        let mut result = Vec::with_capacity(end - begin);
        let first = self.chunk_of(begin);
        let last = self.chunk_of(end - 1);

        for chunk_num in first..=last {
            let chunk = &self.chunks[&chunk_num];
            let chunk_begin = chunk_num * self.chunk_size;
            let read_start = begin.saturating_sub(chunk_begin);
            let read_end = (end - chunk_begin).min(chunk.len());
            result.extend_from_slice(&chunk[read_start..read_end]);
        }

        Ok(result)
    }

    /// Materializes the complete buffer. Every chunk must be resident.
    pub fn assemble(&self) -> PDFResult<Vec<u8>> {
        if self.total_length == 0 {
            return Ok(Vec::new());
        }
        self.read_range(0, self.total_length)
    }
}

/// A `BaseStream` over a shared, partially-resident chunk store.
///
/// Reads that touch absent chunks return `PDFError::DataMissing` with the
/// absolute file range; the stream performs no I/O of its own. Sub-streams
/// share the store, so a range fetched for one view is resident for all.
pub struct ChunkedStream {
    store: Arc<RwLock<ChunkStore>>,
    /// Absolute offset of this window in the document
    start: usize,
    /// Window length
    length: usize,
    /// Position relative to `start`
    pos: usize,
}

impl ChunkedStream {
    /// Creates a stream covering the whole document tracked by `store`.
    pub fn whole(store: Arc<RwLock<ChunkStore>>) -> PDFResult<Self> {
        let length = read_store(&store)?.length();
        Ok(ChunkedStream {
            store,
            start: 0,
            length,
            pos: 0,
        })
    }

    fn absolute(&self, pos: usize) -> usize {
        self.start + pos
    }
}

impl BaseStream for ChunkedStream {
    fn length(&self) -> usize {
        self.length
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) -> PDFResult<()> {
        if pos > self.length {
            return Err(PDFError::InvalidPosition {
                pos,
                length: self.length,
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn is_data_loaded(&self) -> bool {
        self.store.read().map(|s| s.is_complete()).unwrap_or(false)
    }

    fn get_byte(&mut self) -> PDFResult<u8> {
        if self.pos >= self.length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let byte = read_store(&self.store)?.byte_at(self.absolute(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        if self.pos + length > self.length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let begin = self.absolute(self.pos);
        let bytes = read_store(&self.store)?.read_range(begin, begin + length)?;
        self.pos += length;
        Ok(bytes)
    }

    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin >= end || end > self.length {
            return Err(PDFError::InvalidByteRange { begin, end });
        }
        read_store(&self.store)?.read_range(self.absolute(begin), self.absolute(end))
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>> {
        if start + length > self.length {
            return Err(PDFError::InvalidByteRange {
                begin: start,
                end: start + length,
            });
        }
        Ok(Box::new(ChunkedStream {
            store: Arc::clone(&self.store),
            start: self.start + start,
            length,
            pos: 0,
        }))
    }
}
