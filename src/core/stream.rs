use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use std::sync::Arc;

/// A fully-resident in-memory stream.
///
/// The underlying data is stored in an `Arc`, so sub-streams share the
/// same buffer without copying. This is the byte source behind local and
/// layered documents, and behind every document once its bytes are
/// completely materialized.
pub struct Stream {
    /// The underlying byte buffer (shared)
    bytes: Arc<Vec<u8>>,
    /// Starting offset of this window in the buffer
    start: usize,
    /// Length of the window
    length: usize,
    /// Current read position, relative to `start`
    pos: usize,
}

impl Stream {
    /// Creates a stream over an owned byte vector.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_shared(Arc::new(bytes))
    }

    /// Creates a stream over an already-shared buffer.
    pub fn from_shared(bytes: Arc<Vec<u8>>) -> Self {
        let length = bytes.len();
        Stream {
            bytes,
            start: 0,
            length,
            pos: 0,
        }
    }

    fn window(bytes: Arc<Vec<u8>>, start: usize, length: usize) -> Self {
        Stream {
            bytes,
            start,
            length,
            pos: 0,
        }
    }
}

impl BaseStream for Stream {
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

    fn get_byte(&mut self) -> PDFResult<u8> {
        if self.pos >= self.length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let byte = self.bytes[self.start + self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>> {
        if self.pos + length > self.length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let begin = self.start + self.pos;
        let bytes = self.bytes[begin..begin + length].to_vec();
        self.pos += length;
        Ok(bytes)
    }

    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin >= end || end > self.length {
            return Err(PDFError::InvalidByteRange { begin, end });
        }
        Ok(self.bytes[self.start + begin..self.start + end].to_vec())
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
        Ok(Box::new(Stream::window(
            Arc::clone(&self.bytes),
            self.start + start,
            length,
        )))
    }
}
