use super::error::PDFResult;

/// Base trait for byte sources the document layer reads from.
///
/// Implementations are either fully resident (`Stream`) or partially
/// resident (`ChunkedStream`). A partially resident stream reports absent
/// bytes with `PDFError::DataMissing` carrying the absolute file range; it
/// never blocks or performs I/O itself.
///
/// Positions are relative to the stream's own window: a sub-stream created
/// with `make_sub_stream(start, length)` starts at position 0.
pub trait BaseStream {
    /// Returns the total length of the stream in bytes.
    fn length(&self) -> usize;

    /// Returns the current position in the stream.
    fn pos(&self) -> usize;

    /// Sets the current position in the stream.
    fn set_pos(&mut self, pos: usize) -> PDFResult<()>;

    /// Reads and returns a single byte, advancing the position.
    fn get_byte(&mut self) -> PDFResult<u8>;

    /// Reads the specified number of bytes, advancing the position.
    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>>;

    /// Returns a range of bytes without changing the current position.
    ///
    /// `begin` is inclusive, `end` exclusive, both window-relative.
    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>>;

    /// Resets the stream position to the start of its window.
    fn reset(&mut self);

    /// Creates a restricted view into this stream sharing the same bytes.
    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>>;

    /// Returns true if the stream contains no data.
    fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Returns true if every byte of the stream is resident.
    ///
    /// Default implementation returns true. Partially resident streams
    /// override this.
    fn is_data_loaded(&self) -> bool {
        true
    }

    /// Reads a single byte without advancing the position.
    fn peek_byte(&mut self) -> PDFResult<u8> {
        let current_pos = self.pos();
        let byte = self.get_byte()?;
        self.set_pos(current_pos)?;
        Ok(byte)
    }
}
