use std::fmt;

/// Universal error type for document access and update operations.
///
/// `DataMissing` is not a failure in the usual sense: it is the recoverable
/// signal that an operation touched a byte range that is not resident yet.
/// The demand-paged accessor catches it, fetches the range, and retries.
/// Every other variant is terminal for the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PDFError {
    /// Bytes in the half-open range `[begin, end)` are not resident yet.
    DataMissing { begin: usize, end: usize },

    /// The retry loop fetched `[begin, end)` and the same range was
    /// signaled again. The document layer is not making progress.
    Stalled { begin: usize, end: usize },

    /// End of stream reached unexpectedly
    UnexpectedEndOfStream,

    /// Invalid byte range requested
    InvalidByteRange { begin: usize, end: usize },

    /// Invalid stream position
    InvalidPosition { pos: usize, length: usize },

    /// Page index outside the document's page range
    InvalidPageIndex { index: usize, count: usize },

    /// The document structure cannot be parsed (bad trailer, broken xref,
    /// syntax errors). Never retried.
    Malformed(String),

    /// A mutation request carried unusable parameters
    InvalidRequest(String),

    /// Network or I/O transport failure
    Transport(String),

    /// A pending fetch was aborted with the given reason
    Aborted(String),

    /// Serialization of an update fragment failed
    Serialize(String),
}

impl fmt::Display for PDFError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PDFError::DataMissing { begin, end } => {
                write!(f, "Data not loaded for byte range {}..{}", begin, end)
            }
            PDFError::Stalled { begin, end } => {
                write!(
                    f,
                    "No progress after fetching byte range {}..{} (range re-signaled)",
                    begin, end
                )
            }
            PDFError::UnexpectedEndOfStream => {
                write!(f, "Unexpected end of stream")
            }
            PDFError::InvalidByteRange { begin, end } => {
                write!(f, "Invalid byte range: {}..{}", begin, end)
            }
            PDFError::InvalidPosition { pos, length } => {
                write!(f, "Invalid position {} for stream of length {}", pos, length)
            }
            PDFError::InvalidPageIndex { index, count } => {
                write!(f, "Page index {} out of range (document has {} pages)", index, count)
            }
            PDFError::Malformed(msg) => {
                write!(f, "Malformed document: {}", msg)
            }
            PDFError::InvalidRequest(msg) => {
                write!(f, "Invalid request: {}", msg)
            }
            PDFError::Transport(msg) => {
                write!(f, "Transport error: {}", msg)
            }
            PDFError::Aborted(reason) => {
                write!(f, "Aborted: {}", reason)
            }
            PDFError::Serialize(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for PDFError {}

impl PDFError {
    /// Returns true if this error is the recoverable missing-range signal.
    pub fn is_data_missing(&self) -> bool {
        matches!(self, PDFError::DataMissing { .. })
    }
}

/// Result type alias for document operations
pub type PDFResult<T> = Result<T, PDFError>;
