pub mod accessor;
pub mod base_stream;
pub mod chunked_stream;
pub mod document;
pub mod error;
pub mod lexer;
pub mod page;
pub mod parser;
pub mod primitives;
pub mod range_source;
pub mod serialize;
pub mod stream;
pub mod writer;
pub mod xref;

pub use accessor::{AccessorOptions, BytesFuture, DocumentAccessor};
pub use base_stream::BaseStream;
pub use chunked_stream::{ChunkStore, ChunkedStream, DEFAULT_CHUNK_SIZE};
pub use document::PDFDocument;
pub use error::{PDFError, PDFResult};
pub use lexer::{Lexer, Token};
pub use page::Page;
pub use parser::Parser;
pub use primitives::{Dict, Name, PDFObject, Ref};
pub use range_source::{HttpRangeSource, MemoryRangeSource, RangeSource};
pub use stream::Stream;
pub use writer::{AnnotationRequest, Coordinates};
pub use xref::{XRef, XRefEntry};
