pub mod core;

// Re-export main types for convenience
pub use core::{
    AccessorOptions, AnnotationRequest, BaseStream, BytesFuture, ChunkStore, ChunkedStream,
    Coordinates, Dict, DocumentAccessor, HttpRangeSource, Lexer, MemoryRangeSource, Name,
    PDFDocument, PDFError, PDFObject, PDFResult, Page, Parser, RangeSource, Ref, Stream, Token,
    XRef, XRefEntry,
};
