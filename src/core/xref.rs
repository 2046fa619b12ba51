use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::Parser;
use super::primitives::{Dict, PDFObject, Ref};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    /// Free entry - object number is available for reuse
    Free { next_free: u64, generation: u32 },

    /// In-use entry - object stored at the given byte offset
    InUse { offset: u64, generation: u32 },
}

impl XRefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    pub fn generation(&self) -> u32 {
        match self {
            XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::InUse { generation, .. } => *generation,
        }
    }
}

/// Cross-reference table for a document.
///
/// Maps object numbers to byte offsets so indirect references ("5 0 R") can
/// be resolved. Incrementally updated documents carry a chain of tables:
/// the newest table is parsed first, older tables are reached through the
/// trailer's `/Prev` offset. Entries follow the first-parsed-wins rule (the
/// newest definition of an object shadows older ones) and trailers merge
/// with newest-wins semantics, so an update trailer carrying only
/// `/Size`/`/Prev` still resolves `/Root` through the chain.
pub struct XRef {
    /// Entries indexed by object number
    entries: Vec<Option<XRefEntry>>,

    /// Cache of parsed objects (object number -> object)
    cache: FxHashMap<u32, PDFObject>,

    /// The merged trailer dictionary
    trailer: Dict,

    /// Byte offset of the newest cross-reference table
    startxref: usize,

    /// Stream the document is read from
    stream: Box<dyn BaseStream>,
}

impl XRef {
    /// Parses the cross-reference chain starting at `startxref`.
    pub fn parse(stream: Box<dyn BaseStream>, startxref: usize) -> PDFResult<Self> {
        let mut xref = XRef {
            entries: Vec::new(),
            cache: FxHashMap::default(),
            trailer: Dict::new(),
            startxref,
            stream,
        };

        let mut offset = startxref;
        let mut visited: FxHashSet<usize> = FxHashSet::default();

        loop {
            if !visited.insert(offset) {
                return Err(PDFError::Malformed(format!(
                    "circular /Prev chain at offset {}",
                    offset
                )));
            }

            debug!("parsing xref section at offset {}", offset);
            let section_trailer = xref.parse_section(offset)?;

            // Merge trailers: the newest table's keys win.
            for (key, value) in section_trailer.iter() {
                if !xref.trailer.contains_key(key.as_str()) {
                    xref.trailer.set(key.clone(), value.clone());
                }
            }

            match section_trailer.get("Prev") {
                None => break,
                Some(PDFObject::Number(prev)) if *prev >= 0.0 => offset = *prev as usize,
                Some(other) => {
                    return Err(PDFError::Malformed(format!(
                        "invalid /Prev entry: {:?}",
                        other
                    )));
                }
            }
        }

        if !xref.trailer.contains_key("Size") {
            return Err(PDFError::Malformed("trailer has no /Size".to_string()));
        }

        Ok(xref)
    }

    /// Parses one `xref ... trailer << ... >>` section, recording entries
    /// that are not already defined by a newer section. Returns the
    /// section's own trailer dictionary.
    fn parse_section(&mut self, offset: usize) -> PDFResult<Dict> {
        if offset >= self.stream.length() {
            return Err(PDFError::Malformed(format!(
                "xref offset {} beyond end of file",
                offset
            )));
        }

        let sub = self
            .stream
            .make_sub_stream(offset, self.stream.length() - offset)?;
        let mut parser = Parser::new(Lexer::new(sub)?)?;

        let keyword = parser.get_object()?;
        if !keyword.is_command("xref") {
            return Err(PDFError::Malformed(format!(
                "expected 'xref' keyword at offset {}, got {:?}",
                offset, keyword
            )));
        }

        loop {
            let first_obj = parser.get_object()?;
            if first_obj.is_command("trailer") {
                break;
            }

            let first = match first_obj {
                PDFObject::Number(n) if n >= 0.0 => n as u32,
                other => {
                    return Err(PDFError::Malformed(format!(
                        "expected subsection start or 'trailer', got {:?}",
                        other
                    )));
                }
            };

            let count = match parser.get_object()? {
                PDFObject::Number(n) if n >= 0.0 => n as u32,
                other => {
                    return Err(PDFError::Malformed(format!(
                        "expected subsection count, got {:?}",
                        other
                    )));
                }
            };

            let needed = (first + count) as usize;
            if self.entries.len() < needed {
                self.entries.resize(needed, None);
            }

            for i in 0..count {
                let entry = Self::read_entry(&mut parser)?;
                let slot = &mut self.entries[(first + i) as usize];
                // Newer sections are parsed first; their entries win.
                if slot.is_none() {
                    *slot = Some(entry);
                }
            }
        }

        // The "trailer" keyword was consumed above.
        match parser.get_object()? {
            PDFObject::Dictionary(dict) => Ok(dict),
            other => Err(PDFError::Malformed(format!(
                "expected trailer dictionary, got {:?}",
                other
            ))),
        }
    }

    /// Reads a single entry: `offset generation f|n`.
    fn read_entry(parser: &mut Parser) -> PDFResult<XRefEntry> {
        let offset = match parser.get_object()? {
            PDFObject::Number(n) if n >= 0.0 => n as u64,
            other => {
                return Err(PDFError::Malformed(format!(
                    "expected offset in xref entry, got {:?}",
                    other
                )));
            }
        };

        let generation = match parser.get_object()? {
            PDFObject::Number(n) if n >= 0.0 => n as u32,
            other => {
                return Err(PDFError::Malformed(format!(
                    "expected generation in xref entry, got {:?}",
                    other
                )));
            }
        };

        let kind = parser.get_object()?;
        if kind.is_command("f") {
            Ok(XRefEntry::Free {
                next_free: offset,
                generation,
            })
        } else if kind.is_command("n") {
            Ok(XRefEntry::InUse { offset, generation })
        } else {
            Err(PDFError::Malformed(format!(
                "expected 'f' or 'n' in xref entry, got {:?}",
                kind
            )))
        }
    }

    pub fn get_entry(&self, num: u32) -> Option<&XRefEntry> {
        self.entries.get(num as usize)?.as_ref()
    }

    /// Returns the merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Byte offset of the newest cross-reference table.
    pub fn startxref(&self) -> usize {
        self.startxref
    }

    /// Total object count from the trailer (`/Size`).
    pub fn size(&self) -> PDFResult<u32> {
        match self.trailer.get("Size") {
            Some(PDFObject::Number(n)) if *n >= 0.0 => Ok(*n as u32),
            _ => Err(PDFError::Malformed("trailer /Size is not a number".to_string())),
        }
    }

    /// Fetches an indirect object by reference.
    ///
    /// Parses `N G obj ... endobj` at the recorded offset, validating the
    /// header against the reference. Parsed objects are cached.
    pub fn fetch(&mut self, reference: Ref) -> PDFResult<PDFObject> {
        if let Some(cached) = self.cache.get(&reference.num) {
            return Ok(cached.clone());
        }

        let entry = self.get_entry(reference.num).ok_or_else(|| {
            PDFError::Malformed(format!("object {} not found in xref", reference.num))
        })?;

        let (offset, generation) = match entry {
            XRefEntry::Free { .. } => {
                return Err(PDFError::Malformed(format!(
                    "cannot fetch free object {}",
                    reference.num
                )));
            }
            XRefEntry::InUse { offset, generation } => (*offset as usize, *generation),
        };

        if generation != reference.generation {
            return Err(PDFError::Malformed(format!(
                "generation mismatch for object {}: entry has {}, reference has {}",
                reference.num, generation, reference.generation
            )));
        }

        if offset >= self.stream.length() {
            return Err(PDFError::Malformed(format!(
                "object {} offset {} beyond end of file",
                reference.num, offset
            )));
        }

        let sub = self
            .stream
            .make_sub_stream(offset, self.stream.length() - offset)?;
        let mut parser = Parser::new(Lexer::new(sub)?)?;

        let num = match parser.get_object()? {
            PDFObject::Number(n) if n >= 0.0 => n as u32,
            other => {
                return Err(PDFError::Malformed(format!(
                    "expected object number, got {:?}",
                    other
                )));
            }
        };
        let generation = match parser.get_object()? {
            PDFObject::Number(n) if n >= 0.0 => n as u32,
            other => {
                return Err(PDFError::Malformed(format!(
                    "expected generation number, got {:?}",
                    other
                )));
            }
        };
        if num != reference.num || generation != reference.generation {
            return Err(PDFError::Malformed(format!(
                "object header mismatch: expected {} {}, got {} {}",
                reference.num, reference.generation, num, generation
            )));
        }

        let keyword = parser.get_object()?;
        if !keyword.is_command("obj") {
            return Err(PDFError::Malformed(format!(
                "expected 'obj' keyword, got {:?}",
                keyword
            )));
        }

        let object = parser.get_object()?;
        self.cache.insert(reference.num, object.clone());
        Ok(object)
    }

    /// Resolves one level of indirection: fetches references, passes
    /// direct objects through.
    pub fn fetch_if_ref(&mut self, obj: &PDFObject) -> PDFResult<PDFObject> {
        match obj {
            PDFObject::Ref(r) => self.fetch(*r),
            other => Ok(other.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::Stream;

    fn parse_at(data: &[u8], marker: &[u8]) -> XRef {
        let offset = data
            .windows(marker.len())
            .position(|w| w == marker)
            .expect("marker not found");
        let stream = Box::new(Stream::from_bytes(data.to_vec()));
        XRef::parse(stream, offset).unwrap()
    }

    #[test]
    fn test_parse_simple_table() {
        let data = b"xref\n\
            0 3\n\
            0000000000 65535 f \n\
            0000000015 00000 n \n\
            0000000079 00000 n \n\
            trailer\n\
            << /Size 3 /Root 1 0 R >>\n";

        let xref = parse_at(data, b"xref");
        assert_eq!(xref.len(), 3);
        assert!(xref.get_entry(0).unwrap().is_free());
        assert_eq!(
            xref.get_entry(1),
            Some(&XRefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(xref.size().unwrap(), 3);
        assert_eq!(
            xref.trailer().get("Root"),
            Some(&PDFObject::Ref(Ref::new(1, 0)))
        );
    }

    #[test]
    fn test_fetch_indirect_object() {
        let data = b"1 0 obj\n\
            42\n\
            endobj\n\
            xref\n\
            0 2\n\
            0000000000 65535 f \n\
            0000000000 00000 n \n\
            trailer\n\
            << /Size 2 >>\n";

        let mut xref = parse_at(data, b"xref");
        assert_eq!(xref.fetch(Ref::new(1, 0)).unwrap(), PDFObject::Number(42.0));

        // Cached on second fetch, and fetch_if_ref resolves one level.
        let resolved = xref
            .fetch_if_ref(&PDFObject::Ref(Ref::new(1, 0)))
            .unwrap();
        assert_eq!(resolved, PDFObject::Number(42.0));
        let direct = xref.fetch_if_ref(&PDFObject::Number(7.0)).unwrap();
        assert_eq!(direct, PDFObject::Number(7.0));
    }

    #[test]
    fn test_fetch_generation_mismatch() {
        let data = b"1 0 obj\n42\nendobj\n\
            xref\n\
            0 2\n\
            0000000000 65535 f \n\
            0000000000 00000 n \n\
            trailer\n\
            << /Size 2 >>\n";

        let mut xref = parse_at(data, b"xref");
        assert!(matches!(
            xref.fetch(Ref::new(1, 3)),
            Err(PDFError::Malformed(_))
        ));
    }

    #[test]
    fn test_prev_chain_merges_trailers() {
        // Original document: object 1 = 42, table at "xref", Root in trailer.
        let mut data: Vec<u8> = b"1 0 obj\n42\nendobj\n".to_vec();
        let base_xref = data.len();
        data.extend_from_slice(
            b"xref\n\
              0 2\n\
              0000000000 65535 f \n\
              0000000000 00000 n \n\
              trailer\n\
              << /Size 2 /Root 1 0 R >>\n",
        );

        // Update: object 2 appended, trailer carries only Size and Prev.
        let obj2_offset = data.len();
        data.extend_from_slice(b"2 0 obj\n(new)\nendobj\n");
        let update_xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n2 1\n{:010} 00000 n \ntrailer\n<< /Size 3 /Prev {} >>\n",
                obj2_offset, base_xref
            )
            .as_bytes(),
        );

        let stream = Box::new(Stream::from_bytes(data));
        let mut xref = XRef::parse(stream, update_xref).unwrap();

        // Size from the update, Root through the chain.
        assert_eq!(xref.size().unwrap(), 3);
        assert_eq!(
            xref.trailer().get("Root"),
            Some(&PDFObject::Ref(Ref::new(1, 0)))
        );

        // Both generations of objects resolve.
        assert_eq!(xref.fetch(Ref::new(1, 0)).unwrap(), PDFObject::Number(42.0));
        assert_eq!(
            xref.fetch(Ref::new(2, 0)).unwrap(),
            PDFObject::String(b"new".to_vec())
        );
    }

    #[test]
    fn test_newest_entry_wins() {
        // Object 1 exists in both sections; the update's definition wins.
        let mut data: Vec<u8> = b"1 0 obj\n(old)\nendobj\n".to_vec();
        let base_xref = data.len();
        data.extend_from_slice(
            b"xref\n\
              0 2\n\
              0000000000 65535 f \n\
              0000000000 00000 n \n\
              trailer\n\
              << /Size 2 /Root 1 0 R >>\n",
        );

        let new_obj1 = data.len();
        data.extend_from_slice(b"1 0 obj\n(new)\nendobj\n");
        let update_xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n1 1\n{:010} 00000 n \ntrailer\n<< /Size 2 /Prev {} >>\n",
                new_obj1, base_xref
            )
            .as_bytes(),
        );

        let stream = Box::new(Stream::from_bytes(data));
        let mut xref = XRef::parse(stream, update_xref).unwrap();
        assert_eq!(
            xref.fetch(Ref::new(1, 0)).unwrap(),
            PDFObject::String(b"new".to_vec())
        );
    }

    #[test]
    fn test_circular_prev_chain_detected() {
        let mut data: Vec<u8> = Vec::new();
        let xref_offset = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {} >>\n",
                xref_offset
            )
            .as_bytes(),
        );

        let stream = Box::new(Stream::from_bytes(data));
        assert!(matches!(
            XRef::parse(stream, xref_offset),
            Err(PDFError::Malformed(_))
        ));
    }
}
