use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use super::page::Page;
use super::primitives::{Dict, PDFObject, Ref};
use super::xref::XRef;
use log::warn;
use rustc_hash::FxHashMap;

/// Upper bound on page-tree nesting, guards against reference cycles.
const MAX_TREE_DEPTH: usize = 64;

/// Default view rectangle (US Letter) for pages without a resolvable
/// MediaBox anywhere in their inheritance chain.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A parsed PDF document.
///
/// Wraps a byte stream (resident or demand-paged) and exposes the object
/// graph: trailer, catalog, page tree. Every accessor can surface
/// `PDFError::DataMissing` when the stream is only partially resident;
/// operations are idempotent and safe to re-invoke after the missing range
/// arrives, which is what the demand-paged accessor does.
pub struct PDFDocument {
    /// The cross-reference table (owns the stream)
    xref: XRef,

    /// The document catalog (root dictionary)
    catalog: Dict,

    /// Pages already located in the page tree, by index
    page_cache: FxHashMap<usize, Page>,
}

impl PDFDocument {
    /// Opens a document from a byte stream.
    ///
    /// Locates `startxref` near the end of the stream, parses the
    /// cross-reference chain and loads the catalog.
    pub fn open(stream: Box<dyn BaseStream>) -> PDFResult<Self> {
        let startxref = Self::find_startxref(&*stream)?;
        let mut xref = XRef::parse(stream, startxref)?;
        let catalog = Self::load_catalog(&mut xref)?;

        Ok(PDFDocument {
            xref,
            catalog,
            page_cache: FxHashMap::default(),
        })
    }

    /// Re-parses the document from a new stream whose bytes are the old
    /// document plus an appended incremental update. The object table is
    /// extended (the new trailer chains to the old one); caches are
    /// dropped.
    pub fn update(&mut self, stream: Box<dyn BaseStream>) -> PDFResult<()> {
        let startxref = Self::find_startxref(&*stream)?;
        let mut xref = XRef::parse(stream, startxref)?;
        let catalog = Self::load_catalog(&mut xref)?;

        self.xref = xref;
        self.catalog = catalog;
        self.page_cache.clear();
        Ok(())
    }

    /// Finds the byte offset of the newest cross-reference table.
    ///
    /// Searches the last KiB of the stream for the final `startxref`
    /// keyword and reads the decimal offset that follows it.
    fn find_startxref(stream: &dyn BaseStream) -> PDFResult<usize> {
        let length = stream.length();
        if length == 0 {
            return Err(PDFError::Malformed("empty document".to_string()));
        }

        let tail_start = length.saturating_sub(1024);
        let tail = stream.get_byte_range(tail_start, length)?;

        let keyword = b"startxref";
        let pos = tail
            .windows(keyword.len())
            .rposition(|window| window == keyword)
            .ok_or_else(|| PDFError::Malformed("startxref not found".to_string()))?;

        let mut cursor = pos + keyword.len();
        while cursor < tail.len() && tail[cursor].is_ascii_whitespace() {
            cursor += 1;
        }

        let digits_start = cursor;
        while cursor < tail.len() && tail[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if digits_start == cursor {
            return Err(PDFError::Malformed(
                "no offset after startxref".to_string(),
            ));
        }

        let offset: usize = std::str::from_utf8(&tail[digits_start..cursor])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PDFError::Malformed("invalid startxref offset".to_string()))?;

        if offset >= length {
            return Err(PDFError::Malformed(format!(
                "startxref offset {} beyond end of file",
                offset
            )));
        }
        Ok(offset)
    }

    fn load_catalog(xref: &mut XRef) -> PDFResult<Dict> {
        let root = xref
            .trailer()
            .get("Root")
            .cloned()
            .ok_or_else(|| PDFError::Malformed("trailer has no /Root".to_string()))?;

        match xref.fetch_if_ref(&root)? {
            PDFObject::Dictionary(dict) => Ok(dict),
            other => Err(PDFError::Malformed(format!(
                "catalog is not a dictionary: {:?}",
                other
            ))),
        }
    }

    /// Returns the document catalog (root dictionary).
    pub fn catalog(&self) -> &Dict {
        &self.catalog
    }

    /// Returns the merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Byte offset of the newest cross-reference table.
    pub fn startxref(&self) -> usize {
        self.xref.startxref()
    }

    /// Total object count (`trailer.Size`).
    pub fn size(&self) -> PDFResult<u32> {
        self.xref.size()
    }

    pub fn xref(&self) -> &XRef {
        &self.xref
    }

    pub fn xref_mut(&mut self) -> &mut XRef {
        &mut self.xref
    }

    fn pages_dict(&mut self) -> PDFResult<Dict> {
        let pages = self
            .catalog
            .get("Pages")
            .cloned()
            .ok_or_else(|| PDFError::Malformed("catalog has no /Pages".to_string()))?;

        match self.xref.fetch_if_ref(&pages)? {
            PDFObject::Dictionary(dict) => Ok(dict),
            other => Err(PDFError::Malformed(format!(
                "/Pages is not a dictionary: {:?}",
                other
            ))),
        }
    }

    /// Number of pages in the document.
    pub fn page_count(&mut self) -> PDFResult<usize> {
        let pages = self.pages_dict()?;
        match pages.get("Count").map(|c| self.xref.fetch_if_ref(c)) {
            Some(Ok(PDFObject::Number(n))) if n >= 0.0 => Ok(n as usize),
            Some(Err(e)) => Err(e),
            _ => Err(PDFError::Malformed(
                "/Pages has no numeric /Count".to_string(),
            )),
        }
    }

    /// Fetches a page by zero-based index.
    pub fn get_page(&mut self, index: usize) -> PDFResult<Page> {
        if let Some(page) = self.page_cache.get(&index) {
            return Ok(page.clone());
        }

        let count = self.page_count()?;
        if index >= count {
            return Err(PDFError::InvalidPageIndex { index, count });
        }

        let root_ref = match self.catalog.get("Pages") {
            Some(PDFObject::Ref(r)) => *r,
            _ => {
                return Err(PDFError::Malformed(
                    "/Pages must be an indirect reference".to_string(),
                ));
            }
        };

        let mut cursor = 0usize;
        let page = self
            .walk_page_tree(root_ref, index, &mut cursor, None, 0)?
            .ok_or_else(|| {
                PDFError::Malformed(format!("page {} missing from page tree", index))
            })?;

        self.page_cache.insert(index, page.clone());
        Ok(page)
    }

    /// Depth-first walk of the page tree, counting leaves until the target
    /// index is reached. `MediaBox` is inheritable and is carried down from
    /// intermediate nodes.
    fn walk_page_tree(
        &mut self,
        node_ref: Ref,
        target: usize,
        cursor: &mut usize,
        inherited_box: Option<[f64; 4]>,
        depth: usize,
    ) -> PDFResult<Option<Page>> {
        if depth > MAX_TREE_DEPTH {
            return Err(PDFError::Malformed("page tree too deep".to_string()));
        }

        let node = match self.xref.fetch(node_ref)? {
            PDFObject::Dictionary(dict) => dict,
            other => {
                return Err(PDFError::Malformed(format!(
                    "page tree node {} is not a dictionary: {:?}",
                    node_ref, other
                )));
            }
        };

        let media_box = match node.get("MediaBox") {
            Some(obj) => {
                let resolved = self.xref.fetch_if_ref(obj)?;
                Self::parse_rect(&resolved).or(inherited_box)
            }
            None => inherited_box,
        };

        let is_leaf = match node.get("Type").and_then(|t| t.as_name()) {
            Some(name) => name.as_str() == "Page",
            // Missing /Type: treat nodes with /Kids as intermediate.
            None => !node.contains_key("Kids"),
        };

        if !is_leaf {
            let kids_obj = node.get("Kids").cloned().ok_or_else(|| {
                PDFError::Malformed(format!("pages node {} has no /Kids", node_ref))
            })?;
            let kids = self.xref.fetch_if_ref(&kids_obj)?;
            let kids = kids.as_array().ok_or_else(|| {
                PDFError::Malformed(format!("/Kids of {} is not an array", node_ref))
            })?;

            // Clone the kid references up front: the recursion needs &mut self.
            let kid_refs: Vec<Ref> = kids
                .iter()
                .filter_map(|kid| match kid.as_ref() {
                    PDFObject::Ref(r) => Some(*r),
                    other => {
                        warn!("skipping non-reference /Kids entry: {:?}", other);
                        None
                    }
                })
                .collect();

            for kid in kid_refs {
                if let Some(page) =
                    self.walk_page_tree(kid, target, cursor, media_box, depth + 1)?
                {
                    return Ok(Some(page));
                }
            }
            return Ok(None);
        }

        if *cursor != target {
            *cursor += 1;
            return Ok(None);
        }

        let media_box = media_box.unwrap_or_else(|| {
            warn!("page {} has no MediaBox, defaulting to letter size", target);
            DEFAULT_MEDIA_BOX
        });
        let annotations = self.load_annotation_refs(&node)?;

        Ok(Some(Page::new(target, node_ref, node, media_box, annotations)))
    }

    /// Decodes `/Annots` into a reference list. The sequence itself may be
    /// direct or indirect; entries that are not references are skipped.
    fn load_annotation_refs(&mut self, page_dict: &Dict) -> PDFResult<Vec<Ref>> {
        let annots = match page_dict.get("Annots") {
            None => return Ok(Vec::new()),
            Some(obj) => self.xref.fetch_if_ref(obj)?,
        };

        let items = match annots.as_array() {
            Some(items) => items,
            None => {
                warn!("/Annots is not an array, ignoring");
                return Ok(Vec::new());
            }
        };

        Ok(items
            .iter()
            .filter_map(|item| match item.as_ref() {
                PDFObject::Ref(r) => Some(*r),
                other => {
                    warn!("skipping non-reference /Annots entry: {:?}", other);
                    None
                }
            })
            .collect())
    }

    fn parse_rect(obj: &PDFObject) -> Option<[f64; 4]> {
        let items = obj.as_array()?;
        if items.len() != 4 {
            return None;
        }
        let mut rect = [0.0; 4];
        for (slot, item) in rect.iter_mut().zip(items.iter()) {
            *slot = item.as_number()?;
        }
        Some(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::Stream;

    /// Builds a single-page document with correct offsets.
    fn minimal_pdf() -> Vec<u8> {
        let mut data: Vec<u8> = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();

        let objects: [&[u8]; 3] = [
            b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n",
            b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>\nendobj\n",
            b"3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n",
        ];
        for body in objects {
            offsets.push(data.len());
            data.extend_from_slice(body);
        }

        let xref_offset = data.len();
        data.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
        for offset in &offsets {
            data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        data.extend_from_slice(b"trailer\n<< /Size 4 /Root 1 0 R >>\n");
        data.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        data
    }

    fn open(data: Vec<u8>) -> PDFDocument {
        PDFDocument::open(Box::new(Stream::from_bytes(data))).unwrap()
    }

    #[test]
    fn test_open_minimal_document() {
        let doc = open(minimal_pdf());
        assert!(doc.catalog().contains_key("Pages"));
        assert_eq!(doc.size().unwrap(), 4);
    }

    #[test]
    fn test_page_count() {
        let mut doc = open(minimal_pdf());
        assert_eq!(doc.page_count().unwrap(), 1);
    }

    #[test]
    fn test_get_page_inherits_media_box() {
        let mut doc = open(minimal_pdf());
        let page = doc.get_page(0).unwrap();

        assert_eq!(page.index(), 0);
        assert_eq!(page.reference(), Ref::new(3, 0));
        // MediaBox comes from the parent Pages node.
        assert_eq!(page.media_box(), [0.0, 0.0, 612.0, 792.0]);
        assert!(page.annotations().is_empty());
    }

    #[test]
    fn test_invalid_page_index() {
        let mut doc = open(minimal_pdf());
        assert_eq!(
            doc.get_page(1),
            Err(PDFError::InvalidPageIndex { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_startxref_beyond_file_rejected() {
        let data = b"%PDF-1.4\nstartxref\n99999\n%%EOF\n".to_vec();
        assert!(matches!(
            PDFDocument::open(Box::new(Stream::from_bytes(data))),
            Err(PDFError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_startxref_rejected() {
        let data = b"%PDF-1.4\nnothing to see here\n".to_vec();
        assert!(matches!(
            PDFDocument::open(Box::new(Stream::from_bytes(data))),
            Err(PDFError::Malformed(_))
        ));
    }
}
