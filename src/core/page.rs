use super::primitives::{Dict, PDFObject, Ref};

/// A page snapshot handed out by the parsed document.
///
/// The snapshot is immutable: the update writer copies its dictionary and
/// annotation sequence instead of editing them, so readers of the
/// pre-update state stay valid while a write is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// The page index (0-based)
    index: usize,

    /// The page's own indirect reference
    page_ref: Ref,

    /// The page dictionary
    dict: Dict,

    /// The page's view rectangle `[x0, y0, x1, y1]` in user-space units
    media_box: [f64; 4],

    /// References to annotation objects attached to the page
    annotations: Vec<Ref>,
}

impl Page {
    pub fn new(
        index: usize,
        page_ref: Ref,
        dict: Dict,
        media_box: [f64; 4],
        annotations: Vec<Ref>,
    ) -> Self {
        Page {
            index,
            page_ref,
            dict,
            media_box,
            annotations,
        }
    }

    /// Returns the page index (0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the page's indirect object reference.
    pub fn reference(&self) -> Ref {
        self.page_ref
    }

    /// Returns the page dictionary.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// Gets an entry from the page dictionary without resolving it.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.dict.get(key)
    }

    /// The view rectangle `[x0, y0, x1, y1]`.
    pub fn media_box(&self) -> [f64; 4] {
        self.media_box
    }

    /// Width of the view rectangle in user-space units.
    pub fn view_width(&self) -> f64 {
        self.media_box[2] - self.media_box[0]
    }

    /// Height of the view rectangle in user-space units.
    pub fn view_height(&self) -> f64 {
        self.media_box[3] - self.media_box[1]
    }

    /// References to the annotations attached to this page.
    pub fn annotations(&self) -> &[Ref] {
        &self.annotations
    }
}
