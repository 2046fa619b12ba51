//! Incremental update writer.
//!
//! Serializes a text-annotation mutation as a PDF incremental update: the
//! new annotation object, the rewritten page object, a cross-reference
//! section for both, and a trailer chaining back to the previous
//! cross-reference table. The output is a self-contained fragment meant to
//! be appended verbatim after the existing file bytes; the prior bytes are
//! never touched, only their count is needed to compute absolute offsets.

use super::error::{PDFError, PDFResult};
use super::page::Page;
use super::primitives::{Dict, PDFObject, Ref};
use super::serialize::{write_dict, write_indirect_object};
use std::io::Write;

/// The annotation icon occupies a fixed 12x10 user-space-unit footprint
/// regardless of content length.
const ICON_WIDTH: i64 = 12;
const ICON_HEIGHT: i64 = 10;

/// Fractional position on a page, both axes in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// A request to attach a text annotation to a page.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    /// Zero-based page index
    pub page_index: usize,

    /// Fractional position of the annotation icon on the page
    pub coordinates: Coordinates,

    /// Annotation text
    pub contents: String,

    /// Optional author, stored under `/T`
    pub author: Option<String>,
}

/// Builds the update fragment for one annotation.
///
/// Pure function of its inputs: the resolved page snapshot, the current
/// merged trailer, the previous cross-reference offset, the current total
/// file length, and the request. The caller owns appending the returned
/// bytes after the existing file and committing the new state.
pub fn write_annotation_update(
    page: &Page,
    trailer: &Dict,
    prev_startxref: usize,
    file_length: usize,
    request: &AnnotationRequest,
) -> PDFResult<Vec<u8>> {
    validate_coordinates(&request.coordinates)?;

    let size = match trailer.get("Size") {
        Some(PDFObject::Number(n)) if *n >= 1.0 => *n as u32,
        _ => {
            return Err(PDFError::Malformed(
                "trailer has no usable /Size".to_string(),
            ));
        }
    };

    let page_ref = page.reference();
    if page_ref.num >= size {
        return Err(PDFError::Malformed(format!(
            "page object number {} exceeds trailer Size {}",
            page_ref.num, size
        )));
    }

    // Resolve-then-reserve: the page is already resolved, so minting the
    // reference commits nothing that could be orphaned.
    let annot_ref = Ref::new(size, 0);

    let annot_dict = build_annotation_dict(page, request);

    // The page's annotation sequence is extended in a copy; the original
    // snapshot stays valid if this fragment is discarded.
    let annots_array = PDFObject::array(
        page.annotations()
            .iter()
            .map(|r| PDFObject::Ref(*r))
            .chain(std::iter::once(PDFObject::Ref(annot_ref))),
    );
    let new_page_dict = rewrite_page_dict(page.dict(), annots_array);

    let mut buffer = Vec::new();
    let mut entries: Vec<(Ref, usize)> = Vec::new();

    entries.push((annot_ref, file_length + buffer.len()));
    write_indirect_object(&mut buffer, annot_ref, &PDFObject::Dictionary(annot_dict))
        .map_err(|e| PDFError::Serialize(e.to_string()))?;

    // The page keeps its identity: same reference, new body.
    entries.push((page_ref, file_length + buffer.len()));
    write_indirect_object(&mut buffer, page_ref, &PDFObject::Dictionary(new_page_dict))
        .map_err(|e| PDFError::Serialize(e.to_string()))?;

    let xref_offset = file_length + buffer.len();
    entries.sort_by_key(|(r, _)| r.num);
    write_xref_section(&mut buffer, &entries).map_err(|e| PDFError::Serialize(e.to_string()))?;

    let mut new_trailer = trailer.clone();
    new_trailer.set("Size", PDFObject::Number((size + 1) as f64));
    new_trailer.set("Prev", PDFObject::Number(prev_startxref as f64));
    write_trailer(&mut buffer, &new_trailer, xref_offset)
        .map_err(|e| PDFError::Serialize(e.to_string()))?;

    Ok(buffer)
}

fn validate_coordinates(coordinates: &Coordinates) -> PDFResult<()> {
    for (axis, value) in [("x", coordinates.x), ("y", coordinates.y)] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(PDFError::InvalidRequest(format!(
                "coordinate {} must be a fraction in [0, 1], got {}",
                axis, value
            )));
        }
    }
    Ok(())
}

/// Fractional coordinates map to user-space units by truncation toward
/// zero, not rounding.
fn annotation_rect(page: &Page, coordinates: &Coordinates) -> [i64; 4] {
    let x = (coordinates.x * page.view_width()).trunc() as i64;
    let y = (coordinates.y * page.view_height()).trunc() as i64;
    [x, y, x + ICON_WIDTH, y + ICON_HEIGHT]
}

fn build_annotation_dict(page: &Page, request: &AnnotationRequest) -> Dict {
    let rect = annotation_rect(page, &request.coordinates);

    let mut dict = Dict::new();
    dict.set("Type", PDFObject::name("Annot"));
    dict.set("Subtype", PDFObject::name("Text"));
    dict.set(
        "Rect",
        PDFObject::array(rect.iter().map(|v| PDFObject::Number(*v as f64))),
    );
    dict.set(
        "Contents",
        PDFObject::String(request.contents.as_bytes().to_vec()),
    );
    if let Some(author) = &request.author {
        dict.set("T", PDFObject::String(author.as_bytes().to_vec()));
    }
    dict
}

/// Shallow-copies the page dictionary, replacing only `/Annots`.
///
/// Every other key keeps its value and its position. A page that had no
/// `/Annots` gains one at the end.
fn rewrite_page_dict(original: &Dict, annots: PDFObject) -> Dict {
    let mut rewritten = Dict::new();
    let mut replaced = false;

    for (key, value) in original.iter() {
        if key.as_str() == "Annots" {
            rewritten.set(key.clone(), annots.clone());
            replaced = true;
        } else {
            rewritten.set(key.clone(), value.clone());
        }
    }
    if !replaced {
        rewritten.set("Annots", annots);
    }
    rewritten
}

/// Writes the cross-reference section: subsections of consecutive object
/// numbers, 20-byte entries, offsets absolute within the concatenated
/// file.
fn write_xref_section<W: Write>(out: &mut W, entries: &[(Ref, usize)]) -> std::io::Result<()> {
    out.write_all(b"xref\n")?;

    let mut index = 0;
    while index < entries.len() {
        let run_start = index;
        while index + 1 < entries.len()
            && entries[index + 1].0.num == entries[index].0.num + 1
        {
            index += 1;
        }
        index += 1;

        let run = &entries[run_start..index];
        write!(out, "{} {}\n", run[0].0.num, run.len())?;
        for (reference, offset) in run {
            write!(out, "{:010} {:05} n \n", offset, reference.generation)?;
        }
    }
    Ok(())
}

fn write_trailer<W: Write>(out: &mut W, trailer: &Dict, xref_offset: usize) -> std::io::Result<()> {
    out.write_all(b"trailer\n")?;
    write_dict(out, trailer)?;
    write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn letter_page(page_ref: Ref, annotations: Vec<Ref>) -> Page {
        let mut dict = Dict::new();
        dict.set("Type", PDFObject::name("Page"));
        dict.set("Parent", PDFObject::Ref(Ref::new(2, 0)));
        if !annotations.is_empty() {
            dict.set(
                "Annots",
                PDFObject::array(annotations.iter().map(|r| PDFObject::Ref(*r))),
            );
        }
        Page::new(0, page_ref, dict, [0.0, 0.0, 612.0, 792.0], annotations)
    }

    fn trailer_with_size(size: u32) -> Dict {
        let mut trailer = Dict::new();
        trailer.set("Size", PDFObject::Number(size as f64));
        trailer.set("Root", PDFObject::Ref(Ref::new(1, 0)));
        trailer
    }

    fn hello_request() -> AnnotationRequest {
        AnnotationRequest {
            page_index: 0,
            coordinates: Coordinates { x: 0.5, y: 0.5 },
            contents: "hello".to_string(),
            author: Some("A".to_string()),
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        // Page view [0,0,612,792], coordinates (0.5, 0.5), Size 10:
        // new object is 10 0, rect is [306 396 318 406], Size becomes 11.
        let page = letter_page(Ref::new(3, 0), vec![]);
        let fragment =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &hello_request())
                .unwrap();
        let text = String::from_utf8_lossy(&fragment);

        assert!(text.contains("10 0 obj"));
        assert!(text.contains("/Type /Annot"));
        assert!(text.contains("/Subtype /Text"));
        assert!(text.contains("/Rect [306 396 318 406]"));
        assert!(text.contains("/Contents (hello)"));
        assert!(text.contains("/T (A)"));
        assert!(text.contains("3 0 obj"));
        assert!(text.contains("/Annots [10 0 R]"));
        assert!(text.contains("/Size 11"));
        assert!(text.contains("/Prev 4500"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_fragment_is_deterministic() {
        let page = letter_page(Ref::new(3, 0), vec![Ref::new(7, 0)]);
        let a =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &hello_request())
                .unwrap();
        let b =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &hello_request())
                .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_existing_annotations_are_kept() {
        let page = letter_page(Ref::new(3, 0), vec![Ref::new(7, 0), Ref::new(8, 0)]);
        let fragment =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &hello_request())
                .unwrap();
        let text = String::from_utf8_lossy(&fragment);
        assert!(text.contains("/Annots [7 0 R 8 0 R 10 0 R]"));
    }

    #[test]
    fn test_page_keys_preserve_order() {
        let mut dict = Dict::new();
        dict.set("Type", PDFObject::name("Page"));
        dict.set("Annots", PDFObject::array([PDFObject::Ref(Ref::new(7, 0))]));
        dict.set("Rotate", PDFObject::Number(90.0));
        dict.set("Parent", PDFObject::Ref(Ref::new(2, 0)));

        let rewritten = rewrite_page_dict(
            &dict,
            PDFObject::array([PDFObject::Ref(Ref::new(7, 0)), PDFObject::Ref(Ref::new(10, 0))]),
        );

        let keys: Vec<&str> = rewritten.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Type", "Annots", "Rotate", "Parent"]);
        assert_eq!(rewritten.get("Rotate"), Some(&PDFObject::Number(90.0)));
    }

    #[test]
    fn test_page_without_annots_gains_key_at_end() {
        let mut dict = Dict::new();
        dict.set("Type", PDFObject::name("Page"));
        dict.set("Parent", PDFObject::Ref(Ref::new(2, 0)));

        let rewritten =
            rewrite_page_dict(&dict, PDFObject::array([PDFObject::Ref(Ref::new(10, 0))]));
        let keys: Vec<&str> = rewritten.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Type", "Parent", "Annots"]);
    }

    #[test]
    fn test_author_is_optional() {
        let page = letter_page(Ref::new(3, 0), vec![]);
        let request = AnnotationRequest {
            author: None,
            ..hello_request()
        };
        let fragment =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &request).unwrap();
        let text = String::from_utf8_lossy(&fragment);
        assert!(!text.contains("/T "));
    }

    #[test]
    fn test_coordinates_validated() {
        let page = letter_page(Ref::new(3, 0), vec![]);
        for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            let request = AnnotationRequest {
                coordinates: Coordinates { x: bad, y: 0.5 },
                ..hello_request()
            };
            assert!(matches!(
                write_annotation_update(&page, &trailer_with_size(10), 0, 100, &request),
                Err(PDFError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_trailer_without_size_rejected() {
        let page = letter_page(Ref::new(3, 0), vec![]);
        let mut trailer = Dict::new();
        trailer.set("Root", PDFObject::Ref(Ref::new(1, 0)));
        assert!(matches!(
            write_annotation_update(&page, &trailer, 0, 100, &hello_request()),
            Err(PDFError::Malformed(_))
        ));
    }

    #[test]
    fn test_xref_subsection_grouping() {
        let mut buf = Vec::new();
        write_xref_section(
            &mut buf,
            &[(Ref::new(3, 0), 5000), (Ref::new(10, 0), 5100)],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "xref\n3 1\n0000005000 00000 n \n10 1\n0000005100 00000 n \n"
        );

        let mut buf = Vec::new();
        write_xref_section(
            &mut buf,
            &[(Ref::new(9, 0), 5000), (Ref::new(10, 0), 5100)],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "xref\n9 2\n0000005000 00000 n \n0000005100 00000 n \n"
        );
    }

    #[test]
    fn test_xref_offsets_are_absolute() {
        let page = letter_page(Ref::new(3, 0), vec![]);
        let fragment =
            write_annotation_update(&page, &trailer_with_size(10), 4500, 5000, &hello_request())
                .unwrap();
        let text = String::from_utf8_lossy(&fragment);

        // First object of the fragment sits exactly at the prior file end.
        assert!(text.contains("0000005000 00000 n \n"));
        // startxref points past both objects, inside the appended bytes.
        let startxref: usize = text
            .split("startxref\n")
            .nth(1)
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(&fragment[startxref - 5000..startxref - 5000 + 4], b"xref");
    }

    proptest! {
        #[test]
        fn rect_matches_truncation_for_all_coordinates(
            x in 0.0f64..=1.0,
            y in 0.0f64..=1.0,
            w in 1.0f64..2000.0,
            h in 1.0f64..2000.0,
        ) {
            let page = Page::new(
                0,
                Ref::new(3, 0),
                Dict::new(),
                [0.0, 0.0, w, h],
                vec![],
            );
            let rect = annotation_rect(&page, &Coordinates { x, y });
            let expected_x = (x * w).trunc() as i64;
            let expected_y = (y * h).trunc() as i64;
            prop_assert_eq!(rect, [expected_x, expected_y, expected_x + 12, expected_y + 10]);
        }
    }
}
