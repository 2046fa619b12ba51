//! Shared test fixtures.
//!
//! Builds small but structurally correct documents: object offsets in the
//! cross-reference table are computed while the bytes are assembled, never
//! hardcoded.

// Each integration test crate compiles this module and uses a subset of it.
#![allow(dead_code)]

/// Wires the `log` facade to test output. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds a document with one page per entry in `media_boxes`.
///
/// Object layout: 1 = catalog, 2 = pages node, 3.. = page leaves.
/// The pages node carries no MediaBox; each leaf carries its own.
pub fn build_pdf(media_boxes: &[[f64; 4]]) -> Vec<u8> {
    let mut bodies: Vec<String> = Vec::new();
    bodies.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());

    let kids: Vec<String> = (0..media_boxes.len())
        .map(|i| format!("{} 0 R", i + 3))
        .collect();
    bodies.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        media_boxes.len()
    ));

    for media_box in media_boxes {
        bodies.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [{} {} {} {}] >>",
            media_box[0], media_box[1], media_box[2], media_box[3]
        ));
    }

    assemble(&bodies)
}

/// Builds a single-page US-Letter document.
pub fn letter_pdf() -> Vec<u8> {
    build_pdf(&[[0.0, 0.0, 612.0, 792.0]])
}

/// Builds a single-page document with a large unreferenced padding object
/// between the live objects and the cross-reference table, so that
/// demand-paged access provably leaves some chunks untouched.
pub fn padded_letter_pdf(padding: usize) -> Vec<u8> {
    let bodies = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string(),
        format!("({})", "x".repeat(padding)),
    ];
    assemble(&bodies)
}

/// Serializes numbered objects (starting at 1), the cross-reference table
/// and the trailer.
fn assemble(bodies: &[String]) -> Vec<u8> {
    let mut data: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();

    for (i, body) in bodies.iter().enumerate() {
        offsets.push(data.len());
        data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = data.len();
    data.extend_from_slice(format!("xref\n0 {}\n", bodies.len() + 1).as_bytes());
    data.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    data.extend_from_slice(
        format!("trailer\n<< /Size {} /Root 1 0 R >>\n", bodies.len() + 1).as_bytes(),
    );
    data.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    data
}
