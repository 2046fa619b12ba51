//! PDF object serialization.
//!
//! Writes objects back out in PDF syntax. Dictionary keys are emitted in
//! their stored insertion order: consumers of rewritten documents rely on
//! round-trip stability, so this is a correctness property here, not a
//! cosmetic one.

use super::primitives::{Dict, PDFObject, Ref};
use std::io::{self, Write};

/// Writes an object in PDF syntax.
pub fn write_object<W: Write>(out: &mut W, obj: &PDFObject) -> io::Result<()> {
    match obj {
        PDFObject::Null => out.write_all(b"null"),
        PDFObject::Boolean(true) => out.write_all(b"true"),
        PDFObject::Boolean(false) => out.write_all(b"false"),
        PDFObject::Number(n) => write_number(out, *n),
        PDFObject::String(s) => {
            out.write_all(b"(")?;
            write_escaped_string(out, s)?;
            out.write_all(b")")
        }
        PDFObject::HexString(s) => {
            out.write_all(b"<")?;
            for byte in s {
                write!(out, "{:02X}", byte)?;
            }
            out.write_all(b">")
        }
        PDFObject::Name(name) => {
            out.write_all(b"/")?;
            write_escaped_name(out, name.as_str())
        }
        PDFObject::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write_object(out, item)?;
            }
            out.write_all(b"]")
        }
        PDFObject::Dictionary(dict) => write_dict(out, dict),
        PDFObject::Ref(r) => write!(out, "{} {} R", r.num, r.generation),
        PDFObject::EOF | PDFObject::Command(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "marker tokens cannot be serialized as objects",
        )),
    }
}

/// Writes a dictionary, keys in insertion order.
pub fn write_dict<W: Write>(out: &mut W, dict: &Dict) -> io::Result<()> {
    out.write_all(b"<<")?;
    for (key, value) in dict.iter() {
        out.write_all(b" /")?;
        write_escaped_name(out, key.as_str())?;
        out.write_all(b" ")?;
        write_object(out, value)?;
    }
    out.write_all(b" >>")
}

/// Writes a complete indirect object: `N G obj\n<body>\nendobj\n`.
pub fn write_indirect_object<W: Write>(
    out: &mut W,
    reference: Ref,
    obj: &PDFObject,
) -> io::Result<()> {
    write!(out, "{} {} obj\n", reference.num, reference.generation)?;
    write_object(out, obj)?;
    out.write_all(b"\nendobj\n")
}

/// Integers are written without a decimal point.
fn write_number<W: Write>(out: &mut W, n: f64) -> io::Result<()> {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(out, "{}", n as i64)
    } else {
        write!(out, "{}", n)
    }
}

/// Literal strings escape backslashes, parentheses and control characters.
fn write_escaped_string<W: Write>(out: &mut W, s: &[u8]) -> io::Result<()> {
    for &byte in s {
        match byte {
            b'(' => out.write_all(b"\\(")?,
            b')' => out.write_all(b"\\)")?,
            b'\\' => out.write_all(b"\\\\")?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            _ => out.write_all(&[byte])?,
        }
    }
    Ok(())
}

/// Names escape delimiters, '#' and non-printable bytes as `#XX`.
fn write_escaped_name<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    for byte in name.bytes() {
        let needs_escape = matches!(
            byte,
            b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%' | b'#'
        ) || !(b'!'..=b'~').contains(&byte);

        if needs_escape {
            write!(out, "#{:02X}", byte)?;
        } else {
            out.write_all(&[byte])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::primitives::Name;

    fn serialized(obj: &PDFObject) -> String {
        let mut buf = Vec::new();
        write_object(&mut buf, obj).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_write_numbers() {
        assert_eq!(serialized(&PDFObject::Number(42.0)), "42");
        assert_eq!(serialized(&PDFObject::Number(-7.0)), "-7");
        assert_eq!(serialized(&PDFObject::Number(3.14)), "3.14");
    }

    #[test]
    fn test_write_simple_objects() {
        assert_eq!(serialized(&PDFObject::Null), "null");
        assert_eq!(serialized(&PDFObject::Boolean(true)), "true");
        assert_eq!(serialized(&PDFObject::name("Type")), "/Type");
        assert_eq!(
            serialized(&PDFObject::Ref(Ref::new(5, 0))),
            "5 0 R"
        );
    }

    #[test]
    fn test_write_string_escapes() {
        assert_eq!(
            serialized(&PDFObject::String(b"hello(world)".to_vec())),
            r"(hello\(world\))"
        );
        assert_eq!(
            serialized(&PDFObject::String(b"a\\b\nc".to_vec())),
            "(a\\\\b\\nc)"
        );
    }

    #[test]
    fn test_write_hex_string() {
        assert_eq!(
            serialized(&PDFObject::HexString(vec![0x48, 0x65, 0x6C])),
            "<48656C>"
        );
    }

    #[test]
    fn test_write_name_escapes() {
        assert_eq!(
            serialized(&PDFObject::Name(Name::new("Font/Name"))),
            "/Font#2FName"
        );
        assert_eq!(
            serialized(&PDFObject::Name(Name::new("A B"))),
            "/A#20B"
        );
    }

    #[test]
    fn test_write_array() {
        let arr = PDFObject::array([
            PDFObject::Number(1.0),
            PDFObject::Number(2.0),
            PDFObject::Ref(Ref::new(3, 0)),
        ]);
        assert_eq!(serialized(&arr), "[1 2 3 0 R]");
    }

    #[test]
    fn test_write_dict_preserves_order() {
        let mut dict = Dict::new();
        dict.set("Type", PDFObject::name("Page"));
        dict.set("Rotate", PDFObject::Number(90.0));
        dict.set("Parent", PDFObject::Ref(Ref::new(2, 0)));

        assert_eq!(
            serialized(&PDFObject::Dictionary(dict)),
            "<< /Type /Page /Rotate 90 /Parent 2 0 R >>"
        );
    }

    #[test]
    fn test_write_indirect_object() {
        let mut buf = Vec::new();
        write_indirect_object(&mut buf, Ref::new(10, 0), &PDFObject::Number(5.0)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "10 0 obj\n5\nendobj\n");
    }

    #[test]
    fn test_markers_are_not_serializable() {
        let mut buf = Vec::new();
        assert!(write_object(&mut buf, &PDFObject::EOF).is_err());
        assert!(write_object(&mut buf, &PDFObject::Command("q".into())).is_err());
    }

    #[test]
    fn test_round_trip_through_parser() {
        use crate::core::lexer::Lexer;
        use crate::core::parser::Parser;
        use crate::core::stream::Stream;

        let mut dict = Dict::new();
        dict.set("Type", PDFObject::name("Annot"));
        dict.set("Subtype", PDFObject::name("Text"));
        dict.set(
            "Rect",
            PDFObject::array([
                PDFObject::Number(306.0),
                PDFObject::Number(396.0),
                PDFObject::Number(318.0),
                PDFObject::Number(406.0),
            ]),
        );
        dict.set("Contents", PDFObject::String(b"hello".to_vec()));
        let original = PDFObject::Dictionary(dict);

        let mut buf = Vec::new();
        write_object(&mut buf, &original).unwrap();

        let stream = Box::new(Stream::from_bytes(buf));
        let mut parser = Parser::new(Lexer::new(stream).unwrap()).unwrap();
        assert_eq!(parser.get_object().unwrap(), original);
    }
}
