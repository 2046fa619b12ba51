use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use super::primitives::{Dict, Name, PDFObject, Ref};

/// Parser building PDF objects from tokens.
///
/// Maintains a 2-token lookahead buffer to detect patterns that span
/// tokens: indirect references (`N G R`) and stream objects (a dictionary
/// followed by the `stream` keyword). Stream objects are rejected; this
/// crate reads and rewrites the object graph, not filtered stream payloads.
///
/// Parsing is strict: malformed syntax fails with `PDFError::Malformed`
/// instead of attempting recovery, so the recoverable `DataMissing` signal
/// is never swallowed on the way up.
pub struct Parser {
    /// The lexer that provides tokens
    lexer: Lexer,

    /// First lookahead token
    buf1: Token,

    /// Second lookahead token
    buf2: Token,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> PDFResult<Self> {
        let buf1 = lexer.get_token()?;
        let buf2 = lexer.get_token()?;
        Ok(Parser { lexer, buf1, buf2 })
    }

    /// Consumes and returns the current token, refilling the lookahead.
    fn shift(&mut self) -> PDFResult<Token> {
        let next = self.lexer.get_token()?;
        let second = std::mem::replace(&mut self.buf2, next);
        Ok(std::mem::replace(&mut self.buf1, second))
    }

    /// Parses the next PDF object.
    pub fn get_object(&mut self) -> PDFResult<PDFObject> {
        let token = self.shift()?;

        match token {
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dictionary(),

            Token::ArrayEnd => Err(PDFError::Malformed("unexpected ']'".to_string())),
            Token::DictEnd => Err(PDFError::Malformed("unexpected '>>'".to_string())),

            // A number may start an indirect reference: N G R
            Token::Number(n) => {
                if let (Token::Number(generation), Token::Command(cmd)) = (&self.buf1, &self.buf2) {
                    if cmd == "R" && n >= 0.0 && *generation >= 0.0 {
                        let reference = Ref::new(n as u32, *generation as u32);
                        self.shift()?; // consume generation number
                        self.shift()?; // consume 'R'
                        return Ok(PDFObject::Ref(reference));
                    }
                }
                Ok(PDFObject::Number(n))
            }

            Token::EOF => Ok(PDFObject::EOF),
            Token::Boolean(b) => Ok(PDFObject::Boolean(b)),
            Token::Null => Ok(PDFObject::Null),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::HexString(s) => Ok(PDFObject::HexString(s)),
            Token::Name(n) => Ok(PDFObject::Name(Name::new(n))),
            Token::Command(c) => Ok(PDFObject::Command(c)),
        }
    }

    fn parse_array(&mut self) -> PDFResult<PDFObject> {
        let mut items = Vec::new();

        loop {
            match &self.buf1 {
                Token::ArrayEnd => {
                    self.shift()?;
                    break;
                }
                Token::EOF => {
                    return Err(PDFError::Malformed(
                        "unterminated array (missing ']')".to_string(),
                    ));
                }
                _ => items.push(self.get_object()?),
            }
        }

        Ok(PDFObject::array(items))
    }

    fn parse_dictionary(&mut self) -> PDFResult<PDFObject> {
        let mut dict = Dict::new();

        loop {
            match &self.buf1 {
                Token::DictEnd => {
                    self.shift()?;
                    break;
                }
                Token::EOF => {
                    return Err(PDFError::Malformed(
                        "unterminated dictionary (missing '>>')".to_string(),
                    ));
                }
                Token::Name(_) => {
                    let key = match self.shift()? {
                        Token::Name(name) => Name::new(name),
                        _ => unreachable!(),
                    };

                    if matches!(self.buf1, Token::EOF) {
                        return Err(PDFError::Malformed(
                            "unterminated dictionary (EOF after key)".to_string(),
                        ));
                    }
                    let value = self.get_object()?;
                    dict.set(key, value);
                }
                other => {
                    return Err(PDFError::Malformed(format!(
                        "dictionary key must be a name, got {:?}",
                        other
                    )));
                }
            }
        }

        // A dictionary followed by the "stream" keyword is a stream object.
        if matches!(&self.buf1, Token::Command(cmd) if cmd == "stream") {
            return Err(PDFError::Malformed(
                "stream objects are not supported".to_string(),
            ));
        }

        Ok(PDFObject::Dictionary(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::Stream;

    fn parse(input: &str) -> PDFResult<PDFObject> {
        let stream = Box::new(Stream::from_bytes(input.as_bytes().to_vec()));
        let lexer = Lexer::new(stream)?;
        let mut parser = Parser::new(lexer)?;
        parser.get_object()
    }

    #[test]
    fn test_parse_simple_objects() {
        assert_eq!(parse("42").unwrap(), PDFObject::Number(42.0));
        assert_eq!(parse("true").unwrap(), PDFObject::Boolean(true));
        assert_eq!(parse("null").unwrap(), PDFObject::Null);
        assert_eq!(
            parse("(hello)").unwrap(),
            PDFObject::String(b"hello".to_vec())
        );
        assert_eq!(parse("/Type").unwrap(), PDFObject::name("Type"));
    }

    #[test]
    fn test_parse_indirect_reference() {
        assert_eq!(parse("5 0 R").unwrap(), PDFObject::Ref(Ref::new(5, 0)));
        assert_eq!(parse("10 2 R").unwrap(), PDFObject::Ref(Ref::new(10, 2)));
    }

    #[test]
    fn test_number_followed_by_non_reference() {
        // "5 0" without R stays a plain number
        assert_eq!(parse("5 0 obj").unwrap(), PDFObject::Number(5.0));
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(parse("[]").unwrap(), PDFObject::array([]));
        assert_eq!(
            parse("[1 /Name (str) 5 0 R]").unwrap(),
            PDFObject::array([
                PDFObject::Number(1.0),
                PDFObject::name("Name"),
                PDFObject::String(b"str".to_vec()),
                PDFObject::Ref(Ref::new(5, 0)),
            ])
        );
        assert_eq!(
            parse("[[1 2] [3]]").unwrap(),
            PDFObject::array([
                PDFObject::array([PDFObject::Number(1.0), PDFObject::Number(2.0)]),
                PDFObject::array([PDFObject::Number(3.0)]),
            ])
        );
    }

    #[test]
    fn test_parse_dictionary_preserves_order() {
        let obj = parse("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>").unwrap();
        let dict = obj.as_dict().unwrap();

        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Type", "Parent", "MediaBox"]);
        assert_eq!(dict.get("Type"), Some(&PDFObject::name("Page")));
        assert_eq!(
            dict.get("Parent"),
            Some(&PDFObject::Ref(Ref::new(2, 0)))
        );
    }

    #[test]
    fn test_parse_nested_dictionary() {
        let obj = parse("<< /Outer << /Inner 42 >> >>").unwrap();
        let inner = obj
            .as_dict()
            .unwrap()
            .get("Outer")
            .and_then(|o| o.as_dict())
            .unwrap();
        assert_eq!(inner.get("Inner"), Some(&PDFObject::Number(42.0)));
    }

    #[test]
    fn test_unterminated_structures() {
        assert!(parse("[1 2 3").is_err());
        assert!(parse("<< /Type /Font").is_err());
    }

    #[test]
    fn test_non_name_dictionary_key_rejected() {
        assert!(parse("<< 42 /Value >>").is_err());
    }

    #[test]
    fn test_stream_objects_rejected() {
        let err = parse("<< /Length 3 >> stream\nabc\nendstream").unwrap_err();
        assert!(matches!(err, PDFError::Malformed(_)));
    }
}
