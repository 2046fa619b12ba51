use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// End of file marker
    EOF,

    /// Boolean value
    Boolean(bool),

    /// Null value
    Null,

    /// Numeric value (integers and reals)
    Number(f64),

    /// String value (from literal strings like (hello))
    String(Vec<u8>),

    /// Hex string value (from hex strings like <48656c6c6f>)
    HexString(Vec<u8>),

    /// Name value (from /Name)
    Name(String),

    /// Keyword ("obj", "endobj", "R", "xref", "trailer", ...)
    Command(String),

    /// Array start '['
    ArrayStart,

    /// Array end ']'
    ArrayEnd,

    /// Dictionary start '<<'
    DictStart,

    /// Dictionary end '>>'
    DictEnd,
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Tokenizer for PDF object syntax.
///
/// Reads one byte of lookahead from the underlying stream. A read that hits
/// a non-resident chunk propagates `DataMissing` unchanged, so callers can
/// fetch the range and re-run the whole tokenization from scratch.
pub struct Lexer {
    /// The input stream
    stream: Box<dyn BaseStream>,

    /// Current byte being examined (None at end of stream)
    current: Option<u8>,
}

impl Lexer {
    pub fn new(mut stream: Box<dyn BaseStream>) -> PDFResult<Self> {
        let current = Self::next_byte(&mut stream)?;
        Ok(Lexer { stream, current })
    }

    /// Reads a byte, mapping end-of-stream to lookahead exhaustion while
    /// letting the missing-range signal through untouched.
    fn next_byte(stream: &mut Box<dyn BaseStream>) -> PDFResult<Option<u8>> {
        match stream.get_byte() {
            Ok(byte) => Ok(Some(byte)),
            Err(PDFError::UnexpectedEndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn advance(&mut self) -> PDFResult<()> {
        self.current = Self::next_byte(&mut self.stream)?;
        Ok(())
    }

    fn skip_whitespace_and_comments(&mut self) -> PDFResult<()> {
        loop {
            match self.current {
                Some(b) if is_whitespace(b) => self.advance()?,
                Some(b'%') => {
                    // Comment runs to end of line
                    while let Some(b) = self.current {
                        if b == b'\n' || b == b'\r' {
                            break;
                        }
                        self.advance()?;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Returns the next token from the stream.
    pub fn get_token(&mut self) -> PDFResult<Token> {
        self.skip_whitespace_and_comments()?;

        let byte = match self.current {
            None => return Ok(Token::EOF),
            Some(b) => b,
        };

        match byte {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.read_number(),
            b'(' => self.read_literal_string(),
            b'/' => self.read_name(),
            b'[' => {
                self.advance()?;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.advance()?;
                Ok(Token::ArrayEnd)
            }
            b'<' => {
                self.advance()?;
                if self.current == Some(b'<') {
                    self.advance()?;
                    Ok(Token::DictStart)
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                self.advance()?;
                if self.current == Some(b'>') {
                    self.advance()?;
                    Ok(Token::DictEnd)
                } else {
                    Err(PDFError::Malformed("lone '>' in object data".to_string()))
                }
            }
            b')' | b'{' | b'}' => Err(PDFError::Malformed(format!(
                "unexpected delimiter '{}'",
                byte as char
            ))),
            _ => self.read_keyword(),
        }
    }

    fn read_number(&mut self) -> PDFResult<Token> {
        let mut text = Vec::new();
        while let Some(b) = self.current {
            if b.is_ascii_digit() || b == b'+' || b == b'-' || b == b'.' {
                text.push(b);
                self.advance()?;
            } else {
                break;
            }
        }

        let text = String::from_utf8_lossy(&text).into_owned();
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| PDFError::Malformed(format!("invalid number '{}'", text)))
    }

    fn read_literal_string(&mut self) -> PDFResult<Token> {
        self.advance()?; // consume '('
        let mut bytes = Vec::new();
        let mut depth = 1usize;

        loop {
            let byte = self
                .current
                .ok_or_else(|| PDFError::Malformed("unterminated literal string".to_string()))?;

            match byte {
                b'(' => {
                    depth += 1;
                    bytes.push(byte);
                    self.advance()?;
                }
                b')' => {
                    depth -= 1;
                    self.advance()?;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(byte);
                }
                b'\\' => {
                    self.advance()?;
                    let escaped = self.current.ok_or_else(|| {
                        PDFError::Malformed("unterminated string escape".to_string())
                    })?;
                    match escaped {
                        b'n' => {
                            bytes.push(b'\n');
                            self.advance()?;
                        }
                        b'r' => {
                            bytes.push(b'\r');
                            self.advance()?;
                        }
                        b't' => {
                            bytes.push(b'\t');
                            self.advance()?;
                        }
                        b'b' => {
                            bytes.push(0x08);
                            self.advance()?;
                        }
                        b'f' => {
                            bytes.push(0x0C);
                            self.advance()?;
                        }
                        b'0'..=b'7' => {
                            // Up to three octal digits
                            let mut value = 0u16;
                            for _ in 0..3 {
                                match self.current {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u16;
                                        self.advance()?;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push(value as u8);
                        }
                        b'\n' => {
                            // Line continuation
                            self.advance()?;
                        }
                        b'\r' => {
                            self.advance()?;
                            if self.current == Some(b'\n') {
                                self.advance()?;
                            }
                        }
                        other => {
                            // Unknown escape: the backslash is dropped
                            bytes.push(other);
                            self.advance()?;
                        }
                    }
                }
                _ => {
                    bytes.push(byte);
                    self.advance()?;
                }
            }
        }

        Ok(Token::String(bytes))
    }

    fn read_hex_string(&mut self) -> PDFResult<Token> {
        // '<' already consumed
        let mut digits = Vec::new();

        loop {
            let byte = self
                .current
                .ok_or_else(|| PDFError::Malformed("unterminated hex string".to_string()))?;

            match byte {
                b'>' => {
                    self.advance()?;
                    break;
                }
                b if b.is_ascii_hexdigit() => {
                    digits.push(b);
                    self.advance()?;
                }
                b if is_whitespace(b) => self.advance()?,
                b => {
                    return Err(PDFError::Malformed(format!(
                        "invalid hex digit '{}'",
                        b as char
                    )));
                }
            }
        }

        // Odd digit count: the final digit is padded with zero
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }

        let hex_value = |d: u8| -> u8 {
            match d {
                b'0'..=b'9' => d - b'0',
                b'a'..=b'f' => d - b'a' + 10,
                _ => d - b'A' + 10,
            }
        };

        let bytes = digits
            .chunks(2)
            .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
            .collect();

        Ok(Token::HexString(bytes))
    }

    fn read_name(&mut self) -> PDFResult<Token> {
        self.advance()?; // consume '/'
        let mut bytes = Vec::new();

        while let Some(byte) = self.current {
            if !is_regular(byte) {
                break;
            }
            if byte == b'#' {
                self.advance()?;
                let hi = self.current.filter(|b| b.is_ascii_hexdigit());
                self.advance()?;
                let lo = self.current.filter(|b| b.is_ascii_hexdigit());
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let decode = |d: u8| -> u8 {
                            match d {
                                b'0'..=b'9' => d - b'0',
                                b'a'..=b'f' => d - b'a' + 10,
                                _ => d - b'A' + 10,
                            }
                        };
                        bytes.push((decode(hi) << 4) | decode(lo));
                        self.advance()?;
                    }
                    _ => {
                        return Err(PDFError::Malformed(
                            "invalid #-escape in name".to_string(),
                        ));
                    }
                }
            } else {
                bytes.push(byte);
                self.advance()?;
            }
        }

        Ok(Token::Name(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_keyword(&mut self) -> PDFResult<Token> {
        let mut bytes = Vec::new();
        while let Some(byte) = self.current {
            if !is_regular(byte) {
                break;
            }
            bytes.push(byte);
            self.advance()?;
        }

        let word = String::from_utf8_lossy(&bytes).into_owned();
        match word.as_str() {
            "true" => Ok(Token::Boolean(true)),
            "false" => Ok(Token::Boolean(false)),
            "null" => Ok(Token::Null),
            _ => Ok(Token::Command(word)),
        }
    }
}
