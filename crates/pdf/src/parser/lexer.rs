//! Recovering tokenizer for page content streams.
//!
//! Turns raw (already decompressed) content-stream bytes into a flat list of
//! [`ContentOp`]s. Decoding stops at the first hard lexical error (an
//! unterminated string, array or dictionary, or a stray closing delimiter);
//! every operation decoded before that point is kept so that a truncated or
//! partially corrupt stream still yields partial results.

use std::fmt;

use super::backend::{ContentOp, PdfValue};

/// Where and why decoding stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub kind: LexErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedHexString,
    UnterminatedArray,
    UnterminatedDictionary,
    UnexpectedDelimiter(u8),
    UnexpectedKeyword,
    InvalidDictionaryKey,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LexErrorKind::UnterminatedString => write!(f, "unterminated string")?,
            LexErrorKind::UnterminatedHexString => write!(f, "unterminated hex string")?,
            LexErrorKind::UnterminatedArray => write!(f, "unterminated array")?,
            LexErrorKind::UnterminatedDictionary => write!(f, "unterminated dictionary")?,
            LexErrorKind::UnexpectedDelimiter(c) => {
                write!(f, "unexpected delimiter {:?}", c as char)?
            }
            LexErrorKind::UnexpectedKeyword => write!(f, "operator inside array or dictionary")?,
            LexErrorKind::InvalidDictionaryKey => write!(f, "dictionary key is not a name")?,
        }
        write!(f, " at byte {}", self.offset)
    }
}

/// Result of decoding a content stream.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub ops: Vec<ContentOp>,
    /// Set when decoding stopped before the end of the input.
    pub error: Option<LexError>,
}

/// Decode a content stream into operations, recovering from corruption by
/// truncating at the first lexical error.
pub fn decode_operations(data: &[u8]) -> Decoded {
    let mut lexer = Lexer::new(data);
    let mut ops = Vec::new();
    let mut operands = Vec::new();

    loop {
        match lexer.next_token() {
            Ok(None) => break,
            Ok(Some(Token::Value(value))) => operands.push(value),
            Ok(Some(Token::Operator(operator))) => {
                let is_inline_image = operator == "BI";
                ops.push(ContentOp {
                    operator,
                    operands: std::mem::take(&mut operands),
                });
                if is_inline_image {
                    lexer.skip_inline_image();
                }
            }
            Err(error) => return Decoded { ops, error: Some(error) },
        }
    }

    Decoded { ops, error: None }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

enum Token {
    Value(PdfValue),
    Operator(String),
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b'\0' | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

fn is_delimiter(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn error(&self, offset: usize, kind: LexErrorKind) -> LexError {
        LexError { offset, kind }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.pos += 1;
            } else if c == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            b'(' => Token::Value(self.literal_string()?),
            b'<' if self.peek_at(1) == Some(b'<') => Token::Value(self.dictionary()?),
            b'<' => Token::Value(self.hex_string()?),
            b'[' => Token::Value(self.array()?),
            b'/' => Token::Value(self.name()),
            b')' | b'>' | b']' | b'{' | b'}' => {
                return Err(self.error(self.pos, LexErrorKind::UnexpectedDelimiter(c)));
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => Token::Value(self.number()),
            _ => {
                let word = self.regular_word();
                match word.as_str() {
                    "true" => Token::Value(PdfValue::Bool(true)),
                    "false" => Token::Value(PdfValue::Bool(false)),
                    "null" => Token::Value(PdfValue::Null),
                    _ => Token::Operator(word),
                }
            }
        };

        Ok(Some(token))
    }

    /// Parse a value in a nested context (array element or dictionary
    /// entry), where operators are not allowed.
    fn nested_value(&mut self, closer: u8, unterminated: LexErrorKind, start: usize) -> Result<Option<PdfValue>, LexError> {
        self.skip_whitespace_and_comments();
        match self.peek() {
            None => Err(self.error(start, unterminated)),
            Some(c) if c == closer => Ok(None),
            Some(_) => {
                let at = self.pos;
                match self.next_token()? {
                    Some(Token::Value(value)) => Ok(Some(value)),
                    Some(Token::Operator(_)) => Err(self.error(at, LexErrorKind::UnexpectedKeyword)),
                    None => Err(self.error(start, unterminated)),
                }
            }
        }
    }

    fn regular_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !is_regular(c) {
                break;
            }
            self.pos += 1;
        }
        // A lone non-regular byte can never reach here, but guard against
        // zero-length words so the lexer always makes progress.
        if self.pos == start {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.pos]).into_owned()
    }

    /// Malformed numbers decode to `Null`, which makes the consuming
    /// operator skip itself rather than aborting the stream.
    fn number(&mut self) -> PdfValue {
        let word = self.regular_word();
        if word.contains('.') {
            word.parse::<f64>().map(PdfValue::Real).unwrap_or(PdfValue::Null)
        } else {
            word.parse::<i64>()
                .map(PdfValue::Integer)
                .unwrap_or(PdfValue::Null)
        }
    }

    fn name(&mut self) -> PdfValue {
        self.pos += 1; // '/'
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            if !is_regular(c) {
                break;
            }
            if c == b'#' {
                if let (Some(h), Some(l)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                ) {
                    out.push(h << 4 | l);
                    self.pos += 3;
                    continue;
                }
            }
            out.push(c);
            self.pos += 1;
        }
        PdfValue::Name(out)
    }

    fn literal_string(&mut self) -> Result<PdfValue, LexError> {
        let start = self.pos;
        self.pos += 1; // '('
        let mut depth = 1usize;
        let mut out = Vec::new();

        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                b'(' => {
                    depth += 1;
                    out.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(PdfValue::Str(out));
                    }
                    out.push(c);
                }
                b'\\' => {
                    let Some(esc) = self.peek() else { break };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                _ => out.push(c),
            }
        }

        Err(self.error(start, LexErrorKind::UnterminatedString))
    }

    fn hex_string(&mut self) -> Result<PdfValue, LexError> {
        let start = self.pos;
        self.pos += 1; // '<'
        let mut nibbles = Vec::new();

        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'>' {
                if nibbles.len() % 2 == 1 {
                    nibbles.push(0);
                }
                let bytes = nibbles.chunks(2).map(|p| p[0] << 4 | p[1]).collect();
                return Ok(PdfValue::Str(bytes));
            }
            if let Some(v) = hex_value(c) {
                nibbles.push(v);
            }
        }

        Err(self.error(start, LexErrorKind::UnterminatedHexString))
    }

    fn array(&mut self) -> Result<PdfValue, LexError> {
        let start = self.pos;
        self.pos += 1; // '['
        let mut items = Vec::new();
        while let Some(value) = self.nested_value(b']', LexErrorKind::UnterminatedArray, start)? {
            items.push(value);
        }
        self.pos += 1; // ']'
        Ok(PdfValue::Array(items))
    }

    fn dictionary(&mut self) -> Result<PdfValue, LexError> {
        let start = self.pos;
        self.pos += 2; // '<<'
        let mut entries = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            if self.peek() == Some(b'>') && self.peek_at(1) == Some(b'>') {
                self.pos += 2;
                return Ok(PdfValue::Dict(entries));
            }
            let key_at = self.pos;
            let key = match self.nested_value(b'>', LexErrorKind::UnterminatedDictionary, start)? {
                Some(PdfValue::Name(key)) => key,
                Some(_) | None => {
                    return Err(self.error(key_at, LexErrorKind::InvalidDictionaryKey));
                }
            };
            let value = self
                .nested_value(b'>', LexErrorKind::UnterminatedDictionary, start)?
                .unwrap_or(PdfValue::Null);
            entries.push((key, value));
        }
    }

    /// Skip an inline image: its parameter dictionary up to `ID`, then the
    /// raw sample bytes up to a delimited `EI`.
    fn skip_inline_image(&mut self) {
        loop {
            match self.next_token() {
                Ok(Some(Token::Operator(op))) if op == "ID" => break,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => {
                    self.pos = self.data.len();
                    return;
                }
            }
        }

        // Exactly one whitespace byte separates `ID` from the data.
        self.pos += 1;
        let data = self.data;
        let mut i = self.pos;
        while i + 1 < data.len() {
            let preceded = i == 0 || is_whitespace(data[i - 1]);
            let followed = data.get(i + 2).is_none_or(|&c| is_whitespace(c));
            if preceded && followed && data[i] == b'E' && data[i + 1] == b'I' {
                self.pos = i + 2;
                return;
            }
            i += 1;
        }
        self.pos = data.len();
    }
}
