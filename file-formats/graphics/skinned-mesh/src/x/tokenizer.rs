//! Token stream over text and binary X bodies
//!
//! Both encodings produce the same [`Token`] values. Binary integer and float
//! lists are expanded into one token per value, so the parser reads numbers
//! the same way regardless of encoding. List separators (`;` and `,`) carry no
//! information for the object types the loader understands and are skipped by
//! the `read_*` helpers.

use std::collections::VecDeque;

use byteorder::{ByteOrder, LittleEndian};

use super::header::{FloatSize, XEncoding, XHeader};
use crate::error::{MeshError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Str(String),
    Int(i64),
    Float(f64),
    Guid,
    OpenBrace,
    CloseBrace,
    /// `;` or `,`
    Separator,
    /// `(`, `)`, `[`, `]`, `<`, `>` or `.`
    Punct(char),
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Name(name) => format!("name '{name}'"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Int(i) => format!("integer {i}"),
            Self::Float(f) => format!("float {f}"),
            Self::Guid => "GUID".to_string(),
            Self::OpenBrace => "'{'".to_string(),
            Self::CloseBrace => "'}'".to_string(),
            Self::Separator => "separator".to_string(),
            Self::Punct(c) => format!("'{c}'"),
            Self::Eof => "end of file".to_string(),
        }
    }
}

fn binary_keyword(code: u16) -> Option<&'static str> {
    Some(match code {
        0x1f => "template",
        0x28 => "WORD",
        0x29 => "DWORD",
        0x2a => "FLOAT",
        0x2b => "DOUBLE",
        0x2c => "CHAR",
        0x2d => "UCHAR",
        0x2e => "SWORD",
        0x2f => "SDWORD",
        0x30 => "void",
        0x31 => "string",
        0x32 => "unicode",
        0x33 => "cstring",
        0x34 => "array",
        _ => return None,
    })
}

fn is_delimiter(c: u8) -> bool {
    c.is_ascii_whitespace() || matches!(c, b'{' | b'}' | b'"' | b';' | b',' | b'<' | b'>' | b'(' | b')' | b'[' | b']')
}

/// Reads tokens from the body of an X file
pub struct Tokenizer {
    name: String,
    data: Vec<u8>,
    pos: usize,
    /// Absolute offset of `data[0]` in the file
    base_offset: usize,
    encoding: XEncoding,
    float_size: FloatSize,
    line: usize,
    token_offset: usize,
    token_line: usize,
    pending: VecDeque<Token>,
}

impl Tokenizer {
    pub fn new(name: impl Into<String>, data: Vec<u8>, base_offset: usize, header: &XHeader) -> Self {
        let mut tokenizer = Self {
            name: name.into(),
            data,
            pos: 0,
            base_offset,
            encoding: header.encoding,
            float_size: header.float_size,
            line: 1,
            token_offset: 0,
            token_line: 1,
            pending: VecDeque::new(),
        };
        if tokenizer.encoding == XEncoding::Text {
            // The rest of the header line is ignored
            tokenizer.skip_line();
        }
        tokenizer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding(&self) -> XEncoding {
        self.encoding
    }

    /// Structural error at the current token
    pub fn error(&self, message: impl Into<String>) -> MeshError {
        match self.encoding {
            XEncoding::Text => MeshError::at_line(&self.name, self.token_line, message),
            XEncoding::Binary => {
                MeshError::at_offset(&self.name, (self.base_offset + self.token_offset) as u64, message)
            }
        }
    }

    /// Human readable position of the current token, for warnings
    pub fn location(&self) -> String {
        match self.encoding {
            XEncoding::Text => format!("line {}", self.token_line),
            XEncoding::Binary => format!("offset {}", self.base_offset + self.token_offset),
        }
    }

    pub fn next(&mut self) -> Result<Token> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(token);
        }
        self.read_token()
    }

    pub fn peek(&mut self) -> Result<&Token> {
        if self.pending.is_empty() {
            let token = self.read_token()?;
            self.pending.push_back(token);
        }
        self.pending
            .front()
            .ok_or_else(|| self.error("token stream is empty"))
    }

    /// Next token that is not a list separator
    pub fn next_significant(&mut self) -> Result<Token> {
        loop {
            match self.next()? {
                Token::Separator => continue,
                token => return Ok(token),
            }
        }
    }

    /// Peek past separators without consuming the significant token
    pub fn peek_significant(&mut self) -> Result<&Token> {
        while matches!(self.peek()?, Token::Separator) {
            self.next()?;
        }
        self.peek()
    }

    pub fn read_int(&mut self) -> Result<i64> {
        match self.next_significant()? {
            Token::Int(value) => Ok(value),
            Token::Float(value) => Ok(value as i64),
            other => Err(self.error(format!("expected integer, found {}", other.describe()))),
        }
    }

    /// Read a non-negative count or index
    pub fn read_count(&mut self) -> Result<usize> {
        let value = self.read_int()?;
        usize::try_from(value).map_err(|_| self.error(format!("expected a non-negative integer, found {value}")))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        match self.next_significant()? {
            Token::Float(value) => Ok(value as f32),
            Token::Int(value) => Ok(value as f32),
            other => Err(self.error(format!("expected number, found {}", other.describe()))),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        match self.next_significant()? {
            Token::Str(s) | Token::Name(s) => Ok(s),
            other => Err(self.error(format!("expected string, found {}", other.describe()))),
        }
    }

    pub fn expect_open_brace(&mut self) -> Result<()> {
        match self.next_significant()? {
            Token::OpenBrace => Ok(()),
            other => Err(self.error(format!("expected '{{', found {}", other.describe()))),
        }
    }

    pub fn expect_close_brace(&mut self) -> Result<()> {
        match self.next_significant()? {
            Token::CloseBrace => Ok(()),
            other => Err(self.error(format!("expected '}}', found {}", other.describe()))),
        }
    }

    /// Skip tokens until the brace matching an already consumed `{`
    pub fn skip_block(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Token::OpenBrace => depth += 1,
                Token::CloseBrace => depth -= 1,
                Token::Eof => return Err(self.error("unexpected end of file inside a block")),
                _ => {}
            }
        }
        Ok(())
    }

    fn read_token(&mut self) -> Result<Token> {
        match self.encoding {
            XEncoding::Text => self.read_text_token(),
            XEncoding::Binary => loop {
                if let Some(token) = self.read_binary_token()? {
                    return Ok(token);
                }
            },
        }
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.data.get(self.pos) {
            self.pos += 1;
            if c == b'\n' {
                self.line += 1;
                return;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&c) = self.data.get(self.pos) {
            if c == b'\n' {
                self.line += 1;
                self.pos += 1;
            } else if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'#' || (c == b'/' && self.data.get(self.pos + 1) == Some(&b'/')) {
                self.skip_line();
            } else {
                return;
            }
        }
    }

    fn is_number_start(&self) -> bool {
        let at = |i: usize| self.data.get(self.pos + i).copied();
        match at(0) {
            Some(c) if c.is_ascii_digit() => true,
            Some(b'-' | b'+') => match at(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some(b'.') => at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            },
            Some(b'.') => at(1).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn read_text_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();
        self.token_offset = self.pos;
        self.token_line = self.line;

        let Some(&c) = self.data.get(self.pos) else {
            return Ok(Token::Eof);
        };

        if self.is_number_start() {
            return self.read_text_number();
        }

        self.pos += 1;
        let token = match c {
            b'{' => Token::OpenBrace,
            b'}' => Token::CloseBrace,
            b';' | b',' => Token::Separator,
            b'(' | b')' | b'[' | b']' | b'.' | b'>' => Token::Punct(c as char),
            b'"' => {
                let start = self.pos;
                let end = self.data[start..]
                    .iter()
                    .position(|&b| b == b'"')
                    .map(|i| start + i)
                    .ok_or_else(|| self.error("unterminated string"))?;
                let text = String::from_utf8_lossy(&self.data[start..end]).into_owned();
                self.line += text.matches('\n').count();
                self.pos = end + 1;
                Token::Str(text)
            }
            b'<' => {
                let end = self.data[self.pos..]
                    .iter()
                    .position(|&b| b == b'>')
                    .ok_or_else(|| self.error("unterminated GUID"))?;
                self.pos += end + 1;
                Token::Guid
            }
            _ => {
                let start = self.pos - 1;
                while self.data.get(self.pos).is_some_and(|&b| !is_delimiter(b)) {
                    self.pos += 1;
                }
                Token::Name(String::from_utf8_lossy(&self.data[start..self.pos]).into_owned())
            }
        };
        Ok(token)
    }

    fn read_text_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(&c) = self.data.get(self.pos) {
            let exponent_sign = matches!(c, b'-' | b'+')
                && self.pos > start
                && matches!(self.data[self.pos - 1], b'e' | b'E');
            if c.is_ascii_digit() || (self.pos == start && matches!(c, b'-' | b'+')) || exponent_sign {
                self.pos += 1;
            } else if matches!(c, b'.' | b'e' | b'E') {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        let token = if is_float {
            text.parse().ok().map(Token::Float)
        } else {
            text.parse().ok().map(Token::Int)
        };
        token.ok_or_else(|| self.error(format!("invalid number '{text}'")))
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error(format!("token needs {count} bytes past the end of file")))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn take_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Reserve room for `count` values of `width` bytes, rejecting impossible counts
    fn check_list(&self, count: usize, width: usize) -> Result<()> {
        let available = self.data.len().saturating_sub(self.pos);
        if count.saturating_mul(width) > available {
            return Err(self.error(format!("list of {count} values runs past the end of file")));
        }
        Ok(())
    }

    /// Read one binary record; lists are queued and `None` is returned for empty ones
    fn read_binary_token(&mut self) -> Result<Option<Token>> {
        self.token_offset = self.pos;
        if self.pos >= self.data.len() {
            return Ok(Some(Token::Eof));
        }
        if self.pos + 1 == self.data.len() {
            // A single padding byte at the end
            self.pos += 1;
            return Ok(Some(Token::Eof));
        }

        let code = self.take_u16()?;
        let token = match code {
            0x01 | 0x02 => {
                let len = self.take_u32()? as usize;
                let text = String::from_utf8_lossy(self.take(len)?).into_owned();
                if code == 0x01 {
                    Token::Name(text)
                } else {
                    Token::Str(text)
                }
            }
            0x03 => Token::Int(i64::from(self.take_u32()?)),
            0x05 => {
                self.take(16)?;
                Token::Guid
            }
            0x06 => {
                let count = self.take_u32()? as usize;
                self.check_list(count, 4)?;
                for _ in 0..count {
                    let value = self.take_u32()?;
                    self.pending.push_back(Token::Int(i64::from(value)));
                }
                return Ok(self.pending.pop_front());
            }
            0x07 => {
                let count = self.take_u32()? as usize;
                let width = self.float_size.bytes();
                self.check_list(count, width)?;
                for _ in 0..count {
                    let value = match self.float_size {
                        FloatSize::F32 => f64::from(LittleEndian::read_f32(self.take(4)?)),
                        FloatSize::F64 => LittleEndian::read_f64(self.take(8)?),
                    };
                    self.pending.push_back(Token::Float(value));
                }
                return Ok(self.pending.pop_front());
            }
            0x0a => Token::OpenBrace,
            0x0b => Token::CloseBrace,
            0x0c => Token::Punct('('),
            0x0d => Token::Punct(')'),
            0x0e => Token::Punct('['),
            0x0f => Token::Punct(']'),
            0x10 => Token::Punct('<'),
            0x11 => Token::Punct('>'),
            0x12 => Token::Punct('.'),
            0x13 | 0x14 => Token::Separator,
            other => match binary_keyword(other) {
                Some(keyword) => Token::Name(keyword.to_string()),
                None => return Err(self.error(format!("unknown binary token 0x{other:04x}"))),
            },
        };
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(body: &str) -> Tokenizer {
        let header = XHeader::parse(b"xof 0303txt 0032").unwrap();
        Tokenizer::new("test.x", format!("\n{body}").into_bytes(), 16, &header)
    }

    fn collect(mut tokenizer: Tokenizer) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.next().unwrap();
            if token == Token::Eof {
                return tokens;
            }
            tokens.push(token);
        }
    }

    #[test]
    fn test_text_tokens() {
        let tokens = collect(text(
            "Frame Root{ // comment\n  FrameTransformMatrix { 1.0,-2,3e2;; }\n # other\n \"tex.png\"; <GUID-1> }",
        ));
        assert_eq!(
            tokens,
            vec![
                Token::Name("Frame".into()),
                Token::Name("Root".into()),
                Token::OpenBrace,
                Token::Name("FrameTransformMatrix".into()),
                Token::OpenBrace,
                Token::Float(1.0),
                Token::Separator,
                Token::Int(-2),
                Token::Separator,
                Token::Float(300.0),
                Token::Separator,
                Token::Separator,
                Token::CloseBrace,
                Token::Str("tex.png".into()),
                Token::Separator,
                Token::Guid,
                Token::CloseBrace,
            ]
        );
    }

    #[test]
    fn test_text_error_reports_line() {
        let mut tokenizer = text("Mesh {\n\n \"open");
        tokenizer.next().unwrap();
        tokenizer.next().unwrap();
        let err = tokenizer.next().unwrap_err().to_string();
        assert!(err.contains("line 4"), "{err}");
    }

    #[test]
    fn test_read_helpers_skip_separators() {
        let mut tokenizer = text("3;\n 1.5, 2;;");
        assert_eq!(tokenizer.read_count().unwrap(), 3);
        assert_eq!(tokenizer.read_float().unwrap(), 1.5);
        assert_eq!(tokenizer.read_float().unwrap(), 2.0);
        assert_eq!(tokenizer.next_significant().unwrap(), Token::Eof);
    }

    #[test]
    fn test_binary_lists_expand() {
        let header = XHeader::parse(b"xof 0303bin 0032").unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(b"Mesh");
        body.extend_from_slice(&0x0au16.to_le_bytes());
        body.extend_from_slice(&6u16.to_le_bytes());
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&7u32.to_le_bytes());
        body.extend_from_slice(&9u32.to_le_bytes());
        body.extend_from_slice(&7u16.to_le_bytes());
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&0.5f32.to_le_bytes());
        body.extend_from_slice(&0x0bu16.to_le_bytes());

        let tokens = collect(Tokenizer::new("test.x", body, 16, &header));
        assert_eq!(
            tokens,
            vec![
                Token::Name("Mesh".into()),
                Token::OpenBrace,
                Token::Int(7),
                Token::Int(9),
                Token::Float(0.5),
                Token::CloseBrace,
            ]
        );
    }

    #[test]
    fn test_binary_truncated_list_is_an_error() {
        let header = XHeader::parse(b"xof 0303bin 0032").unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&7u16.to_le_bytes());
        body.extend_from_slice(&1000u32.to_le_bytes());
        let mut tokenizer = Tokenizer::new("test.x", body, 16, &header);
        let err = tokenizer.next().unwrap_err();
        assert!(matches!(err, MeshError::Parse { .. }));
    }
}
