//! Byte cursor over one raw line
//!
//! A position over an immutable buffer with just enough JSON awareness to
//! read the tokens the scanner wants and skip whole subtrees it does not.
//! Strings borrow from the line unless an escape forces an owned copy.

use std::borrow::Cow;

use rust_decimal::Decimal;

use crate::error::{Result, StreamError};

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn err(&self, message: impl Into<String>) -> StreamError {
        StreamError::Parse {
            pos: self.pos,
            message: message.into(),
        }
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Consume `b` if it is the next non-whitespace byte
    pub fn eat(&mut self, b: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", b as char)))
        }
    }

    fn expect_lit(&mut self, lit: &[u8]) -> Result<()> {
        if self.buf[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(self.err("unexpected token"))
        }
    }

    /// Read an object key and its ':' separator
    pub fn read_key(&mut self) -> Result<Cow<'a, str>> {
        let key = self.read_string()?;
        self.expect(b':')?;
        Ok(key)
    }

    pub fn read_string(&mut self) -> Result<Cow<'a, str>> {
        self.skip_ws();
        self.expect(b'"')?;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string")),
                Some(b'"') => {
                    let raw = &self.buf[start..self.pos];
                    self.pos += 1;
                    let s = std::str::from_utf8(raw)
                        .map_err(|_| self.err("invalid utf-8 in string"))?;
                    return Ok(Cow::Borrowed(s));
                }
                Some(b'\\') => return self.read_string_escaped(start),
                Some(_) => self.pos += 1,
            }
        }
    }

    /// A string value that may be null
    pub fn read_opt_string(&mut self) -> Result<Option<Cow<'a, str>>> {
        self.skip_ws();
        if self.peek() == Some(b'n') {
            self.expect_lit(b"null")?;
            return Ok(None);
        }
        self.read_string().map(Some)
    }

    fn read_string_escaped(&mut self, start: usize) -> Result<Cow<'a, str>> {
        let mut out = String::with_capacity(self.pos - start + 16);
        out.push_str(
            std::str::from_utf8(&self.buf[start..self.pos])
                .map_err(|_| self.err("invalid utf-8 in string"))?,
        );
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Cow::Owned(out));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let esc = self.peek().ok_or_else(|| self.err("unterminated escape"))?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => out.push(self.read_unicode_escape()?),
                        _ => return Err(self.err("invalid escape")),
                    }
                }
                Some(_) => {
                    let run = self.pos;
                    while matches!(self.peek(), Some(b) if b != b'"' && b != b'\\') {
                        self.pos += 1;
                    }
                    out.push_str(
                        std::str::from_utf8(&self.buf[run..self.pos])
                            .map_err(|_| self.err("invalid utf-8 in string"))?,
                    );
                }
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let hi = self.read_hex4()?;
        if (0xD800..0xDC00).contains(&hi) {
            // surrogate pair
            self.expect_lit(b"\\u")
                .map_err(|_| self.err("lone leading surrogate"))?;
            let lo = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&lo) {
                return Err(self.err("invalid trailing surrogate"));
            }
            let c = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
            return char::from_u32(c).ok_or_else(|| self.err("invalid surrogate pair"));
        }
        char::from_u32(hi).ok_or_else(|| self.err("invalid unicode escape"))
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..4 {
            let b = self.peek().ok_or_else(|| self.err("truncated unicode escape"))?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| self.err("invalid hex digit"))?;
            self.pos += 1;
            v = v * 16 + digit;
        }
        Ok(v)
    }

    fn number_slice(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        while matches!(
            self.peek(),
            Some(b'0'..=b'9' | b'.' | b'e' | b'E' | b'-' | b'+')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected number"));
        }
        std::str::from_utf8(&self.buf[start..self.pos]).map_err(|_| self.err("invalid number"))
    }

    pub fn read_decimal(&mut self) -> Result<Decimal> {
        let s = self.number_slice()?;
        if s.contains(['e', 'E']) {
            Decimal::from_scientific(s).map_err(|_| self.err(format!("invalid decimal '{s}'")))
        } else {
            s.parse::<Decimal>()
                .map_err(|_| self.err(format!("invalid decimal '{s}'")))
        }
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let s = self.number_slice()?;
        s.parse::<i64>()
            .or_else(|_| s.parse::<f64>().map(|f| f as i64))
            .map_err(|_| self.err(format!("invalid integer '{s}'")))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.skip_ws();
        match self.peek() {
            Some(b't') => self.expect_lit(b"true").map(|_| true),
            Some(b'f') => self.expect_lit(b"false").map(|_| false),
            _ => Err(self.err("expected boolean")),
        }
    }

    /// Skip one whole value, nested subtrees included
    pub fn skip_value(&mut self) -> Result<()> {
        self.skip_ws();
        match self.peek().ok_or_else(|| self.err("unexpected end of input"))? {
            b'"' => self.skip_string(),
            b'{' | b'[' => self.skip_container(),
            b't' => self.expect_lit(b"true"),
            b'f' => self.expect_lit(b"false"),
            b'n' => self.expect_lit(b"null"),
            b'-' | b'0'..=b'9' => self.number_slice().map(|_| ()),
            _ => Err(self.err("unexpected token")),
        }
    }

    fn skip_string(&mut self) -> Result<()> {
        self.expect(b'"')?;
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\\') => self.pos += 2,
                Some(_) => self.pos += 1,
            }
        }
    }

    fn skip_container(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated value")),
                Some(b'"') => self.skip_string()?,
                Some(b'{' | b'[') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}' | b']') => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_read_scalars() {
        let mut c = Cursor::new(br#"{"a":1.5,"b":-7,"c":true,"d":"x"}"#);
        c.expect(b'{').unwrap();
        assert_eq!(c.read_key().unwrap(), "a");
        assert_eq!(c.read_decimal().unwrap(), dec!(1.5));
        assert!(c.eat(b','));
        assert_eq!(c.read_key().unwrap(), "b");
        assert_eq!(c.read_i64().unwrap(), -7);
        assert!(c.eat(b','));
        assert_eq!(c.read_key().unwrap(), "c");
        assert!(c.read_bool().unwrap());
        assert!(c.eat(b','));
        assert_eq!(c.read_key().unwrap(), "d");
        assert_eq!(c.read_string().unwrap(), "x");
        c.expect(b'}').unwrap();
    }

    #[test]
    fn test_borrowed_vs_owned_strings() {
        let mut c = Cursor::new(br#""plain""#);
        assert!(matches!(c.read_string().unwrap(), Cow::Borrowed("plain")));

        // Escapes plus a raw multi-byte character in the same string
        let mut c = Cursor::new("\"a\\\"b\\n\u{e9}\"".as_bytes());
        let s = c.read_string().unwrap();
        assert!(matches!(s, Cow::Owned(_)));
        assert_eq!(s, "a\"b\n\u{e9}");
    }

    #[test]
    fn test_surrogate_pair() {
        let mut c = Cursor::new(br#""\ud83d\ude00""#);
        assert_eq!(c.read_string().unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_opt_string_null() {
        let mut c = Cursor::new(b"null");
        assert_eq!(c.read_opt_string().unwrap(), None);
    }

    #[test]
    fn test_skip_value_whole_subtree() {
        let mut c = Cursor::new(br#"{"deep":{"a":[1,{"b":"}]"}],"c":null},"next":2}"#);
        c.expect(b'{').unwrap();
        assert_eq!(c.read_key().unwrap(), "deep");
        c.skip_value().unwrap();
        assert!(c.eat(b','));
        assert_eq!(c.read_key().unwrap(), "next");
        assert_eq!(c.read_i64().unwrap(), 2);
    }

    #[test]
    fn test_scientific_numbers() {
        let mut c = Cursor::new(b"1.2E2");
        assert_eq!(c.read_decimal().unwrap(), dec!(120));
    }

    #[test]
    fn test_unterminated_object_is_a_parse_error() {
        let mut c = Cursor::new(br#"{"a":"#);
        c.expect(b'{').unwrap();
        c.read_key().unwrap();
        assert!(matches!(c.skip_value(), Err(StreamError::Parse { .. })));
    }
}
