//! Sequential EDIF tokenizer.
//!
//! Tokens are `(`, `)`, quoted strings (quotes stripped) and
//! bare identifiers terminated by any of `( ) " space \n \r \t`.

use std::io::BufRead;
use std::sync::Arc;
use crate::{ EdifParseError, Result, StringPool, Ident };

lazy_static::lazy_static! {
    pub(crate) static ref LEFT_PAREN: Ident = Arc::from("(");
    pub(crate) static ref RIGHT_PAREN: Ident = Arc::from(")");
}

/// A lexical token with the absolute byte offset just past it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub text: Ident,
    pub offset: u64,
}

impl Token {
    #[inline]
    pub fn is(&self, s: &str) -> bool {
        self.text.eq_ignore_ascii_case(s)
    }
}

/// Common interface of the two tokenizer variants.
pub trait TokenSource {
    /// Reads the next token, or `None` at end of file.
    ///
    /// `short_lived` tells the tokenizer the text will be
    /// dropped soon, so it is not worth interning.
    fn next_token(&mut self, short_lived: bool) -> Result<Option<Token>>;

    /// Discards the next `n` bytes of raw input.
    fn skip(&mut self, n: u64) -> Result<()>;

    /// Absolute offset of the next unread byte.
    fn byte_offset(&self) -> u64;

    /// Canonical instance of `s` in the shared string pool.
    fn intern(&self, s: &str) -> Ident;
}

#[inline]
pub(crate) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\n' | b'\r' | b'\t')
}

/// characters that terminate a bare token.
#[inline]
pub(crate) fn is_ender(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'"' | b' ' | b'\n' | b'\r' | b'\t')
}

/// builds the token text, interning long-lived identifiers.
pub(crate) fn make_text(
    pool: &StringPool, bytes: &[u8], short_lived: bool, intern_threshold: usize
) -> Ident {
    let s = String::from_utf8_lossy(bytes);
    if short_lived || bytes.len() < intern_threshold {
        Arc::from(s.as_ref())
    }
    else {
        pool.intern(&s)
    }
}

/// Streaming tokenizer over any buffered reader.
///
/// This is the simple variant used by the sequential parser.
/// It cannot recover a token boundary after a raw skip.
pub struct EdifTokenizer<R> {
    input: R,
    offset: u64,
    max_token_length: usize,
    intern_threshold: usize,
    pool: Arc<StringPool>,
    buf: Vec<u8>,
}

impl<R: BufRead> EdifTokenizer<R> {
    pub fn new(input: R, pool: Arc<StringPool>, max_token_length: usize) -> Self {
        EdifTokenizer {
            input, offset: 0, max_token_length,
            intern_threshold: 8,
            pool,
            buf: Vec::with_capacity(256),
        }
    }

    pub fn with_intern_threshold(mut self, threshold: usize) -> Self {
        self.intern_threshold = threshold;
        self
    }

    pub fn pool(&self) -> &Arc<StringPool> {
        &self.pool
    }

    /// skips whitespace and returns the first significant byte
    /// without consuming it.
    fn peek_significant(&mut self) -> Result<Option<u8>> {
        loop {
            let avail = self.input.fill_buf()?;
            if avail.is_empty() {
                return Ok(None)
            }
            let n = avail.iter().take_while(|c| is_whitespace(**c)).count();
            let first = avail.get(n).copied();
            self.input.consume(n);
            self.offset += n as u64;
            if first.is_some() {
                return Ok(first)
            }
        }
    }

    fn check_len(&self, start: u64) -> Result<()> {
        if self.buf.len() > self.max_token_length {
            return Err(EdifParseError::TokenTooLong {
                offset: start, max: self.max_token_length
            })
        }
        Ok(())
    }

    fn read_quoted(&mut self, start: u64) -> Result<()> {
        // opening quote
        self.input.consume(1);
        loop {
            let avail = self.input.fill_buf()?;
            if avail.is_empty() {
                return Err(EdifParseError::UnexpectedEof {
                    offset: start + 1 + self.buf.len() as u64
                })
            }
            match avail.iter().position(|c| *c == b'"') {
                Some(p) => {
                    self.buf.extend_from_slice(&avail[..p]);
                    self.input.consume(p + 1);
                    return self.check_len(start)
                }
                None => {
                    let n = avail.len();
                    self.buf.extend_from_slice(avail);
                    self.input.consume(n);
                    self.check_len(start)?;
                }
            }
        }
    }

    fn read_bare(&mut self, start: u64) -> Result<()> {
        loop {
            let avail = self.input.fill_buf()?;
            if avail.is_empty() {
                return Ok(())
            }
            match avail.iter().position(|c| is_ender(*c)) {
                Some(p) => {
                    if avail[p] == b'"' {
                        return Err(EdifParseError::QuoteInsideToken {
                            offset: start + (self.buf.len() + p) as u64
                        })
                    }
                    self.buf.extend_from_slice(&avail[..p]);
                    self.input.consume(p);
                    return self.check_len(start)
                }
                None => {
                    let n = avail.len();
                    self.buf.extend_from_slice(avail);
                    self.input.consume(n);
                    self.check_len(start)?;
                }
            }
        }
    }
}

impl<R: BufRead> TokenSource for EdifTokenizer<R> {
    fn next_token(&mut self, short_lived: bool) -> Result<Option<Token>> {
        let c = match self.peek_significant()? {
            Some(c) => c,
            None => return Ok(None)
        };
        let start = self.offset;
        match c {
            b'(' | b')' => {
                self.input.consume(1);
                self.offset += 1;
                let text = match c {
                    b'(' => LEFT_PAREN.clone(),
                    _ => RIGHT_PAREN.clone()
                };
                Ok(Some(Token { text, offset: self.offset }))
            }
            b'"' => {
                self.buf.clear();
                self.read_quoted(start)?;
                self.offset += self.buf.len() as u64 + 2;
                let text = make_text(&self.pool, &self.buf, short_lived,
                                     self.intern_threshold);
                Ok(Some(Token { text, offset: self.offset }))
            }
            _ => {
                self.buf.clear();
                self.read_bare(start)?;
                self.offset += self.buf.len() as u64;
                let text = make_text(&self.pool, &self.buf, short_lived,
                                     self.intern_threshold);
                Ok(Some(Token { text, offset: self.offset }))
            }
        }
    }

    fn skip(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            let avail = self.input.fill_buf()?;
            if avail.is_empty() {
                break
            }
            let k = (avail.len() as u64).min(n) as usize;
            self.input.consume(k);
            self.offset += k as u64;
            n -= k as u64;
        }
        Ok(())
    }

    #[inline]
    fn byte_offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    fn intern(&self, s: &str) -> Ident {
        self.pool.intern(s)
    }
}
