//! Seekable ring-buffer tokenizer used by the parallel parser.
//!
//! The buffer holds twice the maximum token length, so a full
//! token plus its delimiters always fits once the ring is filled.
//! Skips inside the buffered window are free, longer ones
//! reposition the underlying reader.

use std::io::{ Read, Seek, SeekFrom };
use std::sync::Arc;
use crate::{ EdifParseError, Result, StringPool, Ident };
use crate::tokenizer::{ Token, TokenSource, is_ender, is_whitespace, make_text,
                        LEFT_PAREN, RIGHT_PAREN };

/// Result of guessing a token boundary after a raw seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryGuess {
    /// Offset the tokenizer now sits at.
    pub offset: u64,
    /// The quote heuristic could not tell inside from outside
    /// with confidence.
    pub uncertain: bool,
}

pub struct RingTokenizer<R> {
    input: R,
    buf: Box<[u8]>,
    mask: u64,
    /// absolute offset of the next unread byte.
    head: u64,
    /// absolute offset one past the last buffered byte.
    tail: u64,
    eof: bool,
    max_token_length: usize,
    intern_threshold: usize,
    pool: Arc<StringPool>,
    scratch: Vec<u8>,
}

impl<R: Read + Seek> RingTokenizer<R> {
    /// Creates a tokenizer reading from the current start of
    /// `input` (assumed to be offset 0).
    pub fn new(input: R, pool: Arc<StringPool>, max_token_length: usize) -> Self {
        let cap = (max_token_length.max(2).next_power_of_two() * 2) as u64;
        RingTokenizer {
            input,
            buf: vec![0u8; cap as usize].into_boxed_slice(),
            mask: cap - 1,
            head: 0, tail: 0, eof: false,
            max_token_length,
            intern_threshold: 8,
            pool,
            scratch: Vec::with_capacity(256),
        }
    }

    pub fn with_intern_threshold(mut self, threshold: usize) -> Self {
        self.intern_threshold = threshold;
        self
    }

    #[inline]
    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    #[inline]
    fn available(&self) -> u64 {
        self.tail - self.head
    }

    #[inline]
    fn at(&self, pos: u64) -> u8 {
        self.buf[(pos & self.mask) as usize]
    }

    /// reads until at least `n` bytes are buffered or EOF is hit.
    fn ensure(&mut self, n: u64) -> Result<()> {
        let n = n.min(self.capacity());
        while self.available() < n && !self.eof {
            let start = (self.tail & self.mask) as usize;
            let free = (self.capacity() - self.available()) as usize;
            let end = (start + free).min(self.buf.len());
            let got = match self.input.read(&mut self.buf[start..end]) {
                Ok(got) => got,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into())
            };
            if got == 0 {
                self.eof = true;
            }
            self.tail += got as u64;
        }
        Ok(())
    }

    fn copy_out(&mut self, from: u64, to: u64) {
        self.scratch.clear();
        let a = (from & self.mask) as usize;
        let len = (to - from) as usize;
        if a + len <= self.buf.len() {
            self.scratch.extend_from_slice(&self.buf[a..a + len]);
        }
        else {
            let first = self.buf.len() - a;
            self.scratch.extend_from_slice(&self.buf[a..]);
            self.scratch.extend_from_slice(&self.buf[..len - first]);
        }
    }

    fn finish_token(&mut self, from: u64, to: u64, next: u64, short_lived: bool) -> Token {
        self.copy_out(from, to);
        self.head = next;
        Token {
            text: make_text(&self.pool, &self.scratch, short_lived, self.intern_threshold),
            offset: next,
        }
    }

    /// After a raw seek into the middle of the file, moves to a
    /// plausible token boundary.
    ///
    /// If the window might start inside a quoted string, the
    /// ratio of token enders inside and outside of quotes decides
    /// which side is the real outside. The guess is verified later
    /// when the preceding worker catches up.
    pub fn skip_to_token_boundary(&mut self) -> Result<BoundaryGuess> {
        self.ensure(self.capacity())?;
        if self.available() < self.capacity() {
            // too close to the end for a meaningful guess
            self.head = self.tail;
            return Ok(BoundaryGuess { offset: self.head, uncertain: true })
        }

        let mut in_quote = false;
        let mut first_quote = None;
        let (mut total_in, mut enders_in) = (0u64, 0u64);
        let (mut total_out, mut enders_out) = (0u64, 0u64);
        for pos in self.head..self.tail {
            let c = self.at(pos);
            if c == b'"' {
                in_quote = !in_quote;
                first_quote.get_or_insert(pos);
                continue
            }
            let ender = is_ender(c) as u64;
            if in_quote {
                total_in += 1;
                enders_in += ender;
            }
            else {
                total_out += 1;
                enders_out += ender;
            }
        }

        let mut uncertain = false;
        if let Some(q) = first_quote {
            let ratio_in = enders_in as f64 / total_in.max(1) as f64;
            let ratio_out = enders_out as f64 / total_out.max(1) as f64;
            if total_out == 0 || ratio_in > ratio_out {
                self.head = q + 1;
            }
            let (lo, hi) = if ratio_in < ratio_out { (ratio_in, ratio_out) }
                           else { (ratio_out, ratio_in) };
            uncertain = hi < lo * 2.;
        }

        while self.head < self.tail && !is_ender(self.at(self.head)) {
            self.head += 1;
        }
        Ok(BoundaryGuess { offset: self.head, uncertain })
    }
}

impl<R: Read + Seek> TokenSource for RingTokenizer<R> {
    fn next_token(&mut self, short_lived: bool) -> Result<Option<Token>> {
        let need = self.max_token_length as u64 + 2;
        loop {
            self.ensure(need)?;
            while self.head < self.tail && is_whitespace(self.at(self.head)) {
                self.head += 1;
            }
            if self.head < self.tail {
                break
            }
            if self.eof {
                return Ok(None)
            }
        }
        self.ensure(need)?;

        let start = self.head;
        let max = self.max_token_length as u64;
        match self.at(start) {
            b'(' => {
                self.head += 1;
                Ok(Some(Token { text: LEFT_PAREN.clone(), offset: self.head }))
            }
            b')' => {
                self.head += 1;
                Ok(Some(Token { text: RIGHT_PAREN.clone(), offset: self.head }))
            }
            b'"' => {
                let close = (start + 1..self.tail).find(|p| self.at(*p) == b'"');
                match close {
                    Some(p) if p - start - 1 <= max => {
                        Ok(Some(self.finish_token(start + 1, p, p + 1, short_lived)))
                    }
                    Some(_) => Err(EdifParseError::TokenTooLong { offset: start, max: self.max_token_length }),
                    None if self.eof => Err(EdifParseError::UnexpectedEof { offset: self.tail }),
                    None => Err(EdifParseError::TokenTooLong { offset: start, max: self.max_token_length })
                }
            }
            _ => {
                let end = (start..self.tail).find(|p| is_ender(self.at(*p)));
                let end = match end {
                    Some(p) if self.at(p) == b'"' => {
                        return Err(EdifParseError::QuoteInsideToken { offset: p })
                    }
                    Some(p) => p,
                    None if self.eof => self.tail,
                    None => return Err(EdifParseError::TokenTooLong {
                        offset: start, max: self.max_token_length
                    })
                };
                if end - start > max {
                    return Err(EdifParseError::TokenTooLong {
                        offset: start, max: self.max_token_length
                    })
                }
                Ok(Some(self.finish_token(start, end, end, short_lived)))
            }
        }
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        if n <= self.available() {
            self.head += n;
            return Ok(())
        }
        let target = self.head + n;
        self.input.seek(SeekFrom::Start(target))?;
        self.head = target;
        self.tail = target;
        self.eof = false;
        Ok(())
    }

    #[inline]
    fn byte_offset(&self) -> u64 {
        self.head
    }

    #[inline]
    fn intern(&self, s: &str) -> Ident {
        self.pool.intern(s)
    }
}
