//! Zero-Copy Request Line Parser
//!
//! This module splits one text request line into a command name and its
//! arguments. Tokens are `Bytes` slices of the original line, so keys reach the
//! store without being copied.
//!
//! ## Rules
//!
//! 1. Tokens are separated by runs of ASCII whitespace. There is no quoting.
//! 2. The first token is the command name, matched case-sensitively later on.
//! 3. A line with no tokens at all is a protocol error.
//!
//! Numeric arguments use leading-integer parsing: the longest `[+-]?[0-9]*`
//! prefix is read and anything after it is ignored, so `"12ab"` is 12 and
//! `"ab"` is 0. Argument validation never fails because a number is malformed.

use bytes::Bytes;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur while tokenizing a request line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line held nothing but whitespace
    #[error("empty request line")]
    EmptyLine,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A tokenized request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// The command name (first token)
    pub name: Bytes,
    /// Remaining tokens, in order
    pub args: Vec<Bytes>,
}

impl RequestLine {
    /// Tokenizes a line whose terminator has already been stripped.
    ///
    /// # Example
    ///
    /// ```
    /// use memkv::protocol::RequestLine;
    /// use bytes::Bytes;
    ///
    /// let request = RequestLine::parse(&Bytes::from("get  a b")).unwrap();
    /// assert_eq!(request.name, Bytes::from("get"));
    /// assert_eq!(request.args, vec![Bytes::from("a"), Bytes::from("b")]);
    /// ```
    pub fn parse(line: &Bytes) -> ParseResult<Self> {
        let mut tokens = tokenize(line).into_iter();
        let name = tokens.next().ok_or(ParseError::EmptyLine)?;
        Ok(Self {
            name,
            args: tokens.collect(),
        })
    }

    /// The command name as text, for logs and error messages.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Splits a line on ASCII whitespace into zero-copy slices.
pub fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, byte) in line.iter().enumerate() {
        match (byte.is_ascii_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(line.slice(s..i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }

    if let Some(s) = start {
        tokens.push(line.slice(s..));
    }

    tokens
}

/// Finds the position of the `\n` that ends the first line in `buf`.
#[inline]
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Strips one trailing line terminator (`\r\n`, `\n` or `\r`).
pub fn strip_line_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Reads the leading integer of a token; non-numeric input yields 0.
///
/// Values beyond the range of `i128` saturate.
pub fn lenient_integer(token: &[u8]) -> i128 {
    let (negative, digits) = match token.first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };

    let magnitude = digits
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0i128, |acc, b| {
            acc.saturating_mul(10).saturating_add(i128::from(b - b'0'))
        });

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Lenient `u32` (client flags). Out-of-range values become 0.
pub fn lenient_u32(token: &[u8]) -> u32 {
    u32::try_from(lenient_integer(token)).unwrap_or(0)
}

/// Lenient `u64` (CAS tokens). Out-of-range values become 0.
pub fn lenient_u64(token: &[u8]) -> u64 {
    u64::try_from(lenient_integer(token)).unwrap_or(0)
}

/// Lenient `i64` (TTLs and declared lengths). Out-of-range values saturate.
pub fn lenient_i64(token: &[u8]) -> i64 {
    let value = lenient_integer(token);
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}
