//! Text Protocol Reply Types
//!
//! This module defines the replies memkv sends back to clients and how they
//! are laid out on the wire. Every line ends with CRLF.
//!
//! ## Reply Format
//!
//! ```text
//! VALUE <key> <flags> <bytes>[ <cas>]\r\n
//! <data>\r\n
//! ...                                   (one block per matched key)
//! END\r\n
//!
//! STORED\r\n
//! NOT_STORED\r\n
//! EXISTS\r\n
//! NOT_FOUND\r\n
//! CLIENT_ERROR | <reason>\r\n
//! ERROR\r\n
//! ```

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator that ends every reply line
pub const CRLF: &[u8] = b"\r\n";

/// Reply keywords
pub mod keyword {
    pub const VALUE: &[u8] = b"VALUE";
    pub const END: &[u8] = b"END";
    pub const STORED: &[u8] = b"STORED";
    pub const NOT_STORED: &[u8] = b"NOT_STORED";
    pub const EXISTS: &[u8] = b"EXISTS";
    pub const NOT_FOUND: &[u8] = b"NOT_FOUND";
    pub const CLIENT_ERROR: &[u8] = b"CLIENT_ERROR | ";
    pub const ERROR: &[u8] = b"ERROR";
}

/// Client error reasons
pub mod reason {
    pub const NO_KEYS: &str = "NO KEYS";
    pub const WRONG_ARITY: &str = "MISSING OR EXTRA ARGUMENTS";
    pub const INCORRECT_DATA_LENGTH: &str = "INCORRECT DATA LENGTH";
}

/// One `VALUE` block of a retrieval reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBlock {
    pub key: Bytes,
    pub flags: u32,
    pub data: Bytes,
    /// Only present in `gets` replies
    pub cas: Option<u64>,
}

/// A reply to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Zero or more `VALUE` blocks followed by `END`
    Values(Vec<ValueBlock>),

    /// The write was performed
    Stored,

    /// A conditional write's precondition did not hold
    NotStored,

    /// `cas` found the entry but the token was stale
    Exists,

    /// `cas` found no entry
    NotFound,

    /// The request was recognized but its arguments were not acceptable
    ClientError(String),

    /// The request line was not a known command
    Error,
}

impl Response {
    /// Creates a client error reply.
    ///
    /// # Example
    /// ```
    /// use memkv::protocol::Response;
    /// let reply = Response::client_error("NO KEYS");
    /// assert_eq!(reply.serialize(), b"CLIENT_ERROR | NO KEYS\r\n");
    /// ```
    pub fn client_error(reason: impl Into<String>) -> Self {
        Response::ClientError(reason.into())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Values(blocks) => {
                for block in blocks {
                    buf.extend_from_slice(keyword::VALUE);
                    buf.push(b' ');
                    buf.extend_from_slice(&block.key);
                    buf.extend_from_slice(format!(" {} {}", block.flags, block.data.len()).as_bytes());
                    if let Some(cas) = block.cas {
                        buf.extend_from_slice(format!(" {}", cas).as_bytes());
                    }
                    buf.extend_from_slice(CRLF);
                    buf.extend_from_slice(&block.data);
                    buf.extend_from_slice(CRLF);
                }
                buf.extend_from_slice(keyword::END);
            }
            Response::Stored => buf.extend_from_slice(keyword::STORED),
            Response::NotStored => buf.extend_from_slice(keyword::NOT_STORED),
            Response::Exists => buf.extend_from_slice(keyword::EXISTS),
            Response::NotFound => buf.extend_from_slice(keyword::NOT_FOUND),
            Response::ClientError(reason) => {
                buf.extend_from_slice(keyword::CLIENT_ERROR);
                buf.extend_from_slice(reason.as_bytes());
            }
            Response::Error => buf.extend_from_slice(keyword::ERROR),
        }
        buf.extend_from_slice(CRLF);
    }

    /// Returns true for `CLIENT_ERROR` and `ERROR` replies.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::ClientError(_) | Response::Error)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Values(blocks) => write!(f, "{} value(s)", blocks.len()),
            Response::Stored => write!(f, "STORED"),
            Response::NotStored => write!(f, "NOT_STORED"),
            Response::Exists => write!(f, "EXISTS"),
            Response::NotFound => write!(f, "NOT_FOUND"),
            Response::ClientError(reason) => write!(f, "CLIENT_ERROR | {}", reason),
            Response::Error => write!(f, "ERROR"),
        }
    }
}
