//! Text Protocol Implementation
//!
//! This module implements the line-oriented request/reply protocol memkv
//! speaks: a memcached-compatible subset covering retrieval, plain and
//! conditional stores, append/prepend, and compare-and-swap.
//!
//! ## Modules
//!
//! - `parser`: Splits a request line into command name and arguments
//! - `types`: Defines the `Response` enum and its wire encoding
//!
//! ## Example
//!
//! ```
//! use memkv::protocol::{RequestLine, Response};
//! use bytes::Bytes;
//!
//! // Parsing an incoming line
//! let request = RequestLine::parse(&Bytes::from("set K1 0 0 11")).unwrap();
//! assert_eq!(request.args.len(), 4);
//!
//! // Encoding a reply
//! assert_eq!(Response::Stored.serialize(), b"STORED\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{ParseError, ParseResult, RequestLine};
pub use types::{Response, ValueBlock};
