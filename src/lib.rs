//! # memkv - An In-Memory Cache Server Speaking the Memcached Text Protocol
//!
//! memkv is a small TCP cache server implementing a subset of the memcached
//! text protocol: retrieval (`get`, `gets`), storage (`set`, `add`,
//! `replace`, `append`, `prepend`) and optimistic concurrency via `cas`.
//!
//! ## Features
//!
//! - **Binary-safe values**: keys and data are raw bytes
//! - **Lazy TTL**: entries expire when next touched; there is no sweeper
//! - **CAS tokens**: every write assigns a fresh random token
//! - **Async I/O**: one Tokio task per client, one shared store
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                              memkv                              │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │          │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │          │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘          │
//! │                            │                  │                 │
//! │                            ▼                  ▼                 │
//! │                     ┌─────────────┐    ┌──────────────────────┐ │
//! │                     │ Line Parser │    │    StorageEngine     │ │
//! │                     │ & Replies   │    │  Mutex<HashMap<..>>  │ │
//! │                     └─────────────┘    └──────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use memkv::commands::CommandHandler;
//! use memkv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_LINE_BYTES};
//! use memkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:11211").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats, DEFAULT_MAX_LINE_BYTES));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `get <key>+` / `gets <key>+`
//! - `set|add|replace|append|prepend <key> <flags> <ttl> <bytes>` + data line
//! - `cas <key> <flags> <ttl> <bytes> <cas unique>` + data line
//! - `quit`
//!
//! ## Module Overview
//!
//! - [`protocol`]: request line tokenizer and reply encoding
//! - [`storage`]: the shared entry table, TTL and CAS tokens
//! - [`commands`]: validation and execution of each command
//! - [`connection`]: per-client read/dispatch/reply loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RequestLine, Response};
pub use storage::StorageEngine;

/// The default port memkv listens on (same as memcached)
pub const DEFAULT_PORT: u16 = 11211;

/// The default host memkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of memkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
