//! Connection Handler Module
//!
//! This module manages individual client connections to memkv.
//! Each client connection is handled by its own async task; all tasks share
//! one `StorageEngine` through the `CommandHandler`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read line   │───>│ Dispatch    │───>│ Read data   │      │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘      │
//! │                            │ retrieval        │ store       │
//! │                            ▼                  ▼             │
//! │                       ┌──────────────────────────┐          │
//! │                       │       Send reply         │          │
//! │                       └──────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The storage lock is never held while the connection waits on the network:
//! the data line of a storage command is read completely before the command
//! touches the store.
//!
//! ## Example
//!
//! ```ignore
//! use memkv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_LINE_BYTES};
//! use memkv::commands::CommandHandler;
//! use memkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats, DEFAULT_MAX_LINE_BYTES));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats,
    DEFAULT_MAX_LINE_BYTES,
};
