//! Command Handler Module
//!
//! This module implements the command processing layer for memkv.
//! It receives tokenized request lines, validates them, executes them against
//! the storage engine, and returns replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Validate     │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get`, `gets`
//! - `set`, `add`, `replace`
//! - `append`, `prepend`
//! - `cas`

pub mod handler;

// Re-export the main command handler and its types
pub use handler::{Command, CommandError, CommandHandler, Dispatch, StorageCommand, StoreMode};
