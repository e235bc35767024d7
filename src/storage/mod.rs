//! Storage Engine Module
//!
//! This module provides the entry store for memkv: a single-lock map from key
//! to [`Entry`] with lazy TTL expiry and CAS token issuance.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │           Mutex<HashMap<Bytes, Entry>>                │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │    store / store_if_absent / store_if_present               │
//! │    mutate_if_present / compare_and_swap / get / gets        │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//!                 cas::next_token (fresh token per version)
//! ```
//!
//! ## Features
//!
//! - **Atomic Primitives**: every conditional write checks and acts under one lock
//! - **Lazy Expiry**: expired entries are dropped when next touched, never swept
//! - **CAS Tokens**: every new version gets a token that differs from the last one
//!
//! ## Example
//!
//! ```
//! use memkv::storage::{MutateMode, StorageEngine};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//!
//! engine.store(Bytes::from("greeting"), 0, 0, Bytes::from("hello"));
//! engine.mutate_if_present(
//!     Bytes::from("greeting"),
//!     0,
//!     0,
//!     Bytes::from(" world"),
//!     MutateMode::Append,
//! );
//!
//! let items = engine.get(&[Bytes::from("greeting")]);
//! assert_eq!(items[0].data, Bytes::from("hello world"));
//! ```

pub mod cas;
pub mod engine;

// Re-export commonly used types
pub use engine::{CasOutcome, Entry, Item, MutateMode, StorageEngine, StorageStats};
