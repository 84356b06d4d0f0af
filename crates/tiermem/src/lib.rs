//! tiermem - Tiered conversational memory and retrieval cache
//!
//! Stores interaction history and reference documents as searchable
//! embeddings across Hot, Warm and Cold tiers. Hot and Warm records are
//! kept in an in-memory vector index, frequently used results are served
//! from an LRU cache, and a background scheduler demotes cold records
//! without ever deleting them.

pub mod admin;
pub mod cache;
pub mod clock;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod memory;
pub mod resilience;
pub mod storage;
pub mod testing;
pub mod tiers;

pub use error::{Result, TierMemError};
pub use memory::{MemoryManager, MemoryStats, Recall, RecallRequest, RecalledRecord};
pub use memory::types::{NewRecord, Record, RecordKind, Tier};
