//! Memory records and the manager facade
//!
//! Defines the persisted record types and the [`MemoryManager`] that
//! remembers, recalls and forgets them across the Hot, Warm and Cold tiers.

pub mod history;
pub mod locks;
pub mod manager;
pub mod recall;
pub mod types;

pub use history::format_history;
pub use manager::{MemoryCore, MemoryManager, MemoryStats};
pub use recall::{Recall, RecallRequest, RecalledRecord};
pub use types::{KindRegistry, NewRecord, Record, RecordKind, Tier};
