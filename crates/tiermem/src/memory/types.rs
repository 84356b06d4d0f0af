//! Record types for the tiermem system
//!
//! Defines the persisted [`Record`], its closed [`RecordKind`] variant with
//! the registry that admits custom kinds, and the [`Tier`] a record lives in.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TierMemError};

/// A single unit of memory owned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier for this record
    pub id: Uuid,
    /// What kind of content this is
    pub kind: RecordKind,
    /// The stored text
    pub text: String,
    /// Vector embedding of `text`
    pub embedding: Vec<f32>,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// When this record was last returned by a read path
    pub last_accessed: DateTime<Utc>,
    /// How many times this record has been returned by a read path
    pub access_count: u32,
    /// Which storage tier this record is in
    pub tier: Tier,
    /// Free-form tags such as the agent role that produced an interaction
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Record {
    /// Create a new Hot record stamped with `now`
    pub fn new(text: String, embedding: Vec<f32>, kind: RecordKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text,
            embedding,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tier: Tier::Hot,
            metadata: BTreeMap::new(),
        }
    }

    /// Mark this record as accessed, updating access count and timestamp
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }
}

/// Input for `MemoryManager::remember_with`
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub text: String,
    pub kind: RecordKind,
    pub metadata: BTreeMap<String, String>,
}

impl NewRecord {
    pub fn new(text: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            text: text.into(),
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What a record holds. Custom kinds must be registered in a [`KindRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A user/assistant exchange
    Interaction,
    /// A chunk of a reference document
    DocumentChunk,
    /// A registered application-defined kind
    Custom(String),
}

impl RecordKind {
    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::Interaction => "interaction",
            RecordKind::DocumentChunk => "document_chunk",
            RecordKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = TierMemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "interaction" => Ok(RecordKind::Interaction),
            "document_chunk" | "document-chunk" | "document" => Ok(RecordKind::DocumentChunk),
            other => {
                validate_kind_name(other)?;
                Ok(RecordKind::Custom(other.to_string()))
            }
        }
    }
}

fn validate_kind_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(TierMemError::UnknownKind(name.to_string()))
    }
}

/// Explicit registry of the custom kinds a manager accepts.
///
/// The built-in kinds are always accepted.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    custom: HashSet<String>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom kind name and return the kind for it
    pub fn register(&mut self, name: &str) -> Result<RecordKind> {
        let name = name.trim().to_lowercase();
        validate_kind_name(&name)?;
        if matches!(
            name.as_str(),
            "interaction" | "document_chunk" | "document-chunk" | "document"
        ) {
            return Err(TierMemError::UnknownKind(format!(
                "{name} is a built-in kind and cannot be registered"
            )));
        }
        self.custom.insert(name.clone());
        Ok(RecordKind::Custom(name))
    }

    pub fn is_registered(&self, kind: &RecordKind) -> bool {
        match kind {
            RecordKind::Interaction | RecordKind::DocumentChunk => true,
            RecordKind::Custom(name) => self.custom.contains(name),
        }
    }

    pub fn validate(&self, kind: &RecordKind) -> Result<()> {
        if self.is_registered(kind) {
            Ok(())
        } else {
            Err(TierMemError::UnknownKind(kind.to_string()))
        }
    }
}

/// Storage tier indicating access frequency and search eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Recently inserted or frequently used, always searched
    Hot,
    /// Searched by default, first candidate for cold demotion
    Warm,
    /// Kept in the store only, searched by full scan
    Cold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hot => "Hot",
            Tier::Warm => "Warm",
            Tier::Cold => "Cold",
        }
    }

    /// The next hotter tier, if any
    pub fn promoted(self) -> Option<Tier> {
        match self {
            Tier::Cold => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Hot),
            Tier::Hot => None,
        }
    }

    /// The next colder tier, if any
    pub fn demoted(self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => None,
        }
    }

    /// Whether records in this tier belong in the vector index
    pub fn is_indexed(self) -> bool {
        !matches!(self, Tier::Cold)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TierMemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            other => Err(TierMemError::Serialization(format!(
                "Unknown storage tier: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(text: &str) -> Record {
        Record::new(
            text.to_string(),
            vec![0.1; 8],
            RecordKind::Interaction,
            Utc::now(),
        )
    }

    #[test]
    fn test_record_new_defaults() {
        let record = record("hello");
        assert_eq!(record.tier, Tier::Hot);
        assert_eq!(record.access_count, 0);
        assert_eq!(record.created_at, record.last_accessed);
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut original = record("Paris is the capital of France");
        original.kind = RecordKind::Custom("note".to_string());
        original.tier = Tier::Warm;
        original
            .metadata
            .insert("agent_type".to_string(), "planner".to_string());

        let json = serde_json::to_string(&original).expect("Failed to serialize record");
        let back: Record = serde_json::from_str(&json).expect("Failed to deserialize record");

        assert_eq!(back, original);
    }

    #[test]
    fn test_mark_accessed_never_moves_backwards() {
        let mut record = record("x");
        let before = record.last_accessed;

        record.mark_accessed(before - Duration::seconds(10));
        assert_eq!(record.access_count, 1);
        assert_eq!(record.last_accessed, before);

        record.mark_accessed(before + Duration::seconds(10));
        assert_eq!(record.access_count, 2);
        assert_eq!(record.last_accessed, before + Duration::seconds(10));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "interaction".parse::<RecordKind>().unwrap(),
            RecordKind::Interaction
        );
        assert_eq!(
            "document-chunk".parse::<RecordKind>().unwrap(),
            RecordKind::DocumentChunk
        );
        assert_eq!(
            "Note".parse::<RecordKind>().unwrap(),
            RecordKind::Custom("note".to_string())
        );
        assert!("has space".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_registry_rejects_unregistered_custom_kind() {
        let mut registry = KindRegistry::new();
        let tool_output = RecordKind::Custom("tool_output".to_string());

        assert!(registry.validate(&RecordKind::Interaction).is_ok());
        assert!(registry.validate(&RecordKind::DocumentChunk).is_ok());
        assert!(matches!(
            registry.validate(&tool_output),
            Err(TierMemError::UnknownKind(_))
        ));

        let registered = registry.register("tool_output").unwrap();
        assert_eq!(registered, tool_output);
        assert!(registry.validate(&tool_output).is_ok());
    }

    #[test]
    fn test_registry_refuses_builtin_names() {
        let mut registry = KindRegistry::new();
        assert!(registry.register("interaction").is_err());
        assert!(registry.register("").is_err());
    }

    #[test]
    fn test_tier_transitions_move_one_step() {
        assert_eq!(Tier::Cold.promoted(), Some(Tier::Warm));
        assert_eq!(Tier::Warm.promoted(), Some(Tier::Hot));
        assert_eq!(Tier::Hot.promoted(), None);
        assert_eq!(Tier::Hot.demoted(), Some(Tier::Warm));
        assert_eq!(Tier::Warm.demoted(), Some(Tier::Cold));
        assert_eq!(Tier::Cold.demoted(), None);
        assert!(Tier::Hot.is_indexed());
        assert!(Tier::Warm.is_indexed());
        assert!(!Tier::Cold.is_indexed());
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("HOT".parse::<Tier>().unwrap(), Tier::Hot);
        assert_eq!("warm".parse::<Tier>().unwrap(), Tier::Warm);
        assert!("lukewarm".parse::<Tier>().is_err());
    }
}
