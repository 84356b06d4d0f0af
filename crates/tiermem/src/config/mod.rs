use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TierMemError};

/// Main configuration structure for tiermem
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Tier capacities and migration policy
    #[serde(default)]
    pub tiers: TierConfig,
    /// Record and query-result cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Search and ranking configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Admin HTTP API configuration
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Which durable substrate backs the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// LanceDB table per namespace
    #[default]
    Lance,
    /// One JSON document per record
    File,
}

/// Durable storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend (lance or file)
    #[serde(default)]
    pub backend: StorageBackend,
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Namespace scoping records under the data directory
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Per-attempt timeout for storage I/O in milliseconds
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            namespace: default_namespace(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Directory holding this namespace's data
    pub fn namespace_dir(&self) -> PathBuf {
        self.data_dir.join(&self.namespace)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tiermem"))
        .unwrap_or_else(|| PathBuf::from(".tiermem"))
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

/// Tier capacities and migration policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Maximum number of Hot records after a migration pass
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: usize,
    /// Maximum number of Warm records after a migration pass
    #[serde(default = "default_warm_capacity")]
    pub warm_capacity: usize,
    /// Accesses within the window needed to promote one tier
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u32,
    /// Length of the trailing access window in seconds
    #[serde(default = "default_promotion_window_secs")]
    pub promotion_window_secs: u64,
    /// Interval between scheduled migration passes in seconds
    #[serde(default = "default_demotion_interval_secs")]
    pub demotion_interval_secs: u64,
    /// Forget Cold records not accessed for this many days (disabled when unset)
    #[serde(default)]
    pub retention_days: Option<u64>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            hot_capacity: default_hot_capacity(),
            warm_capacity: default_warm_capacity(),
            promotion_threshold: default_promotion_threshold(),
            promotion_window_secs: default_promotion_window_secs(),
            demotion_interval_secs: default_demotion_interval_secs(),
            retention_days: None,
        }
    }
}

impl TierConfig {
    pub fn promotion_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.promotion_window_secs.min(u32::MAX as u64) as i64)
    }

    pub fn demotion_interval(&self) -> Duration {
        Duration::from_secs(self.demotion_interval_secs)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .map(|d| chrono::Duration::days(d.min(1_000_000) as i64))
    }
}

fn default_hot_capacity() -> usize {
    1_000
}

fn default_warm_capacity() -> usize {
    10_000
}

fn default_promotion_threshold() -> u32 {
    3
}

fn default_promotion_window_secs() -> u64 {
    3_600
}

fn default_demotion_interval_secs() -> u64 {
    300
}

/// Record and query-result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries kept by each of the record and query-result caches
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Lifetime of a memoized query result in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(u32::MAX as u64) as i64)
    }
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Search and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a result to be returned
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,
    /// Result count used when callers do not pass one
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Scan Cold records when Hot+Warm yields fewer than k results
    #[serde(default = "default_cold_fallback")]
    pub cold_fallback: bool,
    /// Deadline for the Cold full scan in milliseconds
    #[serde(default = "default_cold_scan_timeout_ms")]
    pub cold_scan_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_floor: default_relevance_floor(),
            default_k: default_k(),
            cold_fallback: default_cold_fallback(),
            cold_scan_timeout_ms: default_cold_scan_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn cold_scan_timeout(&self) -> Duration {
        Duration::from_millis(self.cold_scan_timeout_ms)
    }
}

fn default_relevance_floor() -> f32 {
    0.0
}

fn default_k() -> usize {
    5
}

fn default_cold_fallback() -> bool {
    true
}

fn default_cold_scan_timeout_ms() -> u64 {
    2_000
}

/// Which embedding provider to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local fastembed model (multilingual-e5-small)
    #[default]
    Fastembed,
    /// OpenAI-compatible embeddings endpoint
    Remote,
    /// Deterministic token-hashing embedder, no model download
    Hashing,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (fastembed, remote or hashing)
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Embedding dimension size
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Remote model identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Remote API base URL
    #[serde(default = "default_embedding_api_url")]
    pub api_url: String,
    /// Environment variable holding the remote API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
    /// Per-attempt timeout for embedding calls in milliseconds
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimension: default_embedding_dimension(),
            model: default_embedding_model(),
            api_url: default_embedding_api_url(),
            api_key_env: default_embedding_api_key_env(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_embedding_timeout_ms() -> u64 {
    10_000
}

/// Admin HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Address to listen on (e.g., "127.0.0.1:7878")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| TierMemError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first default location that
    /// exists, else defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::read_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".tiermem").join("config.toml")),
            dirs::config_dir().map(|c| c.join("tiermem").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::read_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TierMemError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values the memory subsystem cannot operate with
    pub fn validate(&self) -> Result<()> {
        let namespace_ok = !self.storage.namespace.is_empty()
            && self
                .storage
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !namespace_ok {
            return Err(TierMemError::Config(format!(
                "storage.namespace must be non-empty and contain only [A-Za-z0-9_-], got {:?}",
                self.storage.namespace
            )));
        }
        if self.tiers.hot_capacity == 0 || self.tiers.warm_capacity == 0 {
            return Err(TierMemError::Config(
                "tiers.hot_capacity and tiers.warm_capacity must be at least 1".to_string(),
            ));
        }
        if self.tiers.promotion_threshold == 0 {
            return Err(TierMemError::Config(
                "tiers.promotion_threshold must be at least 1".to_string(),
            ));
        }
        if self.tiers.demotion_interval_secs == 0 {
            return Err(TierMemError::Config(
                "tiers.demotion_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.cache.cache_capacity == 0 {
            return Err(TierMemError::Config(
                "cache.cache_capacity must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.relevance_floor) {
            return Err(TierMemError::Config(format!(
                "retrieval.relevance_floor must be within [-1, 1], got {}",
                self.retrieval.relevance_floor
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(TierMemError::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProviderKind::Remote {
            url::Url::parse(&self.embedding.api_url).map_err(|e| {
                TierMemError::Config(format!(
                    "embedding.api_url is not a valid URL ({}): {e}",
                    self.embedding.api_url
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Lance);
        assert_eq!(config.storage.namespace, "default");
        assert_eq!(config.storage.io_timeout_ms, 5_000);
        assert_eq!(config.tiers.hot_capacity, 1_000);
        assert_eq!(config.tiers.warm_capacity, 10_000);
        assert_eq!(config.tiers.promotion_threshold, 3);
        assert_eq!(config.tiers.demotion_interval_secs, 300);
        assert!(config.tiers.retention_days.is_none());
        assert_eq!(config.cache.cache_capacity, 256);
        assert_eq!(config.cache.cache_ttl_secs, 300);
        assert_eq!(config.retrieval.relevance_floor, 0.0);
        assert!(config.retrieval.cold_fallback);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Fastembed);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.admin.listen_addr, "127.0.0.1:7878");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
backend = "file"
data_dir = "/tmp/tiermem"
namespace = "agent-1"
io_timeout_ms = 250

[tiers]
hot_capacity = 2
warm_capacity = 10
promotion_threshold = 4
promotion_window_secs = 60
demotion_interval_secs = 30
retention_days = 7

[cache]
cache_capacity = 2
cache_ttl_secs = 5

[retrieval]
relevance_floor = 0.25
default_k = 3
cold_fallback = false
cold_scan_timeout_ms = 100

[embedding]
provider = "hashing"
dimension = 128

[admin]
listen_addr = "0.0.0.0:9000"
"#;

        let config = Config::from_toml_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/tiermem"));
        assert_eq!(
            config.storage.namespace_dir(),
            PathBuf::from("/tmp/tiermem/agent-1")
        );
        assert_eq!(config.storage.io_timeout(), Duration::from_millis(250));

        assert_eq!(config.tiers.hot_capacity, 2);
        assert_eq!(config.tiers.warm_capacity, 10);
        assert_eq!(config.tiers.promotion_threshold, 4);
        assert_eq!(config.tiers.promotion_window(), chrono::Duration::seconds(60));
        assert_eq!(config.tiers.demotion_interval(), Duration::from_secs(30));
        assert_eq!(config.tiers.retention(), Some(chrono::Duration::days(7)));

        assert_eq!(config.cache.cache_capacity, 2);
        assert_eq!(config.cache.ttl(), chrono::Duration::seconds(5));

        assert!((config.retrieval.relevance_floor - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.default_k, 3);
        assert!(!config.retrieval.cold_fallback);

        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashing);
        assert_eq!(config.embedding.dimension, 128);

        assert_eq!(config.admin.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[tiers]
hot_capacity = 50
"#;

        let config = Config::from_toml_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.tiers.hot_capacity, 50);
        assert_eq!(config.tiers.warm_capacity, 10_000);
        assert_eq!(config.cache.cache_capacity, 256);
        assert_eq!(config.storage.namespace, "default");
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = Config::from_toml_str("[tiers]\nhot_capacity = 0\n").unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));

        let err = Config::from_toml_str("[cache]\ncache_capacity = 0\n").unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_floor() {
        let err = Config::from_toml_str("[retrieval]\nrelevance_floor = 1.5\n").unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let err = Config::from_toml_str("[storage]\nnamespace = \"../etc\"\n").unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let err = Config::from_toml_str("[storage]\nbackend = \"redis\"\n").unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[test]
    fn test_remote_provider_requires_valid_url() {
        let toml_str = r#"
[embedding]
provider = "remote"
api_url = "not a url"
"#;
        let err = Config::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\ncache_ttl_secs = 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.cache.cache_ttl_secs, 42);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, TierMemError::Config(_)));
    }
}
