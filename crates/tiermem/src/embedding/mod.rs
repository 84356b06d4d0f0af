//! Embedding providers
//!
//! Text goes in, a fixed-length vector comes out. Every provider reports its
//! failures as [`TierMemError::EmbeddingUnavailable`].

pub mod hashing;
pub mod local;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{Result, TierMemError};

pub use hashing::HashingEmbedder;
pub use local::FastEmbedProvider;
pub use remote::RemoteEmbeddingProvider;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject a vector whose length does not match the provider's dimension
pub(crate) fn check_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if embedding.len() == expected {
        Ok(embedding)
    } else {
        Err(TierMemError::EmbeddingUnavailable(format!(
            "Provider returned {} dimensions, expected {expected}",
            embedding.len()
        )))
    }
}

/// Build the provider selected in config
pub async fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Fastembed => Ok(Arc::new(FastEmbedProvider::load(config).await?)),
        EmbeddingProviderKind::Remote => Ok(Arc::new(RemoteEmbeddingProvider::from_env(config)?)),
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
    }
}
