//! Local embedding model via fastembed (multilingual-e5-small)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, check_dimension};
use crate::error::{Result, TierMemError};

/// Output size of multilingual-e5-small
pub const E5_SMALL_DIMENSION: usize = 384;

pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
}

fn unavailable(e: impl std::fmt::Display) -> TierMemError {
    TierMemError::EmbeddingUnavailable(e.to_string())
}

impl FastEmbedProvider {
    /// Load the model, downloading it on first use. Runs on the blocking pool.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimension != E5_SMALL_DIMENSION {
            return Err(TierMemError::Config(format!(
                "fastembed produces {E5_SMALL_DIMENSION}-dimensional embeddings, \
                 but embedding.dimension is {}",
                config.dimension
            )));
        }

        let model = tokio::task::spawn_blocking(|| {
            TextEmbedding::try_new(InitOptions::new(EmbeddingModel::MultilingualE5Small))
        })
        .await
        .map_err(unavailable)?
        .map_err(unavailable)?;

        info!("Loaded local embedding model multilingual-e5-small");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn dimension(&self) -> usize {
        E5_SMALL_DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| unavailable("embedding model lock poisoned"))?;
            model.embed(vec![text], None).map_err(unavailable)
        })
        .await
        .map_err(unavailable)??;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| unavailable("No embedding returned"))?;
        check_dimension(embedding, E5_SMALL_DIMENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn test_rejects_mismatched_dimension() {
        let config = EmbeddingConfig {
            dimension: 768,
            ..Default::default()
        };
        let err = FastEmbedProvider::load(&config).await.err().unwrap();
        assert!(matches!(err, TierMemError::Config(_)));
    }

    #[tokio::test]
    #[cfg_attr(not(feature = "ml-tests"), ignore)]
    async fn test_similar_texts_have_high_similarity() {
        let provider = FastEmbedProvider::load(&EmbeddingConfig::default())
            .await
            .expect("Failed to load model");

        let emb1 = provider.embed("The quick brown fox jumps over the lazy dog").await.unwrap();
        let emb2 = provider.embed("A fast brown fox leaps over a sleepy dog").await.unwrap();
        let emb3 = provider.embed("Quantum computing revolutionizes cryptography").await.unwrap();

        assert_eq!(emb1.len(), E5_SMALL_DIMENSION);
        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }
}
