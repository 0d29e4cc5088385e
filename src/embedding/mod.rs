//! Embedding generation: opaque `text -> vector` with a fixed dimension
//!
//! The provider wraps a concrete model behind [`Embedder`], memoizes results
//! through the embeddings cache namespace, and enforces the deployment-wide
//! dimension invariant at the boundary.

mod hash;

pub use hash::HashEmbedder;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::{Namespace, TieredCache};
use crate::error::{MemoriaError, Result};
use crate::types::{canonical_json, EmbeddingConfig};

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Create a concrete model from configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.model.as_str() {
        "hash-v1" => Ok(Arc::new(HashEmbedder::new(config.dimensions))),
        other => Err(MemoriaError::Config(format!(
            "Unknown embedding model: {other}"
        ))),
    }
}

/// SHA-256 hex of a canonical content serialization
pub fn content_hash(content: &Value) -> String {
    text_hash(&canonical_json(content))
}

/// SHA-256 hex of raw text
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Embedding provider: model + cache + dimension invariant.
///
/// The model loads once. The first load runs a probe embedding to establish
/// the effective dimension `d`; any later vector of a different length fails
/// with [`MemoriaError::DimensionMismatch`].
pub struct EmbeddingProvider {
    inner: Arc<dyn Embedder>,
    cache: Arc<TieredCache>,
    dimension: OnceCell<usize>,
    expected_dimension: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, cache: Arc<TieredCache>) -> Result<Self> {
        Ok(Self {
            inner: create_embedder(config)?,
            cache,
            dimension: OnceCell::new(),
            expected_dimension: config.dimensions,
        })
    }

    /// Build from an already-constructed model (used by tests and plugins)
    pub fn with_embedder(
        inner: Arc<dyn Embedder>,
        cache: Arc<TieredCache>,
        expected_dimension: usize,
    ) -> Self {
        Self {
            inner,
            cache,
            dimension: OnceCell::new(),
            expected_dimension,
        }
    }

    /// Load the model if needed and return the established dimension
    pub fn load(&self) -> Result<usize> {
        if let Some(d) = self.dimension.get() {
            return Ok(*d);
        }

        let probe = self.inner.embed("memoria dimension probe")?;
        if probe.len() != self.expected_dimension {
            return Err(MemoriaError::DimensionMismatch {
                expected: self.expected_dimension,
                actual: probe.len(),
            });
        }

        let d = *self.dimension.get_or_init(|| probe.len());
        tracing::debug!(model = self.inner.model_name(), dimension = d, "embedding model loaded");
        Ok(d)
    }

    /// The deployment-wide vector dimension
    pub fn dimensions(&self) -> Result<usize> {
        self.load()
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let d = self.load()?;
        if vector.len() != d {
            return Err(MemoriaError::DimensionMismatch {
                expected: d,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Embed one text, memoized by text hash under the embeddings namespace
    /// with the long TTL.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.load()?;
        let key = TieredCache::hash_identifier(text);

        if let Some(cached) = self
            .cache
            .get_json::<Vec<f32>>(Namespace::Embeddings, &key)
        {
            if self.check_dimension(&cached).is_ok() {
                return Ok(cached);
            }
            // A stale entry from a different deployment dimension; drop it
            self.cache.delete(Namespace::Embeddings, &key);
        }

        let vector = self.inner.embed(text)?;
        self.check_dimension(&vector)?;
        let ttl = self.cache.long_ttl();
        self.cache
            .set_json(Namespace::Embeddings, &key, &vector, Some(ttl));
        Ok(vector)
    }

    /// Embed many texts preserving input order, pulling cached vectors and
    /// generating only the rest.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.load()?;

        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = TieredCache::hash_identifier(text);
            match self.cache.get_json::<Vec<f32>>(Namespace::Embeddings, &key) {
                Some(v) if self.check_dimension(&v).is_ok() => out[i] = Some(v),
                _ => missing.push(i),
            }
        }

        if !missing.is_empty() {
            let pending: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let generated = self.inner.embed_batch(&pending)?;
            if generated.len() != pending.len() {
                return Err(MemoriaError::Embedding(format!(
                    "batch embed returned {} vectors for {} inputs",
                    generated.len(),
                    pending.len()
                )));
            }
            let ttl = self.cache.long_ttl();
            for (&i, vector) in missing.iter().zip(generated.into_iter()) {
                self.check_dimension(&vector)?;
                let key = TieredCache::hash_identifier(texts[i]);
                self.cache
                    .set_json(Namespace::Embeddings, &key, &vector, Some(ttl));
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}
