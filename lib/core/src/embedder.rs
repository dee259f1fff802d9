//! Text embedding capability
//!
//! The ranking core only consumes vectors. Anything that can turn text into a
//! fixed-length vector implements [`Embedder`]; a model-backed embedder lives
//! outside this crate. [`HashingEmbedder`] is a deterministic feature-hashing
//! embedder that needs no model and is used by the CLI and tests.

use crate::{Error, Result, Vector};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps text to a vector of fixed dimension
pub trait Embedder: Send + Sync {
    /// Output dimension; must match the index dimension
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vector>;
}

/// Default dimension for hashed text embeddings
pub const DEFAULT_HASHING_DIM: usize = 256;

/// Character-trigram and word feature hashing into a unit vector
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dim })
    }

    #[inline]
    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dim as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dim: DEFAULT_HASHING_DIM,
        }
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vector> {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = text.to_lowercase();

        for word in normalized
            .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
            .filter(|w| !w.is_empty())
        {
            // Words contribute more than their trigrams
            vector[self.bucket(word)] += 2.0;

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram)] += 1.0;
            }
        }

        let mut vector = Vector::new(vector);
        vector.normalize();
        Ok(vector)
    }
}
