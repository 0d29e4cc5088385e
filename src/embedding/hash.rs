//! Deterministic local embedding model based on feature hashing
//!
//! No model weights, no external calls: tokens and bigrams are hashed into a
//! fixed number of buckets with signed weights, then L2-normalized. Output is
//! stable across runs and platforms, which the embedding cache relies on.

use super::Embedder;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a. `DefaultHasher` output may change between Rust releases, which
/// would invalidate every cached vector.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Feature-hashing embedder with unigram and bigram features
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let h = fnv1a(feature.as_bytes());
        let idx = (h % self.dimensions as u64) as usize;
        // One hash bit decides the sign, spreading collision damage
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(vector);
        }

        let doc_len = tokens.len() as f32;

        for window in tokens.windows(2) {
            let feature = format!("{}\u{1}{}", window[0], window[1]);
            let (idx, sign) = self.bucket(&feature);
            vector[idx] += 0.5 * sign;
        }

        let mut counts: std::collections::HashMap<&str, f32> = std::collections::HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        for (token, count) in counts {
            let tf = (1.0 + count / doc_len).ln();
            // Longer tokens are rarer; cheap stand-in for document frequency
            let rarity = 1.0 + token.len() as f32 * 0.1;
            let (idx, sign) = self.bucket(token);
            vector[idx] += tf * rarity * sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(384);
        let a = embedder.embed("persistent memory for agents").unwrap();
        let b = embedder.embed("persistent memory for agents").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(embedder.embed("anything").unwrap().len(), 128);
        assert_eq!(embedder.dimensions(), 128);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_normalized() {
        let embedder = HashEmbedder::new(384);
        let v = embedder.embed("vectors should have unit length").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashEmbedder::new(384);
        let a = embedder
            .embed("TypeScript is a programming language")
            .unwrap();
        let b = embedder
            .embed("TypeScript programming language tooling")
            .unwrap();
        let c = embedder.embed("soup recipes for cold evenings").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
