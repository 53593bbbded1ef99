//! Deterministic token-hashing embedder.
//!
//! Used when no model-backed embedder is configured and in tests: similar
//! token bags land close together, which is enough to exercise vector search
//! end to end.

use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use crate::error::{Error, Result};
use crate::traits::Embedder;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 { return Err(Error::InvalidConfig("embedding dimension must be > 0".into())); }
        Ok(Self { dim })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn shared_tokens_score_higher() {
        let e = HashingEmbedder::new(64).expect("embedder");
        let out = e
            .embed_batch(&["red itchy rash".to_string(), "itchy red rash".to_string(), "broken wrist".to_string()])
            .expect("embed");
        assert_eq!(out[0].len(), 64);
        assert!((cosine(&out[0], &out[1]) - 1.0).abs() < 1e-5);
        assert!(cosine(&out[0], &out[2]) < 0.9);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }
}
