//! Text embedding into a fixed-dimension vector space.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub const DEFAULT_DIMENSION: usize = 256;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "with",
];

/// Maps text to vectors; documents and queries must share one embedder.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing embedder over normalized word tokens.
///
/// Buckets come from SHA-256, so vectors persisted by one build stay
/// comparable with queries embedded by another.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0_u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let value = u64::from_le_bytes(prefix);
        let dimension = u64::try_from(self.dimension).unwrap_or(u64::MAX);
        usize::try_from(value % dimension).unwrap_or(0)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1;
        }
        for (token, count) in counts {
            let weight = 1.0 + f64::from(count).ln();
            #[allow(clippy::cast_possible_truncation)]
            let weight = weight as f32;
            let index = self.bucket(&token);
            vector[index] += weight;
        }
        normalize_vector(&mut vector);
        vector
    }
}

/// Lowercased alphanumeric tokens with stop words removed and a plural `s`
/// stripped from longer words.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .map(|token| {
            if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
                token[..token.len() - 1].to_string()
            } else {
                token
            }
        })
        .collect()
}

pub fn normalize_vector(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity; zero when either vector is zero or lengths differ.
#[must_use]
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_normalized() {
        assert_eq!(
            tokenize("List all Networks where *MARSHA='HDQTR2'"),
            vec!["list", "all", "network", "where", "marsha", "hdqtr2"]
        );
        assert_eq!(tokenize("address class"), vec!["address", "class"]);
    }

    #[test]
    fn embedding_is_deterministic_and_unit_length() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("search networks by site");
        let second = embedder.embed("search networks by site");
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|value| value * value).sum();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(embedder.embed("  ").iter().all(|value| *value == 0.0));
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("networks where MARSHA is HDQTR2");
        let related = embedder.embed("Extensible attribute MARSHA: filter networks with *MARSHA");
        let unrelated = embedder.embed("DHCP lease failover timing");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
        assert!(cosine_similarity(&query, &[0.0; 3]).abs() < f32::EPSILON);
    }
}
