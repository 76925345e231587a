//! KnowledgeNode - a retrievable fact
//!
//! Written by Conductor after successful responses, by ingest jobs, and by the
//! standards loader; read by Retrieval. An embedding, if present, must have
//! exactly `EMBEDDING_DIM` components — never silently truncated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;

/// Fixed embedding dimension (reference implementation value).
pub const EMBEDDING_DIM: usize = 768;

/// Maximum content length in characters.
pub const MAX_CONTENT_CHARS: usize = 8_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    pub domain: Option<String>,
    pub source: String,
    pub is_standard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: KnowledgeMetadata,
    pub confidence_score: f32,
    pub is_verified: bool,
    pub usage_count: u64,
    pub created_at: i64,
}

/// Error raised when an embedding's length doesn't match `EMBEDDING_DIM`.
#[derive(Debug, thiserror::Error)]
#[error("embedding has {actual} components, expected {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

impl KnowledgeNode {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: generate_id("kn", &content),
            content,
            embedding: None,
            metadata: KnowledgeMetadata {
                domain: None,
                source: source.into(),
                is_standard: false,
            },
            confidence_score: 0.5,
            is_verified: false,
            usage_count: 0,
            created_at: now_ms(),
        }
    }

    /// Attach an embedding, rejecting any vector whose length isn't `EMBEDDING_DIM`.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Result<Self, DimensionMismatch> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: embedding.len(),
            });
        }
        self.embedding = Some(embedding);
        Ok(self)
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.metadata.domain = Some(domain.into());
        self
    }

    pub fn mark_standard(mut self) -> Self {
        self.metadata.is_standard = true;
        self
    }

    pub fn record_usage(&mut self) {
        self.usage_count += 1;
    }

    /// Cosine similarity against a query embedding; `None` if this node has no
    /// embedding (callers fall back to substring matching in that case).
    pub fn cosine_similarity(&self, query: &[f32]) -> Option<f32> {
        let embedding = self.embedding.as_ref()?;
        if embedding.len() != query.len() {
            return None;
        }
        let dot: f32 = embedding.iter().zip(query).map(|(a, b)| a * b).sum();
        let mag_a: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag_a == 0.0 || mag_b == 0.0 {
            return Some(0.0);
        }
        Some(dot / (mag_a * mag_b))
    }
}

impl Record for KnowledgeNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "knowledge_nodes"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        if let Some(domain) = &self.metadata.domain {
            fields.insert("domain".to_string(), IndexValue::String(domain.clone()));
        }
        fields.insert("is_verified".to_string(), IndexValue::Bool(self.is_verified));
        fields.insert(
            "has_embedding".to_string(),
            IndexValue::Bool(self.embedding.is_some()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_embedding_dimension() {
        let node = KnowledgeNode::new("some fact", "self");
        let err = node.with_embedding(vec![0.1; 10]).unwrap_err();
        assert_eq!(err.expected, EMBEDDING_DIM);
        assert_eq!(err.actual, 10);
    }

    #[test]
    fn accepts_correctly_sized_embedding() {
        let node = KnowledgeNode::new("some fact", "self");
        let node = node.with_embedding(vec![0.1; EMBEDDING_DIM]).unwrap();
        assert_eq!(node.embedding.unwrap().len(), EMBEDDING_DIM);
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[0] = 1.0;
        let node = KnowledgeNode::new("fact", "self").with_embedding(v.clone()).unwrap();
        let sim = node.cosine_similarity(&v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_none_without_embedding() {
        let node = KnowledgeNode::new("fact", "self");
        assert!(node.cosine_similarity(&vec![0.0; EMBEDDING_DIM]).is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        let node = KnowledgeNode::new("fact", "self").with_confidence(1.5);
        assert_eq!(node.confidence_score, 1.0);
        let node = KnowledgeNode::new("fact", "self").with_confidence(-0.5);
        assert_eq!(node.confidence_score, 0.0);
    }
}
