//! Domain types shared by the store, the index and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type DocumentId = i64;
pub type ChunkId = i64;

/// Opaque key/value payload, stored verbatim as JSON.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// A stored source document.
///
/// `extracted_info` is produced by whatever pipeline extracted the text and is
/// never interpreted by the retrieval core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub content: String,
    pub extracted_info: Meta,
    pub created_at: DateTime<Utc>,
}

/// Listing view of a document (no content payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub extracted_info: Meta,
}

impl From<&Document> for DocumentInfo {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            created_at: doc.created_at,
            extracted_info: doc.extracted_info.clone(),
        }
    }
}

/// A chunk that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub document_id: DocumentId,
    pub text: String,
    pub sequence_index: usize,
    pub embedding: Vec<f32>,
    pub metadata: Meta,
}

/// A persisted retrieval unit.
///
/// - `sequence_index`: 0-based, contiguous within the parent document
/// - `embedding`: unit-norm vector, the same one the index holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub sequence_index: usize,
    pub embedding: Vec<f32>,
    pub metadata: Meta,
}

/// One retrieved chunk, joined with its parent document.
///
/// `score` is the cosine similarity in `[-1, 1]`; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_text: String,
    pub filename: String,
    pub score: f32,
    pub extracted_info: Meta,
    pub metadata: Meta,
}

pub const NO_RELEVANT_DOCUMENT: &str = "No relevant document found.";

/// Assembled context window for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Context {
    Found(String),
    NoRelevantDocument,
}

impl Context {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Found(text) => text,
            Self::NoRelevantDocument => NO_RELEVANT_DOCUMENT,
        }
    }

    pub fn into_found(self) -> Option<String> {
        match self {
            Self::Found(text) => Some(text),
            Self::NoRelevantDocument => None,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How retrieved scores are folded into a single confidence value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidencePolicy {
    #[default]
    Mean,
    Max,
}

impl ConfidencePolicy {
    /// Confidence in `[0, 1]`; zero when there are no scores.
    pub fn score(self, scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        let raw = match self {
            Self::Mean => scores.iter().sum::<f32>() / scores.len() as f32,
            Self::Max => scores.iter().copied().fold(f32::MIN, f32::max),
        };
        raw.clamp(0.0, 1.0)
    }
}
