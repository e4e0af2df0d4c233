//! Retrieval engine: ingest, similarity search, context assembly and the
//! delete/clear/repair lifecycle over a metadata store and a flat index.

pub mod answer;
pub mod context;
mod engine;

pub use answer::{ask, document_summary, Answer, DocumentSummary, QuestionKind, Source};
pub use context::assemble_context;
pub use engine::RetrievalEngine;
