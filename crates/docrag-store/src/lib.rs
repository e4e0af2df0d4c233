//! LanceDB-backed metadata store: the durable source of truth for documents,
//! chunks and their embeddings.

pub mod schema;
pub mod table;
mod store;

pub use schema::{decode_embedding, encode_embedding};
pub use store::MetadataStore;
