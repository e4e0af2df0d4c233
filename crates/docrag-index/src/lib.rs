//! Exact flat vector index over unit-norm embeddings.
//!
//! The index only supports append, full rebuild and clear. Removing a chunk
//! means rebuilding from the surviving vectors, which keeps the position →
//! chunk table dense and in insertion order.

mod flat;
pub mod snapshot;

pub use flat::{dot, l2_norm, l2_normalize, FlatIndex, Hit, NORM_TOLERANCE};
