use std::cmp::Ordering;

use docrag_core::error::{Error, Result};
use docrag_core::types::ChunkId;

/// Unit-norm tolerance accepted on insert.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// One similarity hit: index position, the chunk stored there, and the
/// inner product with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub position: usize,
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// Exact inner-product index over unit vectors.
///
/// Vectors live in one contiguous buffer in insertion order; `chunk_ids[k]`
/// names the chunk whose vector sits at position `k`. The two are only ever
/// changed together. `generation` is bumped by every rebuild or clear so
/// callers can tell two layouts apart.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    generation: u64,
    chunk_ids: Vec<ChunkId>,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, generation: 0, chunk_ids: Vec::new(), data: Vec::new() }
    }

    pub(crate) fn from_parts(dim: usize, generation: u64, chunk_ids: Vec<ChunkId>, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() != chunk_ids.len() * dim {
            return Err(Error::IndexCorrupt(format!(
                "{} chunk ids do not match {} values at dimension {}",
                chunk_ids.len(),
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, generation, chunk_ids, data })
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.chunk_ids.len() }
    pub fn is_empty(&self) -> bool { self.chunk_ids.is_empty() }
    pub fn generation(&self) -> u64 { self.generation }

    /// Position → chunk table, in position order.
    pub fn chunk_ids(&self) -> &[ChunkId] { &self.chunk_ids }

    pub fn chunk_at(&self, position: usize) -> Option<ChunkId> {
        self.chunk_ids.get(position).copied()
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        (position < self.len()).then(|| &self.data[position * self.dim..(position + 1) * self.dim])
    }

    pub(crate) fn raw_data(&self) -> &[f32] { &self.data }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        let norm = l2_norm(vector);
        if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(Error::Operation(format!("vector is not unit-normalized (norm={norm})")));
        }
        Ok(())
    }

    /// Append one vector; returns its position.
    pub fn append(&mut self, chunk_id: ChunkId, vector: &[f32]) -> Result<usize> {
        self.check_vector(vector)?;
        self.chunk_ids.push(chunk_id);
        self.data.extend_from_slice(vector);
        Ok(self.chunk_ids.len() - 1)
    }

    /// Append a batch in order. Nothing is appended unless every vector is valid.
    pub fn append_batch(&mut self, entries: &[(ChunkId, Vec<f32>)]) -> Result<()> {
        for (_, vector) in entries {
            self.check_vector(vector)?;
        }
        self.chunk_ids.reserve(entries.len());
        self.data.reserve(entries.len() * self.dim);
        for (chunk_id, vector) in entries {
            self.chunk_ids.push(*chunk_id);
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Exact top-`k` by inner product, best first; ties go to the lower position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Hit> = self
            .data
            .chunks_exact(self.dim)
            .zip(&self.chunk_ids)
            .enumerate()
            .map(|(position, (vector, &chunk_id))| Hit { position, chunk_id, score: dot(query, vector).clamp(-1.0, 1.0) })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.position.cmp(&b.position)));
        hits.truncate(k);
        Ok(hits)
    }

    /// A fresh index holding exactly `entries`, in order, one generation
    /// ahead of `self`. `self` is left untouched.
    pub fn rebuilt<I>(&self, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ChunkId, Vec<f32>)>,
    {
        let mut next = Self { dim: self.dim, generation: self.generation + 1, chunk_ids: Vec::new(), data: Vec::new() };
        for (chunk_id, vector) in entries {
            next.append(chunk_id, &vector)?;
        }
        Ok(next)
    }

    /// Replace the whole content with `entries`. On error the index is unchanged.
    pub fn rebuild<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (ChunkId, Vec<f32>)>,
    {
        *self = self.rebuilt(entries)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.chunk_ids.clear();
        self.data.clear();
        self.generation += 1;
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Unit-length copy of `v`, or `None` for zero or non-finite input.
pub fn l2_normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if !norm.is_finite() || norm <= f32::EPSILON {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vec<f32> {
        l2_normalize(values).expect("non-zero")
    }

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index.append(10, &unit(&[1.0, 0.0, 0.0])).unwrap();
        index.append(11, &unit(&[0.0, 1.0, 0.0])).unwrap();
        index.append(12, &unit(&[1.0, 1.0, 0.0])).unwrap();
        index
    }

    #[test]
    fn search_orders_by_descending_score() {
        let index = sample();
        let hits = index.search(&unit(&[1.0, 0.2, 0.0]), 3).unwrap();
        let ids: Vec<ChunkId> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![10, 12, 11]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.score)));
    }

    #[test]
    fn ties_prefer_lower_position() {
        let mut index = FlatIndex::new(2);
        let v = unit(&[0.0, 1.0]);
        index.append(7, &v).unwrap();
        index.append(3, &v).unwrap();
        let hits = index.search(&v, 2).unwrap();
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].chunk_id, 7);
    }

    #[test]
    fn k_larger_than_len_returns_all() {
        let index = sample();
        assert_eq!(index.search(&unit(&[0.0, 0.0, 1.0]), 10).unwrap().len(), 3);
        assert!(FlatIndex::new(3).search(&unit(&[0.0, 0.0, 1.0]), 5).unwrap().is_empty());
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(index.append(1, &[1.0, 0.0]), Err(Error::DimensionMismatch { expected: 3, actual: 2 })));
        assert!(matches!(index.search(&[1.0], 1), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn non_unit_vectors_are_rejected() {
        let mut index = FlatIndex::new(2);
        assert!(index.append(1, &[3.0, 4.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn append_batch_is_all_or_nothing() {
        let mut index = sample();
        let bad = vec![(20, unit(&[0.0, 0.0, 1.0])), (21, vec![0.0, 0.0])];
        assert!(index.append_batch(&bad).is_err());
        assert_eq!(index.chunk_ids(), &[10, 11, 12]);
    }

    #[test]
    fn rebuild_replaces_mapping_and_bumps_generation() {
        let mut index = sample();
        let keep: Vec<(ChunkId, Vec<f32>)> = (1..3)
            .map(|pos| (index.chunk_at(pos).unwrap(), index.vector(pos).unwrap().to_vec()))
            .collect();
        index.rebuild(keep).unwrap();
        assert_eq!(index.chunk_ids(), &[11, 12]);
        assert_eq!(index.generation(), 1);
        let hits = index.search(&unit(&[0.0, 1.0, 0.0]), 1).unwrap();
        assert_eq!((hits[0].position, hits[0].chunk_id), (0, 11));
    }

    #[test]
    fn failed_rebuild_keeps_old_index() {
        let mut index = sample();
        let before = index.clone();
        assert!(index.rebuild(vec![(1, vec![1.0, 0.0])]).is_err());
        assert_eq!(index, before);
    }

    #[test]
    fn clear_empties_and_bumps_generation() {
        let mut index = sample();
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.generation(), 1);
        assert_eq!(index.chunk_at(0), None);
    }
}
