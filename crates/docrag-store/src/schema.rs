//! Arrow schemas for the `documents`, `chunks` and `meta` tables, plus the
//! conversions between record batches and domain types.
//!
//! Embeddings are stored as raw little-endian `f32` bytes so the column is
//! independent of the configured dimension. `extracted_info` and chunk
//! metadata are stored as JSON text, verbatim.
use anyhow::{anyhow, Context, Result};
use arrow_array::{
    Array, BinaryArray, Int32Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use docrag_core::types::{Chunk, ChunkId, Document, Meta};

pub const DOCUMENTS_TABLE: &str = "documents";
pub const CHUNKS_TABLE: &str = "chunks";
pub const META_TABLE: &str = "meta";

fn timestamp_ms() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

pub fn build_documents_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("extracted_info", DataType::Utf8, false),
        Field::new("created_at", timestamp_ms(), false),
    ]))
}

pub fn build_chunks_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("document_id", DataType::Int64, false),
        Field::new("chunk_text", DataType::Utf8, false),
        Field::new("sequence_index", DataType::Int32, false),
        Field::new("embedding", DataType::Binary, false),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", timestamp_ms(), false),
    ]))
}

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(anyhow!("embedding blob of {} bytes is not a whole number of f32 values", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub(crate) fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or of unexpected type"))
}

fn parse_meta(json: &str, what: &str) -> Result<Meta> {
    serde_json::from_str(json).with_context(|| format!("invalid {what} JSON"))
}

pub fn documents_to_batch(docs: &[Document]) -> Result<RecordBatch> {
    let mut infos = Vec::with_capacity(docs.len());
    for doc in docs {
        infos.push(serde_json::to_string(&doc.extracted_info)?);
    }
    Ok(RecordBatch::try_new(
        build_documents_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(docs.iter().map(|d| d.id))),
            Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.filename.as_str()))),
            Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.content.as_str()))),
            Arc::new(StringArray::from(infos)),
            Arc::new(TimestampMillisecondArray::from_iter_values(docs.iter().map(|d| d.created_at.timestamp_millis()))),
        ],
    )?)
}

pub fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<Document>> {
    let ids = column::<Int64Array>(batch, "id")?;
    let filenames = column::<StringArray>(batch, "filename")?;
    let contents = column::<StringArray>(batch, "content")?;
    let infos = column::<StringArray>(batch, "extracted_info")?;
    let created = column::<TimestampMillisecondArray>(batch, "created_at")?;
    (0..batch.num_rows())
        .map(|i| {
            let created_at = DateTime::<Utc>::from_timestamp_millis(created.value(i))
                .ok_or_else(|| anyhow!("document {} has an out-of-range timestamp", ids.value(i)))?;
            Ok(Document {
                id: ids.value(i),
                filename: filenames.value(i).to_string(),
                content: contents.value(i).to_string(),
                extracted_info: parse_meta(infos.value(i), "extracted_info")?,
                created_at,
            })
        })
        .collect()
}

pub fn chunks_to_batch(chunks: &[Chunk]) -> Result<RecordBatch> {
    let mut sequence = Vec::with_capacity(chunks.len());
    let mut metadata = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        sequence.push(i32::try_from(chunk.sequence_index)?);
        metadata.push(serde_json::to_string(&chunk.metadata)?);
    }
    Ok(RecordBatch::try_new(
        build_chunks_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.id))),
            Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.document_id))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
            Arc::new(Int32Array::from(sequence)),
            Arc::new(BinaryArray::from_iter_values(chunks.iter().map(|c| encode_embedding(&c.embedding)))),
            Arc::new(StringArray::from(metadata)),
        ],
    )?)
}

pub fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = column::<Int64Array>(batch, "id")?;
    let doc_ids = column::<Int64Array>(batch, "document_id")?;
    let texts = column::<StringArray>(batch, "chunk_text")?;
    let sequence = column::<Int32Array>(batch, "sequence_index")?;
    let embeddings = column::<BinaryArray>(batch, "embedding")?;
    let metadata = column::<StringArray>(batch, "metadata")?;
    (0..batch.num_rows())
        .map(|i| {
            Ok(Chunk {
                id: ids.value(i),
                document_id: doc_ids.value(i),
                text: texts.value(i).to_string(),
                sequence_index: usize::try_from(sequence.value(i))?,
                embedding: decode_embedding(embeddings.value(i))?,
                metadata: parse_meta(metadata.value(i), "chunk metadata")?,
            })
        })
        .collect()
}

/// `(id, embedding)` pairs from a batch projected to those two columns.
pub fn batch_to_embeddings(batch: &RecordBatch) -> Result<Vec<(ChunkId, Vec<f32>)>> {
    let ids = column::<Int64Array>(batch, "id")?;
    let embeddings = column::<BinaryArray>(batch, "embedding")?;
    (0..batch.num_rows())
        .map(|i| Ok((ids.value(i), decode_embedding(embeddings.value(i))?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_are_little_endian_f32() {
        let v = vec![1.0f32, -0.5, 0.25];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes).unwrap(), v);
        assert!(decode_embedding(&bytes[..5]).is_err());
    }

    #[test]
    fn chunk_batch_round_trip() {
        let mut metadata = Meta::new();
        metadata.insert("length".into(), serde_json::json!(5));
        let chunk = Chunk { id: 3, document_id: 1, text: "hello".into(), sequence_index: 0, embedding: vec![0.6, 0.8], metadata };
        let batch = chunks_to_batch(std::slice::from_ref(&chunk)).unwrap();
        assert_eq!(batch_to_chunks(&batch).unwrap(), vec![chunk]);
    }
}
