use arrow_array::Int64Array;
use chrono::{DateTime, Utc};
use lancedb::Table;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, info};

use docrag_core::error::{Error, Result};
use docrag_core::types::{Chunk, ChunkId, Document, DocumentId, Meta, NewChunk};

use crate::schema::{
    batch_to_chunks, batch_to_documents, batch_to_embeddings, build_chunks_schema, build_documents_schema,
    build_meta_schema, chunks_to_batch, column, documents_to_batch, CHUNKS_TABLE, DOCUMENTS_TABLE, META_TABLE,
};
use crate::table::{append, ensure_table, get_meta, id_list, open_db, scan, set_meta};

const NEXT_DOCUMENT_ID: &str = "next_document_id";
const NEXT_CHUNK_ID: &str = "next_chunk_id";

trait OrStorage<T> {
    fn or_storage(self) -> Result<T>;
}

impl<T, E: Display> OrStorage<T> for std::result::Result<T, E> {
    fn or_storage(self) -> Result<T> {
        self.map_err(Error::storage)
    }
}

/// Durable documents and chunks, backed by LanceDB.
///
/// Ids are allocated here and never reused, even across `clear`: the next id
/// is persisted in the `meta` table and reconciled with the highest stored id
/// on open. Chunk ids therefore increase in insertion order, which is the order
/// the vector index is rebuilt in.
pub struct MetadataStore {
    documents: Table,
    chunks: Table,
    meta: Table,
    next_document_id: DocumentId,
    next_chunk_id: ChunkId,
}

impl MetadataStore {
    pub async fn open(db_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_dir).or_storage()?;
        let uri = db_dir.to_string_lossy();
        let conn = open_db(&uri).await.or_storage()?;
        let documents = ensure_table(&conn, DOCUMENTS_TABLE, build_documents_schema()).await.or_storage()?;
        let chunks = ensure_table(&conn, CHUNKS_TABLE, build_chunks_schema()).await.or_storage()?;
        let meta = ensure_table(&conn, META_TABLE, build_meta_schema()).await.or_storage()?;

        let mut store = Self { documents, chunks, meta, next_document_id: 1, next_chunk_id: 1 };
        store.next_document_id = store.reconcile_counter(NEXT_DOCUMENT_ID, &store.documents).await?;
        store.next_chunk_id = store.reconcile_counter(NEXT_CHUNK_ID, &store.chunks).await?;
        info!(
            path = %db_dir.display(),
            next_document_id = store.next_document_id,
            next_chunk_id = store.next_chunk_id,
            "metadata store opened"
        );
        Ok(store)
    }

    async fn reconcile_counter(&self, key: &str, table: &Table) -> Result<i64> {
        let stored = match get_meta(&self.meta, key).await.or_storage()? {
            Some(value) => value
                .parse::<i64>()
                .map_err(|e| Error::StorageFailure(format!("meta '{key}' is not an integer: {e}")))?,
            None => 1,
        };
        let max_id = Self::ids(table, None).await?.into_iter().max().unwrap_or(0);
        Ok(stored.max(max_id + 1))
    }

    async fn ids(table: &Table, filter: Option<&str>) -> Result<Vec<i64>> {
        let batches = scan(table, filter, Some(&["id"])).await.or_storage()?;
        let mut ids = Vec::new();
        for batch in &batches {
            let col = column::<Int64Array>(batch, "id").or_storage()?;
            ids.extend(col.values().iter().copied());
        }
        Ok(ids)
    }

    /// Persist a new document and return it with its fresh id.
    pub async fn insert_document(&mut self, filename: &str, content: &str, extracted_info: Meta) -> Result<Document> {
        let now = Utc::now();
        let doc = Document {
            id: self.next_document_id,
            filename: filename.to_string(),
            content: content.to_string(),
            extracted_info,
            // stored at millisecond precision
            created_at: DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now),
        };
        let batch = documents_to_batch(std::slice::from_ref(&doc)).or_storage()?;
        // counter first: a failed row append only skips an id
        set_meta(&self.meta, NEXT_DOCUMENT_ID, &(doc.id + 1).to_string()).await.or_storage()?;
        self.next_document_id = doc.id + 1;
        append(&self.documents, batch).await.or_storage()?;
        debug!(document_id = doc.id, filename, "document stored");
        Ok(doc)
    }

    /// Persist `chunks` in order; ids are assigned in the same order.
    pub async fn insert_chunks(&mut self, chunks: Vec<NewChunk>) -> Result<Vec<ChunkId>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let first = self.next_chunk_id;
        let rows: Vec<Chunk> = chunks
            .into_iter()
            .zip(first..)
            .map(|(c, id)| Chunk {
                id,
                document_id: c.document_id,
                text: c.text,
                sequence_index: c.sequence_index,
                embedding: c.embedding,
                metadata: c.metadata,
            })
            .collect();
        let ids: Vec<ChunkId> = rows.iter().map(|c| c.id).collect();
        let batch = chunks_to_batch(&rows).or_storage()?;
        let next = first + ids.len() as i64;
        set_meta(&self.meta, NEXT_CHUNK_ID, &next.to_string()).await.or_storage()?;
        self.next_chunk_id = next;
        append(&self.chunks, batch).await.or_storage()?;
        Ok(ids)
    }

    pub async fn document(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.documents_by_ids(&[id]).await?.remove(&id))
    }

    pub async fn documents_by_ids(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Document>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let filter = format!("id IN ({})", id_list(ids));
        let mut out = HashMap::with_capacity(ids.len());
        for batch in scan(&self.documents, Some(&filter), None).await.or_storage()? {
            for doc in batch_to_documents(&batch).or_storage()? {
                out.insert(doc.id, doc);
            }
        }
        Ok(out)
    }

    /// All documents, newest first (ties broken by id, descending).
    pub async fn documents(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for batch in scan(&self.documents, None, None).await.or_storage()? {
            docs.extend(batch_to_documents(&batch).or_storage()?);
        }
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    pub async fn document_count(&self) -> Result<usize> {
        self.documents.count_rows(None).await.or_storage()
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        self.chunks.count_rows(None).await.or_storage()
    }

    pub async fn chunk_ids_for_document(&self, document_id: DocumentId) -> Result<Vec<ChunkId>> {
        let mut ids = Self::ids(&self.chunks, Some(&format!("document_id = {document_id}"))).await?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Chunks of one document in `sequence_index` order.
    pub async fn chunks_for_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let filter = format!("document_id = {document_id}");
        let mut chunks = Vec::new();
        for batch in scan(&self.chunks, Some(&filter), None).await.or_storage()? {
            chunks.extend(batch_to_chunks(&batch).or_storage()?);
        }
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(chunks)
    }

    pub async fn chunks_by_ids(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let filter = format!("id IN ({})", id_list(ids));
        let mut out = HashMap::with_capacity(ids.len());
        for batch in scan(&self.chunks, Some(&filter), None).await.or_storage()? {
            for chunk in batch_to_chunks(&batch).or_storage()? {
                out.insert(chunk.id, chunk);
            }
        }
        Ok(out)
    }

    /// Every chunk id, ascending (insertion order).
    pub async fn ordered_chunk_ids(&self) -> Result<Vec<ChunkId>> {
        let mut ids = Self::ids(&self.chunks, None).await?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Stored embeddings of every chunk not owned by `exclude`, ascending chunk id.
    pub async fn embeddings_in_order(&self, exclude: Option<DocumentId>) -> Result<Vec<(ChunkId, Vec<f32>)>> {
        let filter = exclude.map(|id| format!("document_id != {id}"));
        let batches = scan(&self.chunks, filter.as_deref(), Some(&["id", "embedding"])).await.or_storage()?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(batch_to_embeddings(batch).or_storage()?);
        }
        out.sort_unstable_by_key(|(id, _)| *id);
        Ok(out)
    }

    /// Remove a document and its chunks. Chunks go first so a failure never
    /// leaves chunks pointing at a missing document.
    pub async fn delete_document(&mut self, id: DocumentId) -> Result<()> {
        self.chunks.delete(&format!("document_id = {id}")).await.or_storage()?;
        self.documents.delete(&format!("id = {id}")).await.or_storage()?;
        info!(document_id = id, "document rows deleted");
        Ok(())
    }

    /// Remove every document and chunk. Id counters keep counting.
    pub async fn clear(&mut self) -> Result<()> {
        self.chunks.delete("id IS NOT NULL").await.or_storage()?;
        self.documents.delete("id IS NOT NULL").await.or_storage()?;
        info!("metadata store cleared");
        Ok(())
    }
}
