use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info, warn};

use docrag_core::chunker::{chunk_text, ChunkingConfig};
use docrag_core::config::RagSettings;
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use docrag_core::types::{
    Chunk, ConfidencePolicy, Context, Document, DocumentId, DocumentInfo, Meta, NewChunk, SearchResult,
};
use docrag_index::{l2_normalize, snapshot, FlatIndex};
use docrag_store::MetadataStore;

use crate::context::assemble_context;

/// Ingest, retrieval and lifecycle over one metadata store and one vector
/// index.
///
/// The store is the source of truth. The index is derived from it and is
/// persisted after every mutation; at open it is checked against the store
/// and rebuilt when the two disagree.
pub struct RetrievalEngine {
    store: MetadataStore,
    index: FlatIndex,
    index_path: PathBuf,
    embedder: Box<dyn Embedder>,
    chunking: ChunkingConfig,
    search_top_k: usize,
    context_top_k: usize,
    max_context_length: usize,
    confidence: ConfidencePolicy,
}

impl RetrievalEngine {
    /// Open (or create) the store and index described by `settings`, with
    /// relative paths resolved against `base_dir`.
    pub async fn open(settings: &RagSettings, base_dir: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != settings.dimension {
            return Err(Error::DimensionMismatch { expected: settings.dimension, actual: embedder.dim() });
        }

        let store = MetadataStore::open(&settings.db_dir_in(base_dir)).await?;
        let index_path = settings.index_path_in(base_dir);
        let loaded = match snapshot::load(&index_path) {
            Ok(Some(index)) if index.dim() == settings.dimension => Some(index),
            Ok(Some(index)) => {
                warn!(stored = index.dim(), configured = settings.dimension, "index dimension differs from configuration");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path = %index_path.display(), error = %e, "index snapshot unreadable");
                None
            }
        };

        let mut engine = Self {
            store,
            index: FlatIndex::new(settings.dimension),
            index_path,
            embedder,
            chunking: settings.chunking(),
            search_top_k: settings.search_top_k,
            context_top_k: settings.context_top_k,
            max_context_length: settings.max_context_length,
            confidence: settings.confidence,
        };

        let stored_ids = engine.store.ordered_chunk_ids().await?;
        match loaded {
            Some(index) if index.chunk_ids() == stored_ids.as_slice() => {
                debug!(entries = index.len(), generation = index.generation(), "index snapshot loaded");
                engine.index = index;
            }
            None if stored_ids.is_empty() => {}
            stale => {
                warn!(
                    indexed = stale.as_ref().map_or(0, FlatIndex::len),
                    stored = stored_ids.len(),
                    "index out of sync with metadata store, rebuilding"
                );
                if let Some(index) = stale {
                    engine.index = index;
                }
                engine.repair_index().await?;
            }
        }
        Ok(engine)
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn search_top_k(&self) -> usize {
        self.search_top_k
    }

    pub fn context_top_k(&self) -> usize {
        self.context_top_k
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    pub fn confidence_policy(&self) -> ConfidencePolicy {
        self.confidence
    }

    /// Embed and normalize `texts` in one provider call.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.embedder.embed_batch(texts).map_err(Error::embedding)?;
        if raw.len() != texts.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} texts",
                raw.len(),
                texts.len()
            )));
        }
        let dim = self.index.dim();
        raw.iter()
            .map(|v| {
                if v.len() != dim {
                    return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
                }
                l2_normalize(v).ok_or_else(|| Error::EmbeddingUnavailable("provider returned a zero vector".into()))
            })
            .collect()
    }

    fn persist_index(&self) -> Result<()> {
        snapshot::save(&self.index, &self.index_path)
    }

    /// Chunk, embed and store a document; returns its id.
    ///
    /// Embedding happens before anything is written, so a provider failure
    /// leaves both stores untouched.
    pub async fn add_document(&mut self, filename: &str, content: &str, extracted_info: Meta) -> Result<DocumentId> {
        let pieces = chunk_text(content, &self.chunking);
        let vectors = self.embed(&pieces)?;

        let doc = self.store.insert_document(filename, content, extracted_info).await?;
        let new_chunks: Vec<NewChunk> = pieces
            .into_iter()
            .zip(vectors.iter())
            .enumerate()
            .map(|(sequence_index, (text, vector))| {
                let mut metadata = Meta::new();
                metadata.insert("chunk_size".into(), json!(text.chars().count()));
                NewChunk { document_id: doc.id, text, sequence_index, embedding: vector.clone(), metadata }
            })
            .collect();

        let chunk_ids = match self.store.insert_chunks(new_chunks).await {
            Ok(ids) => ids,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_document(doc.id).await {
                    warn!(document_id = doc.id, error = %cleanup, "could not remove document after failed chunk insert");
                }
                return Err(e);
            }
        };

        let entries: Vec<_> = chunk_ids.iter().copied().zip(vectors).collect();
        self.index.append_batch(&entries)?;
        if let Err(e) = self.persist_index() {
            warn!(document_id = doc.id, error = %e, "index snapshot not saved; it will be rebuilt on next open");
            return Err(e);
        }
        info!(document_id = doc.id, filename, chunks = chunk_ids.len(), "document ingested");
        Ok(doc.id)
    }

    /// Top `top_k` chunks for `query`, best first. An empty index yields an
    /// empty list.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingUnavailable("no vector for query".into()))?;
        let hits = self.index.search(&query_vector, top_k.min(self.index.len()))?;

        let chunk_ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        let chunks = self.store.chunks_by_ids(&chunk_ids).await?;
        let doc_ids: Vec<DocumentId> =
            chunks.values().map(|c| c.document_id).collect::<BTreeSet<_>>().into_iter().collect();
        let docs = self.store.documents_by_ids(&doc_ids).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(chunk) = chunks.get(&hit.chunk_id) else {
                warn!(position = hit.position, chunk_id = hit.chunk_id, "indexed chunk missing from store");
                continue;
            };
            let Some(doc) = docs.get(&chunk.document_id) else {
                warn!(chunk_id = chunk.id, document_id = chunk.document_id, "chunk has no parent document");
                continue;
            };
            results.push(SearchResult {
                chunk_id: chunk.id,
                document_id: doc.id,
                chunk_text: chunk.text.clone(),
                filename: doc.filename.clone(),
                score: hit.score,
                extracted_info: doc.extracted_info.clone(),
                metadata: chunk.metadata.clone(),
            });
        }
        debug!(query, top_k, returned = results.len(), "search finished");
        Ok(results)
    }

    /// Context window for `query` built from the best `context_top_k` chunks.
    pub async fn get_context_for_query(&self, query: &str, max_context_length: usize) -> Result<Context> {
        let results = self.search(query, self.context_top_k).await?;
        Ok(assemble_context(&results, max_context_length))
    }

    pub async fn get_document_count(&self) -> Result<usize> {
        self.store.document_count().await
    }

    /// Every document without its content, newest first.
    pub async fn get_all_documents(&self) -> Result<Vec<DocumentInfo>> {
        Ok(self.store.documents().await?.iter().map(DocumentInfo::from).collect())
    }

    pub async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        self.store.document(id).await
    }

    pub async fn chunks_for_document(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        self.store.chunks_for_document(id).await
    }

    /// Delete a document; `false` on any failure. A failed deletion leaves the
    /// document, its chunks and the persisted index in place.
    pub async fn delete_document(&mut self, id: DocumentId) -> bool {
        match self.try_delete_document(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(document_id = id, error = %e, "document not deleted");
                false
            }
        }
    }

    /// Delete a document, reporting why it failed.
    ///
    /// The replacement index is built from the surviving chunks and saved
    /// before the store is touched. Rows are deleted last; if that fails the
    /// previous snapshot is restored.
    pub async fn try_delete_document(&mut self, id: DocumentId) -> Result<()> {
        if self.store.document(id).await?.is_none() {
            return Err(Error::NotFound(format!("document {id}")));
        }
        let removed = self.store.chunk_ids_for_document(id).await?;
        let surviving = self.store.embeddings_in_order(Some(id)).await?;
        let next = self.index.rebuilt(surviving)?;
        snapshot::save(&next, &self.index_path)?;

        if let Err(e) = self.store.delete_document(id).await {
            self.restore_after_failed_delete().await;
            return Err(e);
        }
        self.index = next;
        info!(
            document_id = id,
            removed_chunks = removed.len(),
            remaining = self.index.len(),
            generation = self.index.generation(),
            "document deleted"
        );
        Ok(())
    }

    /// Bring the persisted index back in line with the store after a row
    /// deletion failed part way.
    async fn restore_after_failed_delete(&mut self) {
        let in_sync = match self.store.ordered_chunk_ids().await {
            Ok(ids) => ids.as_slice() == self.index.chunk_ids(),
            Err(e) => {
                warn!(error = %e, "could not read chunk ids after failed delete");
                true
            }
        };
        let restored = if in_sync { self.persist_index() } else { self.repair_index().await.map(|_| ()) };
        if let Err(e) = restored {
            warn!(error = %e, "index snapshot not restored; it will be rebuilt on next open");
        }
    }

    /// Remove every document and chunk and empty the index.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.index.clear();
        self.persist_index()?;
        info!("all documents removed");
        Ok(())
    }

    /// Rebuild the index from every stored chunk embedding, in chunk id
    /// order, and persist it. Returns the number of indexed chunks.
    pub async fn repair_index(&mut self) -> Result<usize> {
        let entries = self.store.embeddings_in_order(None).await?;
        self.index = self.index.rebuilt(entries)?;
        self.persist_index()?;
        info!(entries = self.index.len(), generation = self.index.generation(), "index rebuilt from metadata store");
        Ok(self.index.len())
    }
}
