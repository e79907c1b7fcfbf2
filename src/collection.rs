// Collection - a keyed set of documents sharing one embedding function
// and, optionally, one on-disk mirror directory.
//
// The document map is a `parking_lot::RwLock<HashMap<..>>`: a synchronous
// lock, never held across an `.await`. `add_document` therefore computes
// the embedding (which may suspend on network I/O) before acquiring the
// write lock, and the query pipeline holds its read lock only across the
// synchronous filter/rank/projection critical section.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use crate::document::Document;
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::filter::{self, WhereDocument};
use crate::observability;
use crate::persistence;
use crate::ranking::{self, FilterNegative};
use crate::validation::{Concurrency, DocumentId, ResultCount};
use crate::vector::{self, normalize_if_needed};

/// How a negative query should shape ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeMode {
    Subtract,
    Filter,
}

/// A negative query: at least one of `text`/`embedding` must be set;
/// embedding wins if both are present.
#[derive(Debug, Clone, Default)]
pub struct Negative {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub mode: NegativeMode,
    pub filter_threshold: f32,
}

impl Default for NegativeMode {
    fn default() -> Self {
        NegativeMode::Filter
    }
}

/// Options accepted by [`Collection::query_with_options`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub query_text: Option<String>,
    pub query_embedding: Option<Vec<f32>>,
    pub n_results: usize,
    pub r#where: HashMap<String, String>,
    pub where_document: WhereDocument,
    pub negative: Option<Negative>,
}

impl QueryOptions {
    pub fn new(n_results: usize) -> Self {
        Self {
            n_results,
            where_document: WhereDocument::all(),
            ..Default::default()
        }
    }
}

/// One ranked result, deep-copied out of the collection's document map.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub document: Document,
    pub score: f32,
}

struct PersistConfig {
    dir: PathBuf,
    compress: bool,
    encryption_key: Option<[u8; 32]>,
}

/// A named set of documents. Constructed only through [`crate::db::Db`].
pub struct Collection {
    name: String,
    metadata: HashMap<String, String>,
    documents: RwLock<HashMap<String, Document>>,
    embedder: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
    persist: Option<PersistConfig>,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        metadata: HashMap<String, String>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        persist_dir: Option<PathBuf>,
        compress: bool,
        encryption_key: Option<[u8; 32]>,
    ) -> Self {
        Self {
            name,
            metadata,
            documents: RwLock::new(HashMap::new()),
            embedder: RwLock::new(embedder),
            persist: persist_dir.map(|dir| PersistConfig {
                dir,
                compress,
                encryption_key,
            }),
        }
    }

    /// Rehydrates a collection's in-memory document map from its mirror
    /// directory. Any document file that fails to decode is skipped with a
    /// warning rather than aborting the whole load.
    pub(crate) async fn load_from_disk(&self) -> Result<()> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        let mut entries = tokio::fs::read_dir(&persist.dir)
            .await
            .map_err(|e| Error::PersistFailed(e.into()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::PersistFailed(e.into()))? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with(persistence::COLLECTION_METADATA_STEM) {
                continue;
            }
            let compressed = persistence::is_compressed(file_name);
            let encrypted = persistence::is_encrypted(file_name);
            let key = if encrypted { persist.encryption_key.as_ref() } else { None };

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable document file");
                    continue;
                }
            };
            match persistence::decode::<Document>(bytes, compressed, key) {
                Ok(doc) => {
                    self.documents.write().insert(doc.id.clone(), doc);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping corrupt document file");
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Replaces the embedding function, used when rehydrating a persistent
    /// collection (functions cannot themselves be persisted).
    pub fn set_embedder(&self, embedder: Arc<dyn EmbeddingProvider>) {
        *self.embedder.write() = Some(embedder);
    }

    pub fn count(&self) -> usize {
        self.documents.read().len()
    }

    async fn persist_document(&self, doc: &Document) -> Result<()> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        let stem = persistence::file_stem(&doc.id);
        let file_name = persistence::file_name(&stem, persist.compress, persist.encryption_key.is_some());
        let bytes = persistence::encode(doc, persist.compress, persist.encryption_key.as_ref())?;
        tokio::fs::write(persist.dir.join(file_name), bytes)
            .await
            .map_err(|e| Error::PersistFailed(e.into()))
    }

    async fn remove_document_file(&self, id: &str) -> Result<()> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        let stem = persistence::file_stem(id);
        for compress in [false, true] {
            for encrypted in [false, true] {
                let path = persist
                    .dir
                    .join(persistence::file_name(&stem, compress, encrypted));
                if path.exists() {
                    tokio::fs::remove_file(&path)
                        .await
                        .map_err(|e| Error::PersistFailed(e.into()))?;
                }
            }
        }
        Ok(())
    }

    async fn resolve_embedding(&self, doc: &Document) -> Result<Vec<f32>> {
        if !doc.embedding.is_empty() {
            return Ok(doc.embedding.clone());
        }
        let embedder = self.embedder.read().clone();
        let embedder = embedder.ok_or_else(|| {
            Error::EmbeddingFailed(anyhow::anyhow!("collection has no embedding function bound"))
        })?;
        embedder
            .embed(&doc.content)
            .await
            .map_err(Error::EmbeddingFailed)
    }

    /// Adds one document: resolves its embedding (without holding any
    /// lock), normalizes it, deep-copies metadata, then inserts under an
    /// exclusive write lock. Last writer wins on a duplicate id.
    #[instrument(skip(self, doc), fields(collection = %self.name))]
    pub async fn add_document(&self, doc: Document) -> Result<()> {
        let embedding = self.resolve_embedding(&doc).await?;
        let embedding = normalize_if_needed(&embedding);
        let stored = Document {
            id: doc.id,
            metadata: doc.metadata,
            embedding,
            content: doc.content,
        };

        self.documents.write().insert(stored.id.clone(), stored.clone());

        if let Err(e) = self.persist_document(&stored).await {
            warn!(collection = %self.name, id = %stored.id, error = %e, "document persisted in memory but not to disk");
            return Err(e);
        }
        Ok(())
    }

    /// Adds `docs` with up to `concurrency` concurrent `add_document`
    /// calls. The first worker to fail flips a shared cancellation flag;
    /// other pending workers observe it and return `Error::Cancelled`
    /// instead of starting their unit of work. Documents added before the
    /// cancellation point remain in the collection.
    #[instrument(skip(self, docs), fields(collection = %self.name))]
    pub async fn add_documents(self: &Arc<Self>, docs: Vec<Document>, concurrency: usize) -> Result<()> {
        let concurrency = Concurrency::parse(concurrency)?.get();
        observability::with_operation_context("add_documents", async {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let cancelled = Arc::new(AtomicBool::new(false));
            let mut tasks = JoinSet::new();

            for doc in docs {
                let semaphore = semaphore.clone();
                let cancelled = cancelled.clone();
                let this = self.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                    if cancelled.load(Ordering::Acquire) {
                        return Err(Error::Cancelled);
                    }
                    let result = this.add_document(doc).await;
                    if result.is_err() {
                        cancelled.store(true, Ordering::Release);
                    }
                    result
                });
            }

            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                let result = joined.map_err(|e| Error::PersistFailed(e.into()))?;
                if let Err(e) = result {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
        .await
    }

    /// Legacy row-form ingest: parallel arrays instead of `Document`
    /// values. Missing optional columns default to empty per row.
    #[instrument(skip(self, ids, embeddings, metadatas, contents), fields(collection = %self.name))]
    pub async fn add(
        self: &Arc<Self>,
        ids: Vec<String>,
        embeddings: Option<Vec<Vec<f32>>>,
        metadatas: Option<Vec<HashMap<String, String>>>,
        contents: Option<Vec<String>>,
        concurrency: usize,
    ) -> Result<()> {
        let n = ids.len();
        if let Some(e) = &embeddings {
            if e.len() != n {
                return Err(Error::invalid_argument("embeddings length does not match ids length"));
            }
        }
        if let Some(m) = &metadatas {
            if m.len() != n {
                return Err(Error::invalid_argument("metadatas length does not match ids length"));
            }
        }
        if let Some(c) = &contents {
            if c.len() != n {
                return Err(Error::invalid_argument("contents length does not match ids length"));
            }
        }

        let mut docs = Vec::with_capacity(n);
        for i in 0..n {
            let embedding = embeddings.as_ref().map(|e| e[i].clone()).unwrap_or_default();
            let metadata = metadatas.as_ref().map(|m| m[i].clone()).unwrap_or_default();
            let content = contents.as_ref().map(|c| c[i].clone()).unwrap_or_default();
            docs.push(Document::new(ids[i].clone(), metadata, embedding, content)?);
        }

        self.add_documents(docs, concurrency).await
    }

    pub fn get_by_id(&self, id: &str) -> Result<Document> {
        let id = DocumentId::parse(id)?;
        self.documents
            .read()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(id.into_inner()))
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    pub fn list_documents(&self) -> Vec<Document> {
        self.documents.read().values().cloned().collect()
    }

    pub fn list_documents_short(&self) -> Vec<Document> {
        self.documents
            .read()
            .values()
            .cloned()
            .map(Document::into_short)
            .collect()
    }

    #[instrument(skip_all, fields(collection = %self.name))]
    pub fn get_by_metadata(&self, r#where: &HashMap<String, String>) -> Result<Vec<Document>> {
        let guard = self.documents.read();
        let docs: Vec<Document> = guard.values().cloned().collect();
        drop(guard);
        let matches = filter::filter(&docs, r#where, &WhereDocument::all())?;
        Ok(matches.into_iter().cloned().collect())
    }

    /// Deletes documents by filter (if any filter argument is non-trivial)
    /// or, failing that, by the listed `ids`. At least one of `where`,
    /// `where_document`, `ids` must be non-empty.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn delete(
        &self,
        r#where: Option<&HashMap<String, String>>,
        where_document: Option<&WhereDocument>,
        ids: Option<&[String]>,
    ) -> Result<()> {
        observability::with_operation_context("delete", async {
            let has_where = r#where.is_some_and(|w| !w.is_empty());
            let has_where_document = where_document.is_some();
            let has_ids = ids.is_some_and(|i| !i.is_empty());

            if !has_where && !has_where_document && !has_ids {
                return Err(Error::invalid_argument(
                    "delete requires at least one of where, where_document, or ids",
                ));
            }

            let target_ids: Vec<String> = if has_where || has_where_document {
                let empty_where = HashMap::new();
                let where_clause = r#where.unwrap_or(&empty_where);
                let empty_tree = WhereDocument::all();
                let tree = where_document.unwrap_or(&empty_tree);
                let guard = self.documents.read();
                let docs: Vec<Document> = guard.values().cloned().collect();
                drop(guard);
                filter::filter(&docs, where_clause, tree)?
                    .into_iter()
                    .map(|d| d.id.clone())
                    .collect()
            } else {
                ids.unwrap_or(&[]).to_vec()
            };

            {
                let mut guard = self.documents.write();
                for id in &target_ids {
                    guard.remove(id);
                }
            }

            for id in &target_ids {
                self.remove_document_file(id).await?;
            }
            Ok(())
        })
        .await
    }

    /// Computes the query embedding via the bound embedder, then delegates
    /// to [`Collection::query_embedding`].
    #[instrument(skip(self, r#where, where_document), fields(collection = %self.name))]
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        r#where: &HashMap<String, String>,
        where_document: &WhereDocument,
    ) -> Result<Vec<QueryResult>> {
        observability::with_operation_context("query", async {
            if text.is_empty() {
                return Err(Error::invalid_argument("queryText is empty"));
            }
            let embedder = self.embedder.read().clone();
            let embedder = embedder.ok_or_else(|| {
                Error::EmbeddingFailed(anyhow::anyhow!("collection has no embedding function bound"))
            })?;
            let embedding = embedder.embed(text).await.map_err(Error::EmbeddingFailed)?;
            self.query_embedding(&embedding, k, r#where, where_document)
        })
        .await
    }

    /// Queries by an already-computed embedding: filter, rank, project.
    #[instrument(skip(self, v, r#where, where_document), fields(collection = %self.name))]
    pub fn query_embedding(
        &self,
        v: &[f32],
        k: usize,
        r#where: &HashMap<String, String>,
        where_document: &WhereDocument,
    ) -> Result<Vec<QueryResult>> {
        let mut opts = QueryOptions::new(k);
        opts.query_embedding = Some(v.to_vec());
        opts.r#where = r#where.clone();
        opts.where_document = where_document.clone();
        self.query_with_options_sync(&opts, None)
    }

    /// Full query pipeline with optional negative-query support. Holds a
    /// single read-lock critical section across filter, rank, and
    /// projection so the result reflects one consistent snapshot.
    #[instrument(skip_all, fields(collection = %self.name, k = opts.n_results))]
    pub async fn query_with_options(&self, opts: &QueryOptions) -> Result<Vec<QueryResult>> {
        observability::with_operation_context("query_with_options", async {
            let query_embedding = self.resolve_query_vector(opts).await?;
            let mut opts = opts.clone();
            opts.query_embedding = Some(query_embedding);

            let negative_embedding = match &opts.negative {
                Some(neg) => Some(normalize_if_needed(&self.resolve_negative_vector(neg).await?)),
                None => None,
            };
            self.query_with_options_sync(&opts, negative_embedding.as_deref())
        })
        .await
    }

    async fn resolve_negative_vector(&self, negative: &Negative) -> Result<Vec<f32>> {
        if let Some(embedding) = &negative.embedding {
            return Ok(embedding.clone());
        }
        let text = negative
            .text
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("negative query requires text or embedding"))?;
        let embedder = self.embedder.read().clone();
        let embedder = embedder.ok_or_else(|| {
            Error::EmbeddingFailed(anyhow::anyhow!("collection has no embedding function bound"))
        })?;
        embedder.embed(text).await.map_err(Error::EmbeddingFailed)
    }

    async fn resolve_query_vector(&self, opts: &QueryOptions) -> Result<Vec<f32>> {
        if let Some(embedding) = &opts.query_embedding {
            return Ok(embedding.clone());
        }
        let text = opts
            .query_text
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("queryText is empty"))?;
        if text.is_empty() {
            return Err(Error::invalid_argument("queryText is empty"));
        }
        let embedder = self.embedder.read().clone();
        let embedder = embedder.ok_or_else(|| {
            Error::EmbeddingFailed(anyhow::anyhow!("collection has no embedding function bound"))
        })?;
        embedder.embed(text).await.map_err(Error::EmbeddingFailed)
    }

    fn query_with_options_sync(
        &self,
        opts: &QueryOptions,
        resolved_negative: Option<&[f32]>,
    ) -> Result<Vec<QueryResult>> {
        opts.where_document.validate()?;
        let guard = self.documents.read();
        ResultCount::parse(opts.n_results, guard.len())?;

        let docs: Vec<Document> = guard.values().cloned().collect();
        drop(guard);

        let candidates = filter::filter(&docs, &opts.r#where, &opts.where_document)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let raw_query = opts
            .query_embedding
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("queryText is empty"))?;
        let mut effective_query = normalize_if_needed(raw_query);

        let mut filter_negative = None;
        if let (Some(neg_vec), Some(neg_opts)) = (resolved_negative, &opts.negative) {
            match neg_opts.mode {
                NegativeMode::Subtract => {
                    let diff = vector::subtract(&effective_query, neg_vec)?;
                    effective_query = normalize_if_needed(&diff);
                }
                NegativeMode::Filter => {
                    filter_negative = Some(FilterNegative {
                        embedding: neg_vec,
                        threshold: neg_opts.filter_threshold,
                    });
                }
            }
        }

        let effective_k = opts.n_results.min(candidates.len());
        let scored = ranking::top_k(&candidates, &effective_query, filter_negative, effective_k)?;

        Ok(scored
            .into_iter()
            .map(|s| QueryResult {
                document: s.document.clone(),
                score: s.score,
            })
            .collect())
    }

    pub(crate) fn persist_dir(&self) -> Option<&Path> {
        self.persist.as_ref().map(|p| p.dir.as_path())
    }
}
