// Db - a keyed set of collections with an optional persistent root.
//
// The collection map is a `parking_lot::RwLock<HashMap<String, Arc<Collection>>>`:
// list/get take a read lock, create/delete/reset take a write lock. Handles
// returned by `get_collection` remain valid after the map entry they came
// from is replaced or removed; they simply stop being reachable through
// `Db` again.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{instrument, warn};

use parking_lot::RwLock;

use crate::collection::Collection;
use crate::document::Document;
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::observability;
use crate::persistence::{self, CollectionMetaFile, Snapshot, SnapshotCollection};
use crate::validation::{CollectionName, EncryptionKey};

/// An embeddable database: owns zero or more [`Collection`]s, optionally
/// mirrored to disk under `root`.
pub struct Db {
    root: Option<PathBuf>,
    compress: bool,
    encryption_key: Option<[u8; 32]>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Db {
    /// An in-memory-only database: nothing is ever written to disk.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            compress: false,
            encryption_key: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Opens (or creates) a persistent database rooted at `root`. If the
    /// root does not exist, it is created and the database starts empty.
    /// Otherwise every direct subdirectory is rehydrated as a collection;
    /// a corrupt or unreadable document file within it is skipped with a
    /// warning rather than aborting the whole open. Embedding functions
    /// are never persisted and are left unbound until a caller supplies
    /// one via `create_collection` or `get_collection`.
    ///
    /// `encryption_key` must be empty (no encryption) or exactly 32 bytes;
    /// any other length fails with `Error::InvalidArgument`.
    #[instrument(skip_all)]
    pub async fn open(root: impl AsRef<Path>, compress: bool, encryption_key: &[u8]) -> Result<Self> {
        let encryption_key = EncryptionKey::parse(encryption_key)?.as_bytes().copied();
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            tokio::fs::create_dir_all(&root)
                .await
                .map_err(|e| Error::PersistFailed(e.into()))?;
            return Ok(Self {
                root: Some(root),
                compress,
                encryption_key,
                collections: RwLock::new(HashMap::new()),
            });
        }

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await.map_err(|e| Error::PersistFailed(e.into()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::PersistFailed(e.into()))? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match Self::load_collection_dir(&path, compress, encryption_key.as_ref()).await {
                Ok(collection) => {
                    collections.insert(collection.name().to_string(), Arc::new(collection));
                }
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "skipping unreadable collection directory");
                }
            }
        }

        Ok(Self {
            root: Some(root),
            compress,
            encryption_key,
            collections: RwLock::new(collections),
        })
    }

    async fn load_collection_dir(
        dir: &Path,
        compress: bool,
        encryption_key: Option<&[u8; 32]>,
    ) -> Result<Collection> {
        let meta_path = Self::find_metadata_file(dir).await?;
        let file_name = meta_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::CorruptStorage("collection metadata file has no name".to_string()))?;
        let compressed = persistence::is_compressed(file_name);
        let encrypted = persistence::is_encrypted(file_name);
        let key = if encrypted { encryption_key } else { None };
        let bytes = tokio::fs::read(&meta_path).await.map_err(|e| Error::PersistFailed(e.into()))?;
        let meta: CollectionMetaFile = persistence::decode(bytes, compressed, key)?;

        let collection = Collection::new(
            meta.name,
            meta.metadata,
            None,
            Some(dir.to_path_buf()),
            compress,
            encryption_key.copied(),
        );
        collection.load_from_disk().await?;
        Ok(collection)
    }

    async fn find_metadata_file(dir: &Path) -> Result<PathBuf> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| Error::PersistFailed(e.into()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::PersistFailed(e.into()))? {
            let path = entry.path();
            if path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s == persistence::COLLECTION_METADATA_STEM)
            {
                return Ok(path);
            }
        }
        Err(Error::CorruptStorage(format!(
            "collection directory {} has no metadata file",
            dir.display()
        )))
    }

    fn collection_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(persistence::file_stem(name)))
    }

    async fn write_collection_metadata(&self, dir: &Path, name: &str, metadata: &HashMap<String, String>) -> Result<()> {
        let meta = CollectionMetaFile {
            name: name.to_string(),
            metadata: metadata.clone(),
        };
        let file_name = persistence::file_name(
            persistence::COLLECTION_METADATA_STEM,
            self.compress,
            self.encryption_key.is_some(),
        );
        let bytes = persistence::encode(&meta, self.compress, self.encryption_key.as_ref())?;
        tokio::fs::write(dir.join(file_name), bytes)
            .await
            .map_err(|e| Error::PersistFailed(e.into()))
    }

    /// Creates a collection named `name`. On a name collision, the
    /// previous `Arc<Collection>` handle stays valid for anyone still
    /// holding it, but `Db` now points at the new one (replace semantics).
    #[instrument(skip_all)]
    pub async fn create_collection(
        &self,
        name: impl Into<String>,
        metadata: HashMap<String, String>,
        embed: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Arc<Collection>> {
        let name = CollectionName::parse(name)?.into_inner();

        observability::with_operation_context("create_collection", async {
            let persist_dir = self.collection_dir(&name);
            if let Some(dir) = &persist_dir {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::PersistFailed(e.into()))?;
                self.write_collection_metadata(dir, &name, &metadata).await?;
            }

            let collection = Arc::new(Collection::new(
                name.clone(),
                metadata,
                embed,
                persist_dir,
                self.compress,
                self.encryption_key,
            ));
            self.collections.write().insert(name, collection.clone());
            Ok(collection)
        })
        .await
    }

    /// Returns the live collection, or `None` if absent. If `embed` is
    /// supplied, it replaces the collection's bound embedding function.
    #[instrument(skip(self, embed))]
    pub fn get_collection(
        &self,
        name: &str,
        embed: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Option<Arc<Collection>> {
        let collection = self.collections.read().get(name).cloned()?;
        if let Some(embed) = embed {
            collection.set_embedder(embed);
        }
        Some(collection)
    }

    #[instrument(skip_all)]
    pub async fn get_or_create_collection(
        &self,
        name: impl Into<String>,
        metadata: HashMap<String, String>,
        embed: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Arc<Collection>> {
        let name = name.into();
        if let Some(existing) = self.get_collection(&name, embed.clone()) {
            return Ok(existing);
        }
        self.create_collection(name, metadata, embed).await
    }

    /// A shallow copy of the name -> collection mapping; collections
    /// themselves are live references.
    pub fn list_collections(&self) -> HashMap<String, Arc<Collection>> {
        self.collections.read().clone()
    }

    /// Removes a collection and, if persistent, its mirror directory.
    #[instrument(skip(self))]
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        observability::with_operation_context("delete_collection", async {
            let removed = self.collections.write().remove(name);
            if removed.is_none() {
                return Ok(());
            }
            if let Some(dir) = self.collection_dir(name) {
                if dir.exists() {
                    tokio::fs::remove_dir_all(&dir)
                        .await
                        .map_err(|e| Error::PersistFailed(e.into()))?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Deletes every collection, and if persistent, every mirror
    /// directory. The root directory itself is preserved.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        observability::with_operation_context("reset", async {
            let names: Vec<String> = self.collections.read().keys().cloned().collect();
            for name in names {
                self.delete_collection(&name).await?;
            }
            Ok(())
        })
        .await
    }

    /// Serializes the whole database (or just `names`, if given) to
    /// `writer` in the snapshot envelope format.
    ///
    /// `encryption_key` must be empty (no encryption) or exactly 32 bytes;
    /// any other length fails with `Error::InvalidArgument`.
    #[instrument(skip(self, writer, names))]
    pub fn export_to_writer<W: Write>(
        &self,
        writer: &mut W,
        compress: bool,
        encryption_key: &[u8],
        names: Option<&[String]>,
    ) -> Result<()> {
        let encryption_key = EncryptionKey::parse(encryption_key)?;
        let guard = self.collections.read();
        let selected: Vec<&Arc<Collection>> = match names {
            Some(names) => names.iter().filter_map(|n| guard.get(n)).collect(),
            None => guard.values().collect(),
        };

        let collections = selected
            .into_iter()
            .map(|c| SnapshotCollection {
                name: c.name().to_string(),
                metadata: c.metadata().clone(),
                documents: c.list_documents(),
            })
            .collect();
        drop(guard);

        let snapshot = Snapshot { collections };
        let bytes = persistence::encode(&snapshot, compress, encryption_key.as_bytes())?;
        writer.write_all(&bytes).map_err(|e| Error::PersistFailed(e.into()))
    }

    /// Deserializes a snapshot envelope from `reader` and inserts each
    /// collection's documents, replacing any existing collection of the
    /// same name. If the database is persistent, every imported document
    /// is mirrored to disk.
    ///
    /// `encryption_key` must be empty (no encryption) or exactly 32 bytes;
    /// any other length fails with `Error::InvalidArgument`.
    #[instrument(skip_all)]
    pub async fn import_from_reader<R: Read>(&self, reader: &mut R, encryption_key: &[u8]) -> Result<()> {
        let encryption_key = EncryptionKey::parse(encryption_key)?;
        observability::with_operation_context("import_from_reader", async {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| Error::PersistFailed(e.into()))?;

            let snapshot: Snapshot = persistence::decode_sniffed(bytes, encryption_key.as_bytes())?;

            for snap_collection in snapshot.collections {
                let collection = self
                    .create_collection(snap_collection.name, snap_collection.metadata, None)
                    .await?;
                for doc in snap_collection.documents {
                    collection.add_document(doc).await?;
                }
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_db_starts_empty() {
        let db = Db::in_memory();
        assert!(db.list_collections().is_empty());
    }

    #[tokio::test]
    async fn create_and_get_collection() {
        let db = Db::in_memory();
        db.create_collection("docs", HashMap::new(), None).await.unwrap();
        assert!(db.get_collection("docs", None).is_some());
        assert!(db.get_collection("missing", None).is_none());
    }

    #[tokio::test]
    async fn create_collection_rejects_empty_name() {
        let db = Db::in_memory();
        let err = db.create_collection("", HashMap::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn create_collection_replaces_on_name_collision() {
        let db = Db::in_memory();
        let first = db.create_collection("docs", HashMap::new(), None).await.unwrap();
        let second = db.create_collection("docs", HashMap::new(), None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&db.get_collection("docs", None).unwrap(), &second));
    }

    #[tokio::test]
    async fn get_or_create_collection_creates_when_absent() {
        let db = Db::in_memory();
        let created = db.get_or_create_collection("docs", HashMap::new(), None).await.unwrap();
        let fetched = db.get_or_create_collection("docs", HashMap::new(), None).await.unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
    }

    #[tokio::test]
    async fn delete_collection_is_idempotent() {
        let db = Db::in_memory();
        db.create_collection("docs", HashMap::new(), None).await.unwrap();
        db.delete_collection("docs").await.unwrap();
        db.delete_collection("docs").await.unwrap();
        assert!(db.get_collection("docs", None).is_none());
    }

    #[tokio::test]
    async fn reset_removes_every_collection() {
        let db = Db::in_memory();
        db.create_collection("a", HashMap::new(), None).await.unwrap();
        db.create_collection("b", HashMap::new(), None).await.unwrap();
        db.reset().await.unwrap();
        assert!(db.list_collections().is_empty());
    }

    #[tokio::test]
    async fn persistent_db_mirrors_collections_on_disk() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path(), false, &[]).await.unwrap();
        let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
        collection
            .add_document(Document::new("1", HashMap::new(), vec![1.0, 0.0], "hello").unwrap())
            .await
            .unwrap();

        let stem = persistence::file_stem("docs");
        assert!(dir.path().join(&stem).is_dir());
        let meta_file = dir.path().join(&stem).join(
            persistence::file_name(persistence::COLLECTION_METADATA_STEM, false, false),
        );
        assert!(meta_file.exists());
    }

    #[tokio::test]
    async fn reopening_persistent_db_rehydrates_documents() {
        let dir = tempdir().unwrap();
        {
            let db = Db::open(dir.path(), false, &[]).await.unwrap();
            let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
            collection
                .add_document(Document::new("1", HashMap::new(), vec![1.0, 0.0], "hello").unwrap())
                .await
                .unwrap();
        }

        let reopened = Db::open(dir.path(), false, &[]).await.unwrap();
        let collection = reopened.get_collection("docs", None).unwrap();
        assert_eq!(collection.count(), 1);
        assert!(collection.get_by_id("1").is_ok());
    }

    #[tokio::test]
    async fn delete_collection_removes_mirror_directory() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path(), false, &[]).await.unwrap();
        db.create_collection("docs", HashMap::new(), None).await.unwrap();
        let stem = persistence::file_stem("docs");
        assert!(dir.path().join(&stem).exists());

        db.delete_collection("docs").await.unwrap();
        assert!(!dir.path().join(&stem).exists());
    }

    #[tokio::test]
    async fn export_then_import_round_trips_documents() {
        let source = Db::in_memory();
        let collection = source.create_collection("docs", HashMap::new(), None).await.unwrap();
        collection
            .add_document(Document::new("1", HashMap::new(), vec![1.0, 0.0], "hello").unwrap())
            .await
            .unwrap();

        let mut buffer = Vec::new();
        source.export_to_writer(&mut buffer, false, &[], None).unwrap();

        let target = Db::in_memory();
        let mut reader = std::io::Cursor::new(buffer);
        target.import_from_reader(&mut reader, &[]).await.unwrap();

        let imported = target.get_collection("docs", None).unwrap();
        assert_eq!(imported.count(), 1);
        assert!(imported.get_by_id("1").is_ok());
    }
}
