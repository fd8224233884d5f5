//! Document persistence.
//!
//! Every entity is read and written through a [`Collection`] keyed by its
//! id. The worker only sees the trait; [`MemoryCollection`] backs it in
//! tests and in the standalone binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rundown_core::ids::RundownId;
use rundown_core::ingest::{IngestRundown, SofieIngestRundown};
use rundown_core::models::instances::{PartInstance, PieceInstance};
use rundown_core::models::show_style::{ShowStyleBase, ShowStyleVariant};
use rundown_core::models::{Part, Piece, Rundown, RundownPlaylist, Segment, Studio, TimelineComplete};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document with a primary key.
pub trait Document: Clone + Send + Sync + 'static {
    fn doc_id(&self) -> String;
}

/// Filter used by [`Collection::find_where`].
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

#[async_trait]
pub trait Collection<T: Document>: Send + Sync {
    async fn find_one(&self, id: &str) -> StoreResult<Option<T>>;

    async fn find_where(&self, filter: Filter<'_, T>) -> StoreResult<Vec<T>>;

    async fn upsert(&self, doc: T) -> StoreResult<()>;

    /// Returns whether a document was removed.
    async fn remove(&self, id: &str) -> StoreResult<bool>;

    /// Returns the number of removed documents.
    async fn remove_where(&self, filter: Filter<'_, T>) -> StoreResult<usize>;

    async fn upsert_many(&self, docs: Vec<T>) -> StoreResult<()> {
        for doc in docs {
            self.upsert(doc).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Ordered by id, so `find_where` results are deterministic.
pub struct MemoryCollection<T> {
    docs: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Document> Collection<T> for MemoryCollection<T> {
    async fn find_one(&self, id: &str) -> StoreResult<Option<T>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn find_where(&self, filter: Filter<'_, T>) -> StoreResult<Vec<T>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|doc| filter(doc))
            .cloned()
            .collect())
    }

    async fn upsert(&self, doc: T) -> StoreResult<()> {
        self.docs.write().await.insert(doc.doc_id(), doc);
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        Ok(self.docs.write().await.remove(id).is_some())
    }

    async fn remove_where(&self, filter: Filter<'_, T>) -> StoreResult<usize> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|_, doc| !filter(doc));
        Ok(before - docs.len())
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

macro_rules! document_by_id {
    ($($ty:ty),* $(,)?) => {
        $(impl Document for $ty {
            fn doc_id(&self) -> String {
                self.id.to_string()
            }
        })*
    };
}

document_by_id!(
    Studio,
    ShowStyleBase,
    ShowStyleVariant,
    RundownPlaylist,
    Rundown,
    Segment,
    Part,
    Piece,
    PartInstance,
    PieceInstance,
);

/// One saved timeline per playlist.
impl Document for TimelineComplete {
    fn doc_id(&self) -> String {
        self.playlist_id.to_string()
    }
}

/// The two ingest trees of one rundown: the NRCS data as last received and
/// the reconciled working copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestCacheEntry {
    pub rundown_id: RundownId,
    pub nrcs: IngestRundown,
    pub sofie: SofieIngestRundown,
}

impl Document for IngestCacheEntry {
    fn doc_id(&self) -> String {
        self.rundown_id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// All collections the worker reads and writes.
#[derive(Clone)]
pub struct Store {
    pub studios: Arc<dyn Collection<Studio>>,
    pub show_style_bases: Arc<dyn Collection<ShowStyleBase>>,
    pub show_style_variants: Arc<dyn Collection<ShowStyleVariant>>,
    pub playlists: Arc<dyn Collection<RundownPlaylist>>,
    pub rundowns: Arc<dyn Collection<Rundown>>,
    pub segments: Arc<dyn Collection<Segment>>,
    pub parts: Arc<dyn Collection<Part>>,
    pub pieces: Arc<dyn Collection<Piece>>,
    pub part_instances: Arc<dyn Collection<PartInstance>>,
    pub piece_instances: Arc<dyn Collection<PieceInstance>>,
    pub timelines: Arc<dyn Collection<TimelineComplete>>,
    pub ingest_cache: Arc<dyn Collection<IngestCacheEntry>>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            studios: Arc::new(MemoryCollection::new()),
            show_style_bases: Arc::new(MemoryCollection::new()),
            show_style_variants: Arc::new(MemoryCollection::new()),
            playlists: Arc::new(MemoryCollection::new()),
            rundowns: Arc::new(MemoryCollection::new()),
            segments: Arc::new(MemoryCollection::new()),
            parts: Arc::new(MemoryCollection::new()),
            pieces: Arc::new(MemoryCollection::new()),
            part_instances: Arc::new(MemoryCollection::new()),
            piece_instances: Arc::new(MemoryCollection::new()),
            timelines: Arc::new(MemoryCollection::new()),
            ingest_cache: Arc::new(MemoryCollection::new()),
        }
    }
}
