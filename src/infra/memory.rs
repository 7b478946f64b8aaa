//! In-process adapters for every repository port.
//!
//! Each store can be told to fail so error paths are reachable from tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use time::OffsetDateTime;
use tokio::{sync::RwLock, time::Instant};

use crate::{
    application::repos::{
        BlobStore, BlobStoreError, ByteStream, ContentRepo, LeaseStore, PointerStore, RepoError,
    },
    domain::{
        artifact::{ArtifactId, ArtifactMeta},
        content::ContentItem,
    },
};

/// Content catalog held in a vector, applying the same visibility filter as the database.
#[derive(Default)]
pub struct MemoryContentRepo {
    items: RwLock<Vec<ContentItem>>,
    memberships: HashMap<String, BTreeSet<String>>,
    failing_types: RwLock<BTreeSet<String>>,
}

impl MemoryContentRepo {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items: RwLock::new(items),
            ..Self::default()
        }
    }

    /// Mark `id` as belonging to the site carrying `membership`.
    pub fn with_membership(mut self, id: &str, membership: &str) -> Self {
        self.memberships
            .entry(id.to_string())
            .or_default()
            .insert(membership.to_string());
        self
    }

    pub async fn insert(&self, item: ContentItem) {
        self.items.write().await.push(item);
    }

    /// Make every query touching `content_type` fail.
    pub async fn fail_content_type(&self, content_type: &str) {
        self.failing_types
            .write()
            .await
            .insert(content_type.to_string());
    }

    fn is_member(&self, item: &ContentItem, membership: Option<&str>) -> bool {
        match membership {
            None => true,
            Some(flag) => self
                .memberships
                .get(&item.id)
                .is_some_and(|sites| sites.contains(flag)),
        }
    }

    async fn check_types<'a>(
        &self,
        types: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), RepoError> {
        let failing = self.failing_types.read().await;
        for content_type in types {
            if failing.contains(content_type) {
                return Err(RepoError::from_persistence(format!(
                    "simulated failure for content type `{content_type}`"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentRepo for MemoryContentRepo {
    async fn find_by_types(
        &self,
        content_types: &[String],
        membership: Option<&str>,
    ) -> Result<Vec<ContentItem>, RepoError> {
        self.check_types(content_types.iter().map(String::as_str))
            .await?;

        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|item| item.is_visible())
            .filter(|item| content_types.contains(&item.content_type))
            .filter(|item| self.is_member(item, membership))
            .cloned()
            .collect())
    }

    async fn find_by_slug(
        &self,
        locale: &str,
        slug: &str,
    ) -> Result<Option<ContentItem>, RepoError> {
        let items = self.items.read().await;
        let found = items
            .iter()
            .filter(|item| item.is_visible())
            .find(|item| item.slug(locale) == Some(slug))
            .cloned();
        if let Some(item) = &found {
            self.check_types([item.content_type.as_str()]).await?;
        }
        Ok(found)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, RepoError> {
        let items = self.items.read().await;
        let found: Vec<ContentItem> = items
            .iter()
            .filter(|item| item.is_visible())
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect();
        self.check_types(found.iter().map(|item| item.content_type.as_str()))
            .await?;
        Ok(found)
    }
}

struct StoredBlob {
    meta: ArtifactMeta,
    body: Bytes,
}

/// Blob store keeping artifacts in a map.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<ArtifactId, StoredBlob>>,
    fail_writes: AtomicBool,
    fail_removals: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, enabled: bool) {
        self.fail_removals.store(enabled, Ordering::SeqCst);
    }

    pub async fn contains(&self, id: ArtifactId) -> bool {
        self.blobs.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write_stream(
        &self,
        filename: &str,
        mut body: ByteStream,
    ) -> Result<ArtifactId, BlobStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        if buffer.is_empty() {
            return Err(BlobStoreError::EmptyPayload);
        }

        let id = ArtifactId::new();
        let body = buffer.freeze();
        let meta = ArtifactMeta {
            id,
            filename: filename.to_string(),
            size_bytes: body.len() as u64,
            created_at: OffsetDateTime::now_utc(),
        };
        self.blobs.write().await.insert(id, StoredBlob { meta, body });
        Ok(id)
    }

    async fn remove(&self, id: ArtifactId) -> Result<(), BlobStoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Unavailable(
                "simulated removal failure".to_string(),
            ));
        }
        self.blobs.write().await.remove(&id);
        Ok(())
    }

    async fn list_metadata(&self, filename: &str) -> Result<Vec<ArtifactMeta>, BlobStoreError> {
        let blobs = self.blobs.read().await;
        let mut metas: Vec<ArtifactMeta> = blobs
            .values()
            .filter(|blob| blob.meta.filename == filename)
            .map(|blob| blob.meta.clone())
            .collect();
        metas.sort_by_key(|meta| meta.created_at);
        Ok(metas)
    }

    async fn read_stream(&self, id: ArtifactId) -> Result<ByteStream, BlobStoreError> {
        let body = self
            .blobs
            .read()
            .await
            .get(&id)
            .map(|blob| blob.body.clone())
            .ok_or(BlobStoreError::NotFound(id))?;
        Ok(Box::pin(stream::once(async move { Ok::<_, BlobStoreError>(body) })))
    }
}

/// Pointer store with per-key expiry measured on the tokio clock.
#[derive(Default)]
pub struct MemoryPointerStore {
    entries: RwLock<HashMap<String, (ArtifactId, Instant)>>,
    fail_reads: AtomicBool,
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointerStore for MemoryPointerStore {
    async fn set(&self, key: &str, value: ArtifactId, ttl: Duration) -> Result<(), RepoError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ArtifactId>, RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(id, _)| *id))
    }
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// Lease store shared by every coordinator holding the same `Arc`.
#[derive(Default)]
pub struct MemoryLeaseStore {
    leases: RwLock<HashMap<String, Lease>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `key`, if the lease is live.
    pub async fn holder(&self, key: &str) -> Option<String> {
        self.leases
            .read()
            .await
            .get(key)
            .filter(|lease| lease.expires_at > Instant::now())
            .map(|lease| lease.owner.clone())
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, RepoError> {
        let now = Instant::now();
        let mut leases = self.leases.write().await;
        if leases.get(key).is_some_and(|current| current.expires_at > now) {
            return Ok(false);
        }
        leases.insert(
            key.to_string(),
            Lease {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), RepoError> {
        let mut leases = self.leases.write().await;
        if leases.get(key).is_some_and(|lease| lease.owner == owner) {
            leases.remove(key);
        }
        Ok(())
    }
}
