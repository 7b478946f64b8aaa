//! Repository traits describing the external collaborators of the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use thiserror::Error;

use crate::domain::{
    artifact::{ArtifactId, ArtifactMeta},
    content::ContentItem,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Errors raised by blob storage backends.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("artifact `{0}` not found")]
    NotFound(ArtifactId),
    #[error("invalid blob name `{0}`")]
    InvalidName(String),
    #[error("artifact payload is empty")]
    EmptyPayload,
    #[error("artifact size exceeds supported range")]
    SizeOverflow,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Chunked artifact body.
pub type ByteStream = BoxStream<'static, Result<Bytes, BlobStoreError>>;

/// Read-only queries over the content catalog.
///
/// Every query applies the base filter (`published = true`, `deleted = false`);
/// implementations must never return unpublished or soft-deleted items.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Items of any of `content_types`, optionally restricted to a site membership flag.
    async fn find_by_types(
        &self,
        content_types: &[String],
        membership: Option<&str>,
    ) -> Result<Vec<ContentItem>, RepoError>;

    /// The item whose slug for `locale` equals `slug`.
    async fn find_by_slug(&self, locale: &str, slug: &str)
    -> Result<Option<ContentItem>, RepoError>;

    /// Items with the given identifiers; unknown ids are ignored.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, RepoError>;
}

/// Durable storage for rendered artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a new blob under `filename`; the returned id is only handed out
    /// once the body is durable.
    async fn write_stream(
        &self,
        filename: &str,
        body: ByteStream,
    ) -> Result<ArtifactId, BlobStoreError>;

    /// Persist a fully-buffered body.
    async fn write(&self, filename: &str, body: Bytes) -> Result<ArtifactId, BlobStoreError> {
        let stream: ByteStream =
            Box::pin(stream::once(async move { Ok::<_, BlobStoreError>(body) }));
        self.write_stream(filename, stream).await
    }

    /// Remove a blob. Missing blobs are treated as success.
    async fn remove(&self, id: ArtifactId) -> Result<(), BlobStoreError>;

    /// Metadata of every blob stored under `filename`.
    async fn list_metadata(&self, filename: &str) -> Result<Vec<ArtifactMeta>, BlobStoreError>;

    async fn read_stream(&self, id: ArtifactId) -> Result<ByteStream, BlobStoreError>;
}

/// Key-value store backing the current-artifact pointer.
#[async_trait]
pub trait PointerStore: Send + Sync {
    /// Overwrite `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: ArtifactId, ttl: Duration) -> Result<(), RepoError>;

    /// The stored value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<ArtifactId>, RepoError>;
}

/// Fleet-wide, expiring mutual-exclusion tokens.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease for `owner`. Returns `false` while another holder's lease is live;
    /// an expired lease is reclaimed.
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, RepoError>;

    /// Release the lease if `owner` still holds it.
    async fn release(&self, key: &str, owner: &str) -> Result<(), RepoError>;
}
