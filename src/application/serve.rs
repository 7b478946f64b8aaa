//! Read side: resolves the current artifact of a site and opens its byte stream.
//!
//! Serving never triggers a rebuild. When the pointer is missing the newest
//! stored artifact is used instead, without writing the pointer back.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    artifact::{ArtifactId, artifact_file_name},
    site::SiteContext,
};

use super::{
    pointer::{CurrentArtifactCache, PointerError},
    repos::{BlobStore, BlobStoreError, ByteStream, RepoError},
};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("sitemap for site `{0}` is not yet available")]
    NotYetAvailable(SiteContext),
    #[error("failed to read sitemap pointer: {0}")]
    Pointer(#[source] RepoError),
    #[error("failed to open sitemap artifact: {0}")]
    Blob(#[source] BlobStoreError),
}

/// An artifact ready to be streamed to a client.
pub struct OpenedSitemap {
    pub artifact_id: ArtifactId,
    pub body: ByteStream,
}

#[derive(Clone)]
pub struct SitemapReader {
    pointer: CurrentArtifactCache,
    blobs: Arc<dyn BlobStore>,
}

impl SitemapReader {
    pub fn new(pointer: CurrentArtifactCache, blobs: Arc<dyn BlobStore>) -> Self {
        Self { pointer, blobs }
    }

    pub async fn open(&self, site: &SiteContext) -> Result<OpenedSitemap, ServeError> {
        let artifact_id = self.resolve(site).await?;

        let body = self
            .blobs
            .read_stream(artifact_id)
            .await
            .map_err(|err| match err {
                BlobStoreError::NotFound(_) => ServeError::NotYetAvailable(site.clone()),
                other => ServeError::Blob(other),
            })?;

        Ok(OpenedSitemap { artifact_id, body })
    }

    async fn resolve(&self, site: &SiteContext) -> Result<ArtifactId, ServeError> {
        match self.pointer.get(site).await {
            Ok(id) => return Ok(id),
            Err(PointerError::NotFound(_)) => {}
            Err(PointerError::Store(err)) => return Err(ServeError::Pointer(err)),
        }

        debug!(
            target = "sitemapd::serve",
            site = %site,
            "pointer missing; falling back to newest stored artifact"
        );

        let metas = self
            .blobs
            .list_metadata(&artifact_file_name(site))
            .await
            .map_err(|err| {
                warn!(
                    target = "sitemapd::serve",
                    site = %site,
                    error = %err,
                    "failed to list artifacts for pointer fallback"
                );
                ServeError::Blob(err)
            })?;

        metas
            .into_iter()
            .max_by_key(|meta| meta.created_at)
            .map(|meta| meta.id)
            .ok_or_else(|| ServeError::NotYetAvailable(site.clone()))
    }
}
