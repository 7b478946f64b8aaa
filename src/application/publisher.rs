//! Artifact publication.
//!
//! Order is fixed: the blob write must succeed before the pointer moves, and
//! superseded artifacts are only collected once the pointer names the new one.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{
    artifact::{ArtifactId, artifact_file_name},
    site::SiteContext,
};

use super::{
    pointer::{CurrentArtifactCache, PointerError},
    repos::{BlobStore, BlobStoreError},
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to write artifact `{filename}`: {source}")]
    Write {
        filename: String,
        #[source]
        source: BlobStoreError,
    },
    #[error("artifact `{artifact_id}` written but pointer update failed: {source}")]
    Pointer {
        artifact_id: ArtifactId,
        #[source]
        source: PointerError,
    },
}

/// What one successful publication did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub artifact_id: ArtifactId,
    pub filename: String,
    pub bytes: usize,
    /// Superseded artifacts that were deleted.
    pub removed: Vec<ArtifactId>,
    /// Superseded artifacts that could not be deleted or listed.
    pub gc_failures: usize,
}

#[derive(Clone)]
pub struct ArtifactPublisher {
    blobs: Arc<dyn BlobStore>,
    pointer: CurrentArtifactCache,
}

impl ArtifactPublisher {
    pub fn new(blobs: Arc<dyn BlobStore>, pointer: CurrentArtifactCache) -> Self {
        Self { blobs, pointer }
    }

    pub async fn publish(
        &self,
        site: &SiteContext,
        document: String,
    ) -> Result<PublishReport, PublishError> {
        let filename = artifact_file_name(site);
        let bytes = document.len();

        let artifact_id = self
            .blobs
            .write(&filename, Bytes::from(document))
            .await
            .map_err(|source| PublishError::Write {
                filename: filename.clone(),
                source,
            })?;

        self.pointer
            .set(site, artifact_id)
            .await
            .map_err(|source| PublishError::Pointer {
                artifact_id,
                source,
            })?;

        info!(
            target = "sitemapd::publisher",
            site = %site,
            artifact_id = %artifact_id,
            bytes,
            "sitemap artifact published"
        );

        let (removed, gc_failures) = self.collect_superseded(site, &filename, artifact_id).await;

        Ok(PublishReport {
            artifact_id,
            filename,
            bytes,
            removed,
            gc_failures,
        })
    }

    /// Best-effort removal of every artifact under `filename` except `current`.
    async fn collect_superseded(
        &self,
        site: &SiteContext,
        filename: &str,
        current: ArtifactId,
    ) -> (Vec<ArtifactId>, usize) {
        let stale = match self.blobs.list_metadata(filename).await {
            Ok(metas) => metas,
            Err(err) => {
                counter!("sitemapd_gc_failure_total").increment(1);
                warn!(
                    target = "sitemapd::publisher",
                    site = %site,
                    error = %err,
                    "failed to list superseded artifacts"
                );
                return (Vec::new(), 1);
            }
        };

        let mut removed = Vec::new();
        let mut failures = 0;
        for meta in stale.into_iter().filter(|meta| meta.id != current) {
            match self.blobs.remove(meta.id).await {
                Ok(()) => removed.push(meta.id),
                Err(err) => {
                    failures += 1;
                    counter!("sitemapd_gc_failure_total").increment(1);
                    warn!(
                        target = "sitemapd::publisher",
                        site = %site,
                        artifact_id = %meta.id,
                        error = %err,
                        "failed to remove superseded artifact"
                    );
                }
            }
        }

        (removed, failures)
    }
}
