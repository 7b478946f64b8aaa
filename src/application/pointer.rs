//! Current-artifact pointer per site context.
//!
//! The pointer is the only thing the serving path reads to decide which
//! artifact is live. It is written after a successful upload and expires
//! on its own when rebuilds stop.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::domain::{artifact::ArtifactId, site::SiteContext};

use super::repos::{PointerStore, RepoError};

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("no current artifact for site `{0}`")]
    NotFound(SiteContext),
    #[error(transparent)]
    Store(#[from] RepoError),
}

#[derive(Clone)]
pub struct CurrentArtifactCache {
    store: Arc<dyn PointerStore>,
    ttl: Duration,
}

impl CurrentArtifactCache {
    pub fn new(store: Arc<dyn PointerStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key under which the pointer for `site` is stored.
    pub fn key(site: &SiteContext) -> String {
        format!("sitemap:{site}")
    }

    pub async fn get(&self, site: &SiteContext) -> Result<ArtifactId, PointerError> {
        self.store
            .get(&Self::key(site))
            .await?
            .ok_or_else(|| PointerError::NotFound(site.clone()))
    }

    pub async fn set(&self, site: &SiteContext, id: ArtifactId) -> Result<(), PointerError> {
        self.store.set(&Self::key(site), id, self.ttl).await?;
        Ok(())
    }
}
