//! Lease-guarded rebuild of one site's sitemap.
//!
//! A rebuild only starts once the fleet-wide lease for its site is taken, and
//! the lease is released on every exit path once it has been taken.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::site::{SiteContext, SiteProfile, SiteRegistry};

use super::{
    aggregator::CatalogAggregator,
    publisher::{ArtifactPublisher, PublishError, PublishReport},
    repos::{LeaseStore, RepoError},
    sitemap::render_sitemap,
};

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("failed to acquire rebuild lease `{key}`: {source}")]
    Lease {
        key: String,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Result of one rebuild attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Published(RebuildSummary),
    /// Another holder owns the lease; nothing was built.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub entries: usize,
    pub failed_branches: Vec<String>,
    pub publish: PublishReport,
}

#[derive(Clone)]
pub struct RebuildCoordinator {
    leases: Arc<dyn LeaseStore>,
    aggregator: CatalogAggregator,
    publisher: ArtifactPublisher,
    owner: String,
    lease_ttl: Duration,
}

impl RebuildCoordinator {
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        aggregator: CatalogAggregator,
        publisher: ArtifactPublisher,
        owner: impl Into<String>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            leases,
            aggregator,
            publisher,
            owner: owner.into(),
            lease_ttl,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Lease key guarding rebuilds of `site` across every instance.
    pub fn lease_key(site: &SiteContext) -> String {
        format!("sitemap-rebuild:{site}")
    }

    /// Token identifying one rebuild attempt by this instance. Every attempt
    /// holds its own token so overlapping attempts in one process exclude each other.
    fn lease_token(&self) -> String {
        format!("{}:{}", self.owner, Uuid::new_v4())
    }

    pub async fn rebuild(&self, site: &SiteProfile) -> Result<RebuildOutcome, RebuildError> {
        let key = Self::lease_key(&site.context);
        let token = self.lease_token();
        let acquired = self
            .leases
            .acquire(&key, &token, self.lease_ttl)
            .await
            .map_err(|source| RebuildError::Lease {
                key: key.clone(),
                source,
            })?;

        if !acquired {
            counter!("sitemapd_rebuild_total", "outcome" => "skipped").increment(1);
            info!(
                target = "sitemapd::coordinator",
                site = %site.context,
                lease = key.as_str(),
                "rebuild skipped; lease held elsewhere"
            );
            return Ok(RebuildOutcome::Skipped);
        }

        let started_at = Instant::now();
        let result = self.build_and_publish(site).await;
        histogram!("sitemapd_rebuild_duration_ms")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        if let Err(err) = self.leases.release(&key, &token).await {
            warn!(
                target = "sitemapd::coordinator",
                site = %site.context,
                lease = key.as_str(),
                error = %err,
                "failed to release rebuild lease; it will expire on its own"
            );
        }

        match &result {
            Ok(summary) => {
                counter!("sitemapd_rebuild_total", "outcome" => "published").increment(1);
                info!(
                    target = "sitemapd::coordinator",
                    site = %site.context,
                    artifact_id = %summary.publish.artifact_id,
                    entries = summary.entries,
                    failed_branches = summary.failed_branches.len(),
                    removed = summary.publish.removed.len(),
                    "sitemap rebuilt"
                );
            }
            Err(err) => {
                counter!("sitemapd_rebuild_total", "outcome" => "failed").increment(1);
                warn!(
                    target = "sitemapd::coordinator",
                    site = %site.context,
                    error = %err,
                    "sitemap rebuild failed; previous artifact stays current"
                );
            }
        }

        result.map(RebuildOutcome::Published)
    }

    /// Rebuild every registered site in turn. A failing site does not stop the others.
    pub async fn rebuild_all(
        &self,
        registry: &SiteRegistry,
    ) -> Vec<(SiteContext, Result<RebuildOutcome, RebuildError>)> {
        let mut outcomes = Vec::with_capacity(registry.len());
        for profile in registry.profiles() {
            let outcome = self.rebuild(profile).await;
            outcomes.push((profile.context.clone(), outcome));
        }
        outcomes
    }

    async fn build_and_publish(&self, site: &SiteProfile) -> Result<RebuildSummary, RebuildError> {
        let catalog = self
            .aggregator
            .collect(site, OffsetDateTime::now_utc())
            .await;
        let document = render_sitemap(&catalog.entries);
        let publish = self.publisher.publish(&site.context, document).await?;

        Ok(RebuildSummary {
            entries: catalog.entries.len(),
            failed_branches: catalog.failed_branches,
            publish,
        })
    }
}
