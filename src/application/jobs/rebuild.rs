//! Cron-triggered sitemap rebuild, one worker per site.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::Schedule;
use chrono::{DateTime, Utc};

use crate::application::coordinator::RebuildOutcome;

use super::context::{SitemapJobContext, job_failed};

/// Tick emitted by the cron stream.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Debug, Clone)]
pub struct RebuildSitemapJob {
    pub fired_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for RebuildSitemapJob {
    fn from(fired_at: DateTime<Utc>) -> Self {
        Self { fired_at }
    }
}

impl Default for RebuildSitemapJob {
    fn default() -> Self {
        Self {
            fired_at: Utc::now(),
        }
    }
}

/// Run one coordinated rebuild for the worker's site.
///
/// A held lease is a normal skip. A failed publication is reported back to the
/// monitor so it shows up as a failed job.
pub async fn process_rebuild_sitemap_job(
    job: RebuildSitemapJob,
    ctx: Data<SitemapJobContext>,
) -> Result<(), Error> {
    tracing::debug!(
        target = "sitemapd::jobs::rebuild",
        site = %ctx.profile.context,
        fired_at = %job.fired_at,
        "rebuild trigger fired"
    );

    match ctx.coordinator.rebuild(&ctx.profile).await {
        Ok(RebuildOutcome::Published(_)) | Ok(RebuildOutcome::Skipped) => Ok(()),
        Err(err) => Err(job_failed(err)),
    }
}

/// Parse a site's cron expression (seconds field included, e.g. `0 0 3 * * *`).
pub fn rebuild_schedule(expression: &str) -> Result<Schedule, String> {
    Schedule::from_str(expression).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        application::{
            aggregator::CatalogAggregator, coordinator::RebuildCoordinator,
            pointer::CurrentArtifactCache, publisher::ArtifactPublisher,
        },
        domain::site::{SectionPlan, SiteContext, SiteProfile},
        infra::memory::{MemoryBlobStore, MemoryContentRepo, MemoryLeaseStore, MemoryPointerStore},
    };

    fn context(blobs: Arc<MemoryBlobStore>) -> SitemapJobContext {
        let pointer = CurrentArtifactCache::new(
            Arc::new(MemoryPointerStore::new()),
            Duration::from_secs(60),
        );
        SitemapJobContext {
            coordinator: RebuildCoordinator::new(
                Arc::new(MemoryLeaseStore::new()),
                CatalogAggregator::new(Arc::new(MemoryContentRepo::new(Vec::new()))),
                ArtifactPublisher::new(blobs, pointer),
                "test",
                Duration::from_secs(60),
            ),
            profile: Arc::new(SiteProfile {
                context: SiteContext::parse("am").expect("valid context"),
                base_url: "https://am.example.org".to_string(),
                locales: vec!["nl".to_string()],
                membership: None,
                schedule: "0 0 3 * * *".to_string(),
                sections: SectionPlan {
                    main_pages: Vec::new(),
                    landing_pages: Vec::new(),
                    collections: Vec::new(),
                    nested: Vec::new(),
                },
            }),
        }
    }

    #[test]
    fn schedule_parses_correctly() {
        let schedule = rebuild_schedule("0 0 3 * * *").expect("valid expression");
        let upcoming: Vec<_> = schedule.upcoming(Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        assert!(rebuild_schedule("every night").is_err());
    }

    #[tokio::test]
    async fn job_publishes_an_artifact() {
        let blobs = Arc::new(MemoryBlobStore::new());

        process_rebuild_sitemap_job(RebuildSitemapJob::default(), Data::new(context(blobs.clone())))
            .await
            .expect("job succeeds");

        assert_eq!(blobs.len().await, 1);
    }

    #[tokio::test]
    async fn failed_publication_fails_the_job() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.fail_writes(true);

        let result =
            process_rebuild_sitemap_job(RebuildSitemapJob::default(), Data::new(context(blobs)))
                .await;

        assert!(result.is_err());
    }
}
