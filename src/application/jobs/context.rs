use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::{application::coordinator::RebuildCoordinator, domain::site::SiteProfile};

/// Data handed to the cron worker of one site.
#[derive(Clone)]
pub struct SitemapJobContext {
    pub coordinator: RebuildCoordinator,
    pub profile: Arc<SiteProfile>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
