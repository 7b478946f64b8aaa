mod context;
mod rebuild;

pub use context::{SitemapJobContext, job_failed};
pub use rebuild::{RebuildSitemapJob, process_rebuild_sitemap_job, rebuild_schedule};
