//! Catalog aggregation: fans the entry builder out across a site's sections.
//!
//! Each section is an independent branch; a failing query drops that branch's
//! entries and nothing else, so a (possibly incomplete) sitemap is always produced.

use std::sync::Arc;

use futures::FutureExt;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::domain::{
    content::ContentItem,
    entry::UrlEntry,
    site::{CollectionSection, NestedSection, SiteProfile, SlugPage},
};

use super::{
    entries::EntryBuilder,
    repos::{ContentRepo, RepoError},
    settle::{Branch, settle, settle_values},
};

/// Result of aggregating one site's catalog.
#[derive(Debug)]
pub struct Catalog {
    pub entries: Vec<UrlEntry>,
    /// Top-level branches whose entries are missing from `entries`.
    pub failed_branches: Vec<String>,
}

#[derive(Clone)]
pub struct CatalogAggregator {
    content: Arc<dyn ContentRepo>,
}

impl CatalogAggregator {
    pub fn new(content: Arc<dyn ContentRepo>) -> Self {
        Self { content }
    }

    /// Collect every entry of `site`, stamping literal pages with `now`.
    pub async fn collect(&self, site: &SiteProfile, now: OffsetDateTime) -> Catalog {
        let builder = EntryBuilder::new(&site.base_url, &site.locales);
        let membership = site.membership.as_deref();

        let mut branches: Vec<Branch<'_, UrlEntry, RepoError>> = Vec::new();
        branches.push(Branch::new(
            "main-pages",
            self.main_pages(builder, &site.sections.main_pages, &site.sections.landing_pages, now)
                .boxed(),
        ));
        for section in &site.sections.collections {
            branches.push(Branch::new(
                format!("collection:{}", section.name),
                self.collection(builder, section, membership).boxed(),
            ));
        }
        for section in &site.sections.nested {
            branches.push(Branch::new(
                format!("nested:{}", section.name),
                self.nested(builder, section, membership).boxed(),
            ));
        }

        let settled = settle(branches).await;
        settled.log_failures(site.context.as_str());
        let failed_branches = settled
            .failed_branches()
            .into_iter()
            .map(str::to_string)
            .collect();

        info!(
            target = "sitemapd::aggregator",
            site = %site.context,
            entries = settled.values.len(),
            failed = settled.failures.len(),
            "catalog aggregated"
        );

        Catalog {
            entries: settled.values,
            failed_branches,
        }
    }

    /// Home, overview and contact pages resolved by slug, followed by literal
    /// landing pages. Each slug lookup settles on its own.
    async fn main_pages(
        &self,
        builder: EntryBuilder<'_>,
        pages: &[SlugPage],
        landing_pages: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<UrlEntry>, RepoError> {
        let mut lookups: Vec<Branch<'_, UrlEntry, RepoError>> = Vec::new();
        for page in pages {
            for locale in builder.locales() {
                lookups.push(Branch::new(
                    format!("page:{}:{locale}", page.slug),
                    self.slug_page(builder, page, locale).boxed(),
                ));
            }
        }

        let mut entries = settle_values("main-pages", lookups).await;
        for path in landing_pages {
            entries.extend(builder.custom(path, now));
        }
        Ok(entries)
    }

    async fn slug_page(
        &self,
        builder: EntryBuilder<'_>,
        page: &SlugPage,
        locale: &str,
    ) -> Result<Vec<UrlEntry>, RepoError> {
        let item = self.content.find_by_slug(locale, &page.slug).await?;
        match item {
            Some(item) => Ok(builder.for_item_at_paths(&item, locale, &page.paths)),
            None => {
                debug!(
                    target = "sitemapd::aggregator",
                    slug = page.slug.as_str(),
                    locale,
                    "main page not found"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn collection(
        &self,
        builder: EntryBuilder<'_>,
        section: &CollectionSection,
        membership: Option<&str>,
    ) -> Result<Vec<UrlEntry>, RepoError> {
        let items = self
            .content
            .find_by_types(&section.content_types, membership)
            .await?;

        Ok(items
            .iter()
            .flat_map(|item| builder.for_item(item, &section.prefix, &section.suffixes))
            .collect())
    }

    /// Sub-content hanging off parents through `section.relation`. Each parent's
    /// children are resolved independently.
    async fn nested(
        &self,
        builder: EntryBuilder<'_>,
        section: &NestedSection,
        membership: Option<&str>,
    ) -> Result<Vec<UrlEntry>, RepoError> {
        let parents = self
            .content
            .find_by_types(&section.parent_content_types, membership)
            .await?;

        let branches = parents
            .iter()
            .filter(|parent| !parent.related_ids(&section.relation).is_empty())
            .map(|parent| {
                Branch::new(
                    format!("{}:{}", section.name, parent.id),
                    self.children(builder, section, parent).boxed(),
                )
            })
            .collect();

        Ok(settle_values(&section.name, branches).await)
    }

    async fn children(
        &self,
        builder: EntryBuilder<'_>,
        section: &NestedSection,
        parent: &ContentItem,
    ) -> Result<Vec<UrlEntry>, RepoError> {
        let children = self
            .content
            .find_by_ids(parent.related_ids(&section.relation))
            .await?;
        let suffixes: Vec<String> = section.suffix.iter().cloned().collect();

        let mut entries = Vec::new();
        for locale in builder.locales() {
            // A parent without a slug in this locale still lists its children,
            // just without the parent segment.
            let parent_slug = parent.slug(locale).unwrap_or_default();
            let prefix = [
                section.parent_prefix.as_str(),
                parent_slug,
                section.child_segment.as_str(),
            ]
            .iter()
            .filter(|segment| !segment.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");

            for child in &children {
                entries.extend(builder.for_item_in_locale(child, locale, &prefix, &suffixes));
            }
        }
        Ok(entries)
    }
}
