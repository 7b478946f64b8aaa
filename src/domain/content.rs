//! Read-only view of catalog records owned by the content repository.

use std::collections::BTreeMap;

use time::OffsetDateTime;

/// A catalog item as projected for sitemap generation.
///
/// Only the fields the pipeline consumes are carried: the per-locale slug map,
/// publication flags, timestamps and relation fields pointing at sub-items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub content_type: String,
    pub slugs: BTreeMap<String, String>,
    pub published: bool,
    pub deleted: bool,
    pub created_at: Option<OffsetDateTime>,
    pub last_modified_at: Option<OffsetDateTime>,
    pub relations: BTreeMap<String, Vec<String>>,
}

impl ContentItem {
    /// Slug for `locale`, if the item has a non-blank one.
    pub fn slug(&self, locale: &str) -> Option<&str> {
        self.slugs
            .get(locale)
            .map(|slug| slug.trim_matches('/'))
            .filter(|slug| !slug.trim().is_empty())
    }

    /// Last modification time, falling back to creation time.
    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        self.last_modified_at.or(self.created_at)
    }

    /// Identifiers listed under the given relation field.
    pub fn related_ids(&self, relation: &str) -> &[String] {
        self.relations
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the item passes the base publication filter.
    pub fn is_visible(&self) -> bool {
        self.published && !self.deleted
    }
}
