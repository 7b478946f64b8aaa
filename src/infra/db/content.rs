use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;

use crate::{
    application::repos::{ContentRepo, RepoError},
    domain::content::ContentItem,
};

use super::{PostgresRepositories, map_sqlx_error};

const CONTENT_COLUMNS: &str = "SELECT id, content_type, slugs, published, deleted, created_at, \
                               last_modified_at, relations FROM content_items";

#[derive(sqlx::FromRow)]
struct ContentItemRow {
    id: String,
    content_type: String,
    slugs: Json<BTreeMap<String, String>>,
    published: bool,
    deleted: bool,
    created_at: Option<OffsetDateTime>,
    last_modified_at: Option<OffsetDateTime>,
    relations: Json<BTreeMap<String, Vec<String>>>,
}

impl From<ContentItemRow> for ContentItem {
    fn from(row: ContentItemRow) -> Self {
        Self {
            id: row.id,
            content_type: row.content_type,
            slugs: row.slugs.0,
            published: row.published,
            deleted: row.deleted,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
            relations: row.relations.0,
        }
    }
}

impl PostgresRepositories {
    /// Start a content query with the visibility filter already applied.
    fn visible_content<'q>() -> QueryBuilder<'q, Postgres> {
        let mut qb = QueryBuilder::new(CONTENT_COLUMNS);
        qb.push(" WHERE published AND NOT deleted");
        qb
    }
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn find_by_types(
        &self,
        content_types: &[String],
        membership: Option<&str>,
    ) -> Result<Vec<ContentItem>, RepoError> {
        if content_types.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = Self::visible_content();
        qb.push(" AND content_type = ANY(");
        qb.push_bind(content_types);
        qb.push(")");
        if let Some(flag) = membership {
            qb.push(" AND ");
            qb.push_bind(flag);
            qb.push(" = ANY(sites)");
        }
        qb.push(" ORDER BY created_at ASC NULLS LAST, id ASC");

        let rows = qb
            .build_query_as::<ContentItemRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ContentItem::from).collect())
    }

    async fn find_by_slug(
        &self,
        locale: &str,
        slug: &str,
    ) -> Result<Option<ContentItem>, RepoError> {
        let mut qb = Self::visible_content();
        qb.push(" AND btrim(slugs ->> ");
        qb.push_bind(locale);
        qb.push(", '/') = ");
        qb.push_bind(slug.trim_matches('/'));
        qb.push(" ORDER BY last_modified_at DESC NULLS LAST, id ASC LIMIT 1");

        let row = qb
            .build_query_as::<ContentItemRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ContentItem::from))
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = Self::visible_content();
        qb.push(" AND id = ANY(");
        qb.push_bind(ids);
        qb.push(") ORDER BY array_position(");
        qb.push_bind(ids);
        qb.push("::text[], id)");

        let rows = qb
            .build_query_as::<ContentItemRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ContentItem::from).collect())
    }
}
