use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{PointerStore, RepoError},
    domain::artifact::ArtifactId,
};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl PointerStore for PostgresRepositories {
    async fn set(&self, key: &str, value: ArtifactId, ttl: Duration) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sitemap_pointers (pointer_key, artifact_id, updated_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (pointer_key) DO UPDATE
            SET artifact_id = EXCLUDED.artifact_id,
                updated_at = EXCLUDED.updated_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value.as_uuid())
        .bind(ttl.as_secs_f64())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ArtifactId>, RepoError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT artifact_id
            FROM sitemap_pointers
            WHERE pointer_key = $1 AND expires_at > now()
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id.map(ArtifactId::from_uuid))
    }
}
