use std::time::Duration;

use async_trait::async_trait;

use crate::application::repos::{LeaseStore, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl LeaseStore for PostgresRepositories {
    /// Single conditional upsert: a live lease is left untouched, whoever holds
    /// it, and no row is returned.
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, RepoError> {
        let holder: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO rebuild_leases (task_key, owner, acquired_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (task_key) DO UPDATE
            SET owner = EXCLUDED.owner,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE rebuild_leases.expires_at <= now()
            RETURNING owner
            "#,
        )
        .bind(key)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(holder.is_some())
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM rebuild_leases WHERE task_key = $1 AND owner = $2")
            .bind(key)
            .bind(owner)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
