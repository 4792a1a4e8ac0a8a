use {
    crate::domain::error::PipelineError,
    crate::domain::lock::{LockKey, LockStore},
    futures::future::BoxFuture,
    sqlx::PgPool,
    std::time::Duration,
    uuid::Uuid,
};

/// Lock rows in `monei_locks`. A row past `expires_at` counts as free and
/// is taken over by the next acquirer.
#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn acquire(&self, key: &LockKey, owner: Uuid, ttl: Duration) -> Result<bool, PipelineError> {
        let taken: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO monei_locks (lock_key, owner, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
                SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                WHERE monei_locks.expires_at <= now()
            RETURNING owner
            "#,
        )
        .bind(key.as_str())
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken == Some(owner))
    }

    async fn release_owned(&self, key: &LockKey, owner: Uuid) -> Result<bool, PipelineError> {
        let result = sqlx::query("DELETE FROM monei_locks WHERE lock_key = $1 AND owner = $2")
            .bind(key.as_str())
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn locked(&self, key: &LockKey) -> Result<bool, PipelineError> {
        let locked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM monei_locks WHERE lock_key = $1 AND expires_at > now())",
        )
        .bind(key.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(locked)
    }

    async fn purge(&self) -> Result<u64, PipelineError> {
        let result = sqlx::query("DELETE FROM monei_locks WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

impl LockStore for PgLockStore {
    fn try_acquire<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(self.acquire(key, owner, ttl))
    }

    fn release<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(self.release_owned(key, owner))
    }

    fn is_locked<'a>(&'a self, key: &'a LockKey) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(self.locked(key))
    }

    fn purge_expired(&self) -> BoxFuture<'_, Result<u64, PipelineError>> {
        Box::pin(self.purge())
    }
}
