use {
    super::error::PipelineError,
    derive_more::Display,
    futures::future::BoxFuture,
    std::time::Duration,
    uuid::Uuid,
};

/// Name of a lock in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct LockKey(String);

impl LockKey {
    pub fn order(increment_id: &str) -> Self {
        Self(format!("ORDER_LOCK_{increment_id}"))
    }

    pub fn payment(order_id: &str, payment_id: &str) -> Self {
        Self(format!("PAYMENT_LOCK_{order_id}_{payment_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Process-external lock backend. Every acquisition is tagged with an owner
/// token so only the holder can release it, and carries a TTL so a crashed
/// holder never blocks a key forever.
pub trait LockStore: Send + Sync {
    /// Take the lock if free (or expired). Returns `false` if someone else
    /// holds it.
    fn try_acquire<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, PipelineError>>;

    /// Returns `false` if `owner` did not hold the lock.
    fn release<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
    ) -> BoxFuture<'a, Result<bool, PipelineError>>;

    fn is_locked<'a>(&'a self, key: &'a LockKey) -> BoxFuture<'a, Result<bool, PipelineError>>;

    /// Remove locks whose holders let them expire. Returns how many went.
    fn purge_expired(&self) -> BoxFuture<'_, Result<u64, PipelineError>>;
}
