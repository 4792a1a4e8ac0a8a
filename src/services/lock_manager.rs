use {
    crate::domain::error::PipelineError,
    crate::domain::lock::{LockKey, LockStore},
    futures::FutureExt,
    std::{
        collections::HashMap,
        future::Future,
        panic::{self, AssertUnwindSafe},
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::time::{Instant, sleep},
    uuid::Uuid,
};

/// Upper bound for any acquisition timeout.
pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone)]
pub struct LockSettings {
    /// How long an acquisition attempt may wait.
    pub acquire_timeout: Duration,
    /// Store-side expiry of a held lock.
    pub ttl: Duration,
    /// Default bound for wait-for-unlock polling.
    pub wait_timeout: Duration,
    /// Default interval for wait-for-unlock polling.
    pub poll_interval: Duration,
    /// Pause between acquisition attempts.
    pub retry_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
            ttl: Duration::from_secs(300),
            wait_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Named, timed locks at order and (order, payment) granularity.
///
/// Raw `lock_*`/`unlock_*` calls remember the owner token of every lock taken
/// through this manager so `unlock_*` can release it by name. The scoped
/// `execute_with_*` helpers keep the token local and release on every exit
/// path, panics included.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    settings: LockSettings,
    held: Mutex<HashMap<LockKey, Uuid>>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, settings: LockSettings) -> Self {
        Self {
            store,
            settings,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub async fn lock_order(
        &self,
        increment_id: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, PipelineError> {
        self.lock(LockKey::order(increment_id), timeout).await
    }

    pub async fn unlock_order(&self, increment_id: &str) -> Result<bool, PipelineError> {
        self.unlock(&LockKey::order(increment_id)).await
    }

    pub async fn is_order_locked(&self, increment_id: &str) -> Result<bool, PipelineError> {
        self.store.is_locked(&LockKey::order(increment_id)).await
    }

    pub async fn lock_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, PipelineError> {
        self.lock(LockKey::payment(order_id, payment_id), timeout)
            .await
    }

    pub async fn unlock_payment(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<bool, PipelineError> {
        self.unlock(&LockKey::payment(order_id, payment_id)).await
    }

    pub async fn is_payment_locked(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<bool, PipelineError> {
        self.store
            .is_locked(&LockKey::payment(order_id, payment_id))
            .await
    }

    /// Poll until the payment lock is free. `Ok(false)` means the wait timed
    /// out with the lock still held.
    pub async fn wait_for_payment_unlock(
        &self,
        order_id: &str,
        payment_id: &str,
        timeout: Option<Duration>,
        interval: Option<Duration>,
    ) -> Result<bool, PipelineError> {
        let key = LockKey::payment(order_id, payment_id);
        let timeout = timeout.unwrap_or(self.settings.wait_timeout);
        let interval = interval.unwrap_or(self.settings.poll_interval);
        let started = Instant::now();

        loop {
            if !self.store.is_locked(&key).await? {
                return Ok(true);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::debug!(key = %key, ?timeout, "gave up waiting for unlock");
                return Ok(false);
            }
            sleep(interval.min(timeout - elapsed)).await;
        }
    }

    pub async fn execute_with_order_lock<T, F, Fut>(
        &self,
        increment_id: &str,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        self.execute_with_lock(LockKey::order(increment_id), timeout, f)
            .await
    }

    pub async fn execute_with_payment_lock<T, F, Fut>(
        &self,
        order_id: &str,
        payment_id: &str,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        self.execute_with_lock(LockKey::payment(order_id, payment_id), timeout, f)
            .await
    }

    async fn execute_with_lock<T, F, Fut>(
        &self,
        key: LockKey,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let owner = self
            .acquire(&key, timeout)
            .await?
            .ok_or_else(|| PipelineError::LockTimeout {
                key: key.to_string(),
            })?;

        let guard = ReleaseOnDrop {
            store: self.store.clone(),
            key,
            owner,
            armed: true,
        };

        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        guard.release().await;

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Drop every expired lock from the store. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, PipelineError> {
        self.store.purge_expired().await
    }

    async fn lock(&self, key: LockKey, timeout: Option<Duration>) -> Result<bool, PipelineError> {
        match self.acquire(&key, timeout).await? {
            Some(owner) => {
                self.held_tokens().insert(key, owner);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unlock(&self, key: &LockKey) -> Result<bool, PipelineError> {
        let owner = self.held_tokens().remove(key);
        match owner {
            Some(owner) => self.store.release(key, owner).await,
            None => {
                tracing::debug!(key = %key, "unlock requested for a lock this manager does not hold");
                Ok(false)
            }
        }
    }

    /// Retry until acquired or `timeout` elapses. `Ok(None)` on timeout.
    async fn acquire(
        &self,
        key: &LockKey,
        timeout: Option<Duration>,
    ) -> Result<Option<Uuid>, PipelineError> {
        let timeout = timeout
            .unwrap_or(self.settings.acquire_timeout)
            .min(MAX_ACQUIRE_TIMEOUT);
        let owner = Uuid::now_v7();
        let started = Instant::now();

        loop {
            if self.store.try_acquire(key, owner, self.settings.ttl).await? {
                tracing::debug!(key = %key, "lock acquired");
                return Ok(Some(owner));
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::info!(key = %key, ?timeout, "lock not acquired within timeout");
                return Ok(None);
            }
            sleep(self.settings.retry_interval.min(timeout - elapsed)).await;
        }
    }

    fn held_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<LockKey, Uuid>> {
        // A poisoned map only means a panic elsewhere; the tokens are still valid.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lock held by a scoped `execute_with_*` call. Released inline on normal
/// exit; if the owning future is dropped mid-callback the release is handed
/// to the runtime instead of waiting out the TTL.
struct ReleaseOnDrop {
    store: Arc<dyn LockStore>,
    key: LockKey,
    owner: Uuid,
    armed: bool,
}

impl ReleaseOnDrop {
    async fn release(mut self) {
        let result = self.store.release(&self.key, self.owner).await;
        self.armed = false;
        log_release(&self.key, result);
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let key = self.key.clone();
        let owner = self.owner;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(key = %key, "lock holder dropped, releasing in background");
                handle.spawn(async move {
                    let result = store.release(&key, owner).await;
                    log_release(&key, result);
                });
            }
            Err(_) => tracing::warn!(key = %key, "no runtime to release dropped lock, left to ttl"),
        }
    }
}

fn log_release(key: &LockKey, result: Result<bool, PipelineError>) {
    match result {
        Ok(true) => {}
        Ok(false) => tracing::warn!(key = %key, "lock expired before release"),
        Err(e) => tracing::error!(key = %key, error = %e, "lock release failed, left to ttl"),
    }
}
