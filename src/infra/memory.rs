//! In-process adapters for single-node deployments and tests.

use {
    crate::domain::error::PipelineError,
    crate::domain::id::OrderId,
    crate::domain::lock::{LockKey, LockStore},
    crate::domain::order::{InvoiceService, Order, OrderRepository},
    crate::domain::payment::PaymentRecord,
    futures::future::BoxFuture,
    std::{
        collections::HashMap,
        sync::{
            Mutex, MutexGuard,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    },
    tokio::time::Instant,
    uuid::Uuid,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<LockKey, (Uuid, Instant)>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn try_acquire<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        let now = Instant::now();
        let mut locks = guard(&self.locks);
        let acquired = match locks.get(key) {
            Some((_, expires_at)) if *expires_at > now => false,
            _ => {
                locks.insert(key.clone(), (owner, now + ttl));
                true
            }
        };
        drop(locks);
        Box::pin(async move { Ok(acquired) })
    }

    fn release<'a>(
        &'a self,
        key: &'a LockKey,
        owner: Uuid,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        let mut locks = guard(&self.locks);
        let released = match locks.get(key) {
            Some((holder, _)) if *holder == owner => {
                locks.remove(key);
                true
            }
            _ => false,
        };
        drop(locks);
        Box::pin(async move { Ok(released) })
    }

    fn is_locked<'a>(&'a self, key: &'a LockKey) -> BoxFuture<'a, Result<bool, PipelineError>> {
        let locked = guard(&self.locks)
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now());
        Box::pin(async move { Ok(locked) })
    }

    fn purge_expired(&self) -> BoxFuture<'_, Result<u64, PipelineError>> {
        let now = Instant::now();
        let mut locks = guard(&self.locks);
        let before = locks.len();
        locks.retain(|_, (_, expires_at)| *expires_at > now);
        let purged = (before - locks.len()) as u64;
        drop(locks);
        Box::pin(async move { Ok(purged) })
    }
}

/// Order storage that also counts writes, so callers can observe how often
/// an order was actually mutated.
#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: Mutex<HashMap<OrderId, Order>>,
    saves: AtomicUsize,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        guard(&self.orders).insert(order.increment_id.clone(), order);
    }

    pub fn snapshot(&self, id: &OrderId) -> Option<Order> {
        guard(&self.orders).get(id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl OrderRepository for MemoryOrderRepository {
    fn get<'a>(&'a self, id: &'a OrderId) -> BoxFuture<'a, Result<Order, PipelineError>> {
        let order = guard(&self.orders)
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::OrderNotFound(id.to_string()));
        Box::pin(async move { order })
    }

    fn save<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<(), PipelineError>> {
        guard(&self.orders).insert(order.increment_id.clone(), order.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn find_reconcilable<'a>(
        &'a self,
        status: &'a str,
        excluded_stores: &'a [i32],
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Order>, PipelineError>> {
        let mut found: Vec<Order> = guard(&self.orders)
            .values()
            .filter(|order| order.status == status)
            .filter(|order| {
                order
                    .monei_payment_id
                    .as_deref()
                    .is_some_and(|id| !id.trim().is_empty())
            })
            .filter(|order| !excluded_stores.contains(&order.store_id))
            .cloned()
            .collect();
        found.sort_by_key(|order| order.created_at);
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Box::pin(async move { Ok(found) })
    }
}

/// Records every invoice request.
#[derive(Default)]
pub struct MemoryInvoiceService {
    invoices: Mutex<Vec<(String, String)>>,
}

impl MemoryInvoiceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(order increment id, payment id)` per invoice, in request order.
    pub fn invoices(&self) -> Vec<(String, String)> {
        guard(&self.invoices).clone()
    }
}

impl InvoiceService for MemoryInvoiceService {
    fn generate_invoice<'a>(
        &'a self,
        order: &'a Order,
        record: &'a PaymentRecord,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        guard(&self.invoices).push((order.increment_id.to_string(), record.id().to_string()));
        Box::pin(async { Ok(()) })
    }
}
