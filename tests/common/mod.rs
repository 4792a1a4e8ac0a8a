#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use monei_sync::domain::error::PipelineError;
use monei_sync::domain::id::{OrderId, PaymentId};
use monei_sync::domain::order::{Order, StatusLabels};
use monei_sync::domain::payment::{PaymentRecord, PaymentStatus};
use monei_sync::domain::provider::MoneiApi;
use monei_sync::infra::memory::{MemoryInvoiceService, MemoryLockStore, MemoryOrderRepository};
use monei_sync::services::lock_manager::{LockManager, LockSettings};
use monei_sync::services::payment_processor::PaymentProcessor;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECRET: &str = "pk_test_secret";

/// Header-form signature stamped with the current time.
pub fn sign_now(body: &str, secret: &str) -> String {
    monei_sync::services::signature::sign(body, Utc::now().timestamp(), secret)
}

/// Short timeouts so contention tests finish quickly.
pub fn test_lock_settings() -> LockSettings {
    LockSettings {
        acquire_timeout: Duration::from_millis(500),
        ttl: Duration::from_secs(30),
        wait_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(20),
        retry_interval: Duration::from_millis(10),
    }
}

pub fn payment_json(id: &str, order_id: &str, status: PaymentStatus, amount: i64) -> Value {
    json!({
        "id": id,
        "orderId": order_id,
        "status": status.as_str(),
        "amount": amount,
        "currency": "EUR",
        "createdAt": 1_700_000_000,
        "updatedAt": 1_700_000_060,
        "metadata": {"source": "test"},
    })
}

pub fn record(id: &str, order_id: &str, status: PaymentStatus) -> PaymentRecord {
    PaymentRecord::from_value(payment_json(id, order_id, status, 9999)).unwrap()
}

pub fn oid(id: &str) -> OrderId {
    OrderId::new(id).unwrap()
}

pub fn pid(id: &str) -> PaymentId {
    PaymentId::new(id).unwrap()
}

pub fn make_order(increment_id: &str, status: &str, payment_id: Option<&str>, age_days: i64) -> Order {
    let created_at = Utc::now() - ChronoDuration::days(age_days);
    Order {
        increment_id: oid(increment_id),
        store_id: 1,
        state: "pending_payment".into(),
        status: status.into(),
        monei_payment_id: payment_id.map(str::to_string),
        created_at,
        updated_at: created_at,
    }
}

/// Provider API double: serves scripted payments, records cancels.
#[derive(Default)]
pub struct ScriptedApi {
    payments: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, String>>,
    cancels: Mutex<Vec<(String, String)>>,
    get_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn put(&self, payment: Value) {
        let id = payment["id"].as_str().unwrap().to_string();
        self.payments.lock().unwrap().insert(id, payment);
    }

    pub fn fail_with(&self, id: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(id.to_string(), message.to_string());
    }

    pub fn cancels(&self) -> Vec<(String, String)> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn failure(&self, id: &PaymentId) -> Option<PipelineError> {
        self.failures
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|msg| PipelineError::Provider(msg.clone()))
    }

    fn set_status(&self, id: &PaymentId, status: PaymentStatus) -> Result<Value, PipelineError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(id.as_str())
            .ok_or_else(|| PipelineError::Provider("Payment not found".into()))?;
        payment["status"] = json!(status.as_str());
        Ok(payment.clone())
    }
}

impl MoneiApi for ScriptedApi {
    fn get_payment<'a>(&'a self, id: &'a PaymentId) -> BoxFuture<'a, Result<Value, PipelineError>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.failure(id) {
            Some(e) => Err(e),
            None => self
                .payments
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| PipelineError::Provider("Payment not found".into())),
        };
        Box::pin(async move { result })
    }

    fn cancel_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        cancellation_reason: &'a str,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        let result = match self.failure(id) {
            Some(e) => Err(e),
            None => {
                self.cancels
                    .lock()
                    .unwrap()
                    .push((id.to_string(), cancellation_reason.to_string()));
                self.set_status(id, PaymentStatus::Canceled)
            }
        };
        Box::pin(async move { result })
    }

    fn capture_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        _amount: Option<i64>,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        let result = self.set_status(id, PaymentStatus::Succeeded);
        Box::pin(async move { result })
    }

    fn refund_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        _amount: Option<i64>,
        _refund_reason: &'a str,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        let result = self.set_status(id, PaymentStatus::Refunded);
        Box::pin(async move { result })
    }
}

/// Processor wired to in-memory collaborators.
pub struct Harness {
    pub lock_store: Arc<MemoryLockStore>,
    pub locks: Arc<LockManager>,
    pub orders: Arc<MemoryOrderRepository>,
    pub invoices: Arc<MemoryInvoiceService>,
    pub api: Arc<ScriptedApi>,
    pub processor: Arc<PaymentProcessor>,
    pub labels: StatusLabels,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_labels(StatusLabels::default())
    }

    pub fn with_labels(labels: StatusLabels) -> Self {
        let lock_store = Arc::new(MemoryLockStore::new());
        let locks = Arc::new(LockManager::new(lock_store.clone(), test_lock_settings()));
        let orders = Arc::new(MemoryOrderRepository::new());
        let invoices = Arc::new(MemoryInvoiceService::new());
        let api = Arc::new(ScriptedApi::default());
        let processor = Arc::new(PaymentProcessor::new(
            locks.clone(),
            orders.clone(),
            invoices.clone(),
            api.clone(),
            labels.clone(),
        ));
        Self {
            lock_store,
            locks,
            orders,
            invoices,
            api,
            processor,
            labels,
        }
    }
}
