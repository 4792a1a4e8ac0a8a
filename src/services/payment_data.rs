use {
    super::signature::SignatureVerifier,
    crate::domain::error::PipelineError,
    crate::domain::id::PaymentId,
    crate::domain::payment::PaymentRecord,
    crate::domain::provider::MoneiApi,
    futures::future::BoxFuture,
    serde_json::Value,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

/// Payment records fetched during one processing context (a request or a
/// sweep job). Never shared across contexts and never authoritative.
#[derive(Debug, Default)]
pub struct PaymentCache {
    entries: HashMap<PaymentId, PaymentRecord>,
}

impl PaymentCache {
    pub fn get(&self, id: &PaymentId) -> Option<&PaymentRecord> {
        self.entries.get(id)
    }

    pub fn put(&mut self, record: PaymentRecord) {
        self.entries.insert(record.id().clone(), record);
    }

    pub fn invalidate(&mut self, id: &PaymentId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of canonical payment records.
pub trait PaymentDataProvider: Send + Sync {
    fn get_payment_data<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<PaymentRecord, PipelineError>>;

    fn validate_payment_data(&self, raw: &Value) -> bool {
        PaymentRecord::has_required_fields(raw)
    }
}

/// Fetches payments from the provider API, memoized per payment id.
pub struct ApiPaymentDataProvider {
    api: Arc<dyn MoneiApi>,
    cache: Mutex<PaymentCache>,
}

impl ApiPaymentDataProvider {
    pub fn new(api: Arc<dyn MoneiApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(PaymentCache::default()),
        }
    }

    /// Drop one cached payment, or all of them when `id` is `None`.
    pub fn clear_cache(&self, id: Option<&PaymentId>) {
        let mut cache = self.cache();
        match id {
            Some(id) => {
                cache.invalidate(id);
            }
            None => cache.clear(),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, PaymentCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(&self, id: &PaymentId) -> Result<PaymentRecord, PipelineError> {
        let cached = self.cache().get(id).cloned();
        if let Some(record) = cached {
            tracing::debug!(payment_id = %id, "payment served from context cache");
            return Ok(record);
        }

        let raw = self.api.get_payment(id).await?;
        if !self.validate_payment_data(&raw) {
            return Err(PipelineError::Validation(format!(
                "provider response for payment {id} is missing required fields"
            )));
        }
        let record = PaymentRecord::from_value(raw)?;
        self.cache().put(record.clone());
        Ok(record)
    }
}

impl PaymentDataProvider for ApiPaymentDataProvider {
    fn get_payment_data<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<PaymentRecord, PipelineError>> {
        Box::pin(self.fetch(id))
    }
}

/// Parses the synchronous redirect callback: `{"data": {"id": ..., ...}}`.
pub struct CallbackPaymentDataProvider {
    api: ApiPaymentDataProvider,
    verifier: SignatureVerifier,
}

impl CallbackPaymentDataProvider {
    pub fn new(api: Arc<dyn MoneiApi>, verifier: SignatureVerifier) -> Self {
        Self {
            api: ApiPaymentDataProvider::new(api),
            verifier,
        }
    }

    /// The signature is optional on callbacks; when one is sent it must match.
    pub fn extract_from_callback(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<PaymentRecord, PipelineError> {
        if body.trim().is_empty() {
            return Err(PipelineError::EmptyPayload);
        }
        if signature.is_some_and(|sig| !self.verifier.verify(body, sig)) {
            return Err(PipelineError::WebhookSignature(
                "callback signature mismatch".into(),
            ));
        }

        let payload: Value = serde_json::from_str(body).map_err(PipelineError::InvalidJson)?;
        let data = match payload.get("data") {
            Some(data @ Value::Object(_)) => data,
            _ => return Err(PipelineError::MissingData),
        };
        let has_id = data
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            return Err(PipelineError::MissingPaymentId);
        }

        PaymentRecord::from_value(data.clone())
    }
}

impl PaymentDataProvider for CallbackPaymentDataProvider {
    fn get_payment_data<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<PaymentRecord, PipelineError>> {
        self.api.get_payment_data(id)
    }
}

/// Parses asynchronous webhook bodies. The payment object is either the
/// body itself or nested under `data`.
pub struct WebhookPaymentDataProvider {
    api: ApiPaymentDataProvider,
    verifier: SignatureVerifier,
}

impl WebhookPaymentDataProvider {
    pub fn new(api: Arc<dyn MoneiApi>, verifier: SignatureVerifier) -> Self {
        Self {
            api: ApiPaymentDataProvider::new(api),
            verifier,
        }
    }

    /// Signature, when present, is checked before anything in the body is read.
    pub fn extract_from_webhook(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<PaymentRecord, PipelineError> {
        if signature.is_some_and(|sig| !self.verifier.verify(body, sig)) {
            return Err(PipelineError::WebhookSignature(
                "webhook signature mismatch".into(),
            ));
        }
        if body.trim().is_empty() {
            return Err(PipelineError::EmptyPayload);
        }

        let payload: Value = serde_json::from_str(body).map_err(PipelineError::InvalidJson)?;
        let nested = payload.get("data").filter(|data| data.is_object()).cloned();
        let data = nested.unwrap_or(payload);
        if !self.validate_payment_data(&data) {
            return Err(PipelineError::Validation(
                "webhook payment is missing required fields".into(),
            ));
        }

        PaymentRecord::from_value(data)
    }
}

impl PaymentDataProvider for WebhookPaymentDataProvider {
    fn get_payment_data<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<PaymentRecord, PipelineError>> {
        self.api.get_payment_data(id)
    }
}
