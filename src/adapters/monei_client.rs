use {
    crate::domain::{error::PipelineError, id::PaymentId, provider::MoneiApi},
    futures::future::BoxFuture,
    reqwest::Url,
    serde_json::{Value, json},
    std::time::Duration,
};

/// MONEI REST client. Transport failures and non-2xx answers surface as
/// [`PipelineError::Provider`] carrying the provider's own message.
pub struct MoneiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl MoneiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("monei_sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Internal(format!("http client: {e}")))?;

        let base_url = Url::parse(&base_url.into())
            .map_err(|e| PipelineError::Config(format!("MONEI_API_URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PipelineError::Config(
                "MONEI_API_URL must be a hierarchical URL".into(),
            ));
        }

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// `<base>/payments/<id>[/<action>]`, each segment percent-encoded.
    fn payment_url(&self, id: &PaymentId, action: Option<&str>) -> Result<Url, PipelineError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| PipelineError::Config("MONEI_API_URL cannot take a path".into()))?;
            segments.pop_if_empty().push("payments").push(id.as_str());
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, PipelineError> {
        let response = request
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("provider request failed")
                        .to_string()
                });
            tracing::warn!(%status, %message, "MONEI API error");
            return Err(PipelineError::Provider(message));
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, id: &PaymentId) -> Result<Value, PipelineError> {
        let url = self.payment_url(id, None)?;
        self.send(self.http.get(url)).await
    }

    async fn post(&self, id: &PaymentId, action: &str, body: Value) -> Result<Value, PipelineError> {
        let url = self.payment_url(id, Some(action))?;
        self.send(self.http.post(url).json(&body)).await
    }
}

impl MoneiApi for MoneiClient {
    fn get_payment<'a>(&'a self, id: &'a PaymentId) -> BoxFuture<'a, Result<Value, PipelineError>> {
        Box::pin(self.get(id))
    }

    fn cancel_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        cancellation_reason: &'a str,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        Box::pin(self.post(
            id,
            "cancel",
            json!({ "cancellationReason": cancellation_reason }),
        ))
    }

    fn capture_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        amount: Option<i64>,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        let body = match amount {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };
        Box::pin(self.post(id, "capture", body))
    }

    fn refund_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        amount: Option<i64>,
        refund_reason: &'a str,
    ) -> BoxFuture<'a, Result<Value, PipelineError>> {
        let mut body = json!({ "refundReason": refund_reason });
        if let Some(amount) = amount {
            body["amount"] = json!(amount);
        }
        Box::pin(self.post(id, "refund", body))
    }
}
