use {
    super::error::PipelineError,
    super::id::PaymentId,
    futures::future::BoxFuture,
};

/// Provider REST API. Every call returns the payment object as raw JSON;
/// normalization happens in the data providers.
pub trait MoneiApi: Send + Sync {
    fn get_payment<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<serde_json::Value, PipelineError>>;

    fn cancel_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        cancellation_reason: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, PipelineError>>;

    /// `amount` in cents; `None` captures the full authorized amount.
    fn capture_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        amount: Option<i64>,
    ) -> BoxFuture<'a, Result<serde_json::Value, PipelineError>>;

    fn refund_payment<'a>(
        &'a self,
        id: &'a PaymentId,
        amount: Option<i64>,
        refund_reason: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, PipelineError>>;
}
