use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            error::PipelineError,
            id::{OrderId, PaymentId},
            payment::{ERROR_LOCK_TIMEOUT, PaymentStatus, ProcessingResult},
        },
        services::payment_data::{CallbackPaymentDataProvider, WebhookPaymentDataProvider},
    },
    axum::{
        Json,
        extract::{Query, State},
        http::HeaderMap,
    },
    serde::Deserialize,
};

pub const SIGNATURE_HEADER: &str = "MONEI-Signature";

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
}

/// Results that never reached the order are retried by the sender, so they
/// are answered with an error status.
fn into_response(result: ProcessingResult) -> Result<Json<ProcessingResult>, ApiError> {
    if result.status().is_some() {
        return Ok(Json(result));
    }
    let message = result.error_message().unwrap_or("processing failed").to_string();
    if result.status_code() == Some(ERROR_LOCK_TIMEOUT) {
        return Err(PipelineError::LockTimeout {
            key: format!("{}/{}", result.order_id(), result.payment_id()),
        }
        .into());
    }
    Err(PipelineError::Internal(message).into())
}

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(order_id = tracing::field::Empty, payment_id = tracing::field::Empty)
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ProcessingResult>, ApiError> {
    let sig = signature(&headers).ok_or_else(|| {
        PipelineError::WebhookSignature(format!("missing {SIGNATURE_HEADER} header"))
    })?;

    let provider = WebhookPaymentDataProvider::new(state.api.clone(), state.verifier.clone());
    let record = provider.extract_from_webhook(&body, Some(sig))?;

    tracing::Span::current()
        .record("order_id", tracing::field::display(record.order_id()))
        .record("payment_id", tracing::field::display(record.id()));
    tracing::info!(status = %record.status(), "webhook received");

    let order_id = record.order_id().clone();
    let payment_id = record.id().clone();
    let result = state
        .processor
        .process(&order_id, &payment_id, Some(record))
        .await;
    into_response(result)
}

#[tracing::instrument(name = "callback", skip_all)]
pub async fn callback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ProcessingResult>, ApiError> {
    let provider = CallbackPaymentDataProvider::new(state.api.clone(), state.verifier.clone());
    let record = provider.extract_from_callback(&body, signature(&headers))?;
    tracing::info!(
        order_id = %record.order_id(),
        payment_id = %record.id(),
        status = %record.status(),
        "callback received"
    );

    let order_id = record.order_id().clone();
    let payment_id = record.id().clone();
    let result = state
        .processor
        .process(&order_id, &payment_id, Some(record))
        .await;
    into_response(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteQuery {
    pub order_id: String,
    pub payment_id: String,
}

/// Shopper returning from the payment page. Lets an in-flight webhook
/// finish, then re-checks the payment. Only a generic message goes back.
#[tracing::instrument(
    name = "complete",
    skip_all,
    fields(order_id = tracing::field::Empty, payment_id = tracing::field::Empty)
)]
pub async fn complete_handler(
    State(state): State<AppState>,
    Query(query): Query<CompleteQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = OrderId::new(query.order_id)?;
    let payment_id = PaymentId::new(query.payment_id)?;
    tracing::Span::current()
        .record("order_id", tracing::field::display(&order_id))
        .record("payment_id", tracing::field::display(&payment_id));

    if !state
        .processor
        .wait_for_processing(&order_id, &payment_id, None)
        .await?
    {
        tracing::warn!("payment still locked after wait, checking anyway");
    }

    let result = state.processor.process(&order_id, &payment_id, None).await;
    if !result.is_successful() {
        tracing::info!(
            status_code = ?result.status_code(),
            error = ?result.error_message(),
            "redirect return with unsuccessful payment"
        );
    }

    let message = match result.status() {
        Some(PaymentStatus::Succeeded | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded) => {
            "Payment completed"
        }
        Some(PaymentStatus::Pending | PaymentStatus::Authorized) => "Payment is being processed",
        Some(PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Expired) => {
            "Payment failed"
        }
        None => "Payment is being processed",
    };

    Ok(Json(serde_json::json!({
        "successful": result.is_successful(),
        "status": result.status(),
        "message": message,
    })))
}
