use {
    super::lock_manager::LockManager,
    super::payment_data::{ApiPaymentDataProvider, PaymentDataProvider},
    crate::domain::error::PipelineError,
    crate::domain::id::{OrderId, PaymentId},
    crate::domain::order::{InvoiceService, OrderAction, OrderRepository, StatusLabels},
    crate::domain::payment::{
        ERROR_LOCK_TIMEOUT, ERROR_UNKNOWN, PaymentRecord, PaymentStatus, ProcessingResult,
    },
    crate::domain::provider::MoneiApi,
    std::{sync::Arc, time::Duration},
};

/// Applies payment notifications to orders, one (order, payment) pair at a
/// time. Every notification source (webhook, callback, redirect return,
/// sweep) funnels through [`PaymentProcessor::process`].
pub struct PaymentProcessor {
    locks: Arc<LockManager>,
    orders: Arc<dyn OrderRepository>,
    invoices: Arc<dyn InvoiceService>,
    api: Arc<dyn MoneiApi>,
    labels: StatusLabels,
}

impl PaymentProcessor {
    pub fn new(
        locks: Arc<LockManager>,
        orders: Arc<dyn OrderRepository>,
        invoices: Arc<dyn InvoiceService>,
        api: Arc<dyn MoneiApi>,
        labels: StatusLabels,
    ) -> Self {
        Self {
            locks,
            orders,
            invoices,
            api,
            labels,
        }
    }

    pub fn labels(&self) -> &StatusLabels {
        &self.labels
    }

    /// Process a notification under the payment lock. `payment_data` is
    /// trusted when given; otherwise the payment is fetched from the API.
    ///
    /// Never returns an error: lock contention and failures come back as an
    /// unsuccessful [`ProcessingResult`].
    #[tracing::instrument(
        name = "process_payment",
        skip_all,
        fields(order_id = %order_id, payment_id = %payment_id)
    )]
    pub async fn process(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        payment_data: Option<PaymentRecord>,
    ) -> ProcessingResult {
        let outcome = self
            .locks
            .execute_with_payment_lock(order_id.as_str(), payment_id.as_str(), None, || {
                self.process_locked(order_id, payment_id, payment_data)
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(PipelineError::LockTimeout { key }) => {
                tracing::warn!(lock = %key, "payment is already being processed");
                ProcessingResult::error(
                    None,
                    order_id,
                    payment_id,
                    "payment is already being processed",
                    Some(ERROR_LOCK_TIMEOUT.to_string()),
                    None,
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "payment processing failed");
                ProcessingResult::error(
                    None,
                    order_id,
                    payment_id,
                    e.to_string(),
                    Some(ERROR_UNKNOWN.to_string()),
                    None,
                )
            }
        }
    }

    async fn process_locked(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        payment_data: Option<PaymentRecord>,
    ) -> Result<ProcessingResult, PipelineError> {
        let record = match payment_data {
            Some(record) => record,
            None => {
                ApiPaymentDataProvider::new(self.api.clone())
                    .get_payment_data(payment_id)
                    .await?
            }
        };

        if record.id() != payment_id {
            return Err(PipelineError::Validation(format!(
                "payment data is for {}, expected {payment_id}",
                record.id()
            )));
        }
        if record.order_id() != order_id {
            return Err(PipelineError::Validation(format!(
                "payment {payment_id} belongs to order {}, not {order_id}",
                record.order_id()
            )));
        }

        let mut order = self.orders.get(order_id).await?;

        match order.decide(&record, &self.labels) {
            OrderAction::AlreadyApplied => {
                tracing::info!(status = %record.status(), "order already reflects payment status");
            }
            OrderAction::NotCurrentAttempt => {
                tracing::info!(
                    status = %record.status(),
                    current_payment = ?order.monei_payment_id,
                    "notification for a superseded payment attempt, order left as is"
                );
            }
            OrderAction::LeaveUnchanged => {
                tracing::info!(
                    status_code = ?record.status_code(),
                    "payment failed, order left open for retry"
                );
            }
            OrderAction::Anomaly { current } => {
                tracing::warn!(
                    from = %current.payment_status(),
                    to = %record.status(),
                    "out-of-order payment status, not applied"
                );
            }
            OrderAction::Apply {
                target,
                generate_invoice,
            } => {
                let old_status = order.status.clone();
                order.apply(target, &record, &self.labels);
                if generate_invoice {
                    self.invoices.generate_invoice(&order, &record).await?;
                }
                self.orders.save(&order).await?;
                tracing::info!(
                    old_status = %old_status,
                    new_status = %order.status,
                    state = %order.state,
                    invoiced = generate_invoice,
                    "order updated"
                );
            }
        }

        Ok(result_for(&record))
    }

    pub async fn is_processing(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<bool, PipelineError> {
        self.locks
            .is_payment_locked(order_id.as_str(), payment_id.as_str())
            .await
    }

    /// Block until no other worker holds the payment. `Ok(false)` when the
    /// wait timed out.
    pub async fn wait_for_processing(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        timeout: Option<Duration>,
    ) -> Result<bool, PipelineError> {
        self.locks
            .wait_for_payment_unlock(order_id.as_str(), payment_id.as_str(), timeout, None)
            .await
    }

    /// Raw provider payment. Provider errors are passed through untouched.
    pub async fn get_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<serde_json::Value, PipelineError> {
        self.api.get_payment(payment_id).await
    }
}

fn result_for(record: &PaymentRecord) -> ProcessingResult {
    match record.status() {
        PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Expired => {
            ProcessingResult::from_unsuccessful(record)
        }
        status => ProcessingResult::success(status, record.order_id(), record.id()),
    }
}
