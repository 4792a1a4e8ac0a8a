use {
    super::lock_manager::LockManager,
    super::payment_processor::PaymentProcessor,
    crate::config::StoreSettings,
    crate::domain::error::PipelineError,
    crate::domain::id::PaymentId,
    crate::domain::order::{Order, OrderRepository},
    crate::domain::payment::PaymentRecord,
    crate::domain::provider::MoneiApi,
    chrono::{DateTime, Utc},
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

pub const ABANDONED_REASON: &str = "abandoned";

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub interval: Duration,
    /// Authorized payments older than this are canceled upstream.
    pub abandon_after: chrono::Duration,
    pub batch_size: i64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            abandon_after: chrono::Duration::days(7),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub skipped: usize,
    pub canceled: usize,
    pub reprocessed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepOutcome {
    Canceled,
    Reprocessed,
}

/// Periodic re-check of orders left in the pre-authorized status, for
/// webhooks that never arrived and authorizations nobody captured.
pub struct ReconciliationSweep {
    processor: Arc<PaymentProcessor>,
    locks: Arc<LockManager>,
    orders: Arc<dyn OrderRepository>,
    api: Arc<dyn MoneiApi>,
    stores: StoreSettings,
    settings: SweepSettings,
}

impl ReconciliationSweep {
    pub fn new(
        processor: Arc<PaymentProcessor>,
        locks: Arc<LockManager>,
        orders: Arc<dyn OrderRepository>,
        api: Arc<dyn MoneiApi>,
        stores: StoreSettings,
        settings: SweepSettings,
    ) -> Self {
        Self {
            processor,
            locks,
            orders,
            api,
            stores,
            settings,
        }
    }

    /// One pass over the pending orders. A failing order is logged and
    /// counted; it never stops the pass.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, PipelineError> {
        match self.locks.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "purged expired locks"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired locks"),
        }

        let status = self.processor.labels().pre_authorized.clone();
        let disabled = self.stores.disabled();
        let orders = self
            .orders
            .find_reconcilable(&status, &disabled, self.settings.batch_size)
            .await?;
        let mut report = SweepReport::default();

        for order in orders {
            report.examined += 1;
            let increment_id = order.increment_id.clone();

            if !self.stores.is_enabled(order.store_id) {
                tracing::debug!(order_id = %increment_id, store_id = order.store_id, "store disabled, skipping");
                report.skipped += 1;
                continue;
            }

            let Some(payment_id) = order
                .monei_payment_id
                .as_deref()
                .and_then(|id| PaymentId::new(id).ok())
            else {
                tracing::info!(order_id = %increment_id, "order has no payment id, skipping");
                report.skipped += 1;
                continue;
            };

            match self.locks.is_order_locked(increment_id.as_str()).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::info!(order_id = %increment_id, "order is locked by another process, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(order_id = %increment_id, error = %e, "lock check failed");
                    report.failed += 1;
                    continue;
                }
            }

            let abandoned = order.age(now) >= self.settings.abandon_after;
            let outcome = self
                .locks
                .execute_with_order_lock(increment_id.as_str(), None, || {
                    self.reconcile(&order, &payment_id, abandoned)
                })
                .await;

            match outcome {
                Ok(SweepOutcome::Canceled) => report.canceled += 1,
                Ok(SweepOutcome::Reprocessed) => report.reprocessed += 1,
                Err(e) if e.is_lock_timeout() => {
                    tracing::info!(order_id = %increment_id, "order lock taken concurrently, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %increment_id,
                        payment_id = %payment_id,
                        error = %e,
                        "reconciliation failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            skipped = report.skipped,
            canceled = report.canceled,
            reprocessed = report.reprocessed,
            failed = report.failed,
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn reconcile(
        &self,
        order: &Order,
        payment_id: &PaymentId,
        abandoned: bool,
    ) -> Result<SweepOutcome, PipelineError> {
        let mut data = None;
        if abandoned {
            tracing::info!(
                order_id = %order.increment_id,
                payment_id = %payment_id,
                "canceling abandoned authorization"
            );
            let raw = self.api.cancel_payment(payment_id, ABANDONED_REASON).await?;
            // Fall back to a fresh fetch if the cancel response is partial.
            data = PaymentRecord::from_value(raw).ok();
        }

        let result = self
            .processor
            .process(&order.increment_id, payment_id, data)
            .await;

        // A result without a status means processing itself broke down.
        if result.status().is_none() {
            return Err(PipelineError::Internal(
                result
                    .error_message()
                    .unwrap_or("processing failed")
                    .to_string(),
            ));
        }

        Ok(if abandoned {
            SweepOutcome::Canceled
        } else {
            SweepOutcome::Reprocessed
        })
    }

    /// Run [`Self::run_once`] every `interval` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.settings.interval, "reconciliation sweep started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("reconciliation sweep shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }

            if let Err(e) = self.run_once(Utc::now()).await {
                tracing::error!(error = %e, "reconciliation sweep error");
            }
        }
    }
}
