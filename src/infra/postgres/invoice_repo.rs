use {
    crate::domain::error::PipelineError,
    crate::domain::order::{InvoiceService, Order},
    crate::domain::payment::PaymentRecord,
    futures::future::BoxFuture,
    sqlx::PgPool,
};

/// Writes one invoice per (order, payment). Replays hit the unique key and
/// do nothing.
#[derive(Clone)]
pub struct PgInvoiceService {
    pool: PgPool,
}

impl PgInvoiceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, order: &Order, record: &PaymentRecord) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_invoices (id, increment_id, payment_id, amount_cents, currency)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (increment_id, payment_id) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(order.increment_id.as_str())
        .bind(record.id().as_str())
        .bind(record.amount_in_cents())
        .bind(record.currency())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::info!(order_id = %order.increment_id, payment_id = %record.id(), "invoice already exists");
        }
        Ok(())
    }
}

impl InvoiceService for PgInvoiceService {
    fn generate_invoice<'a>(
        &'a self,
        order: &'a Order,
        record: &'a PaymentRecord,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.insert(order, record))
    }
}
