use {
    crate::domain::error::PipelineError,
    crate::domain::id::OrderId,
    crate::domain::order::{Order, OrderRepository},
    chrono::{DateTime, Utc},
    futures::future::BoxFuture,
    sqlx::PgPool,
};

type OrderRow = (
    String,
    i32,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const ORDER_COLUMNS: &str =
    "increment_id, store_id, state, status, monei_payment_id, created_at, updated_at";

fn order_from_row(row: OrderRow) -> Result<Order, PipelineError> {
    let (increment_id, store_id, state, status, monei_payment_id, created_at, updated_at) = row;
    Ok(Order {
        increment_id: OrderId::new(increment_id)?,
        store_id,
        state,
        status,
        monei_payment_id,
        created_at,
        updated_at,
    })
}

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &OrderId) -> Result<Order, PipelineError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM sales_orders WHERE increment_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row)
            .transpose()?
            .ok_or_else(|| PipelineError::OrderNotFound(id.to_string()))
    }

    async fn store(&self, order: &Order) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE sales_orders
            SET state = $2, status = $3, monei_payment_id = $4, updated_at = $5
            WHERE increment_id = $1
            "#,
        )
        .bind(order.increment_id.as_str())
        .bind(&order.state)
        .bind(&order.status)
        .bind(order.monei_payment_id.as_deref())
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reconcilable(
        &self,
        status: &str,
        excluded_stores: &[i32],
        limit: i64,
    ) -> Result<Vec<Order>, PipelineError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM sales_orders
            WHERE status = $1
              AND monei_payment_id IS NOT NULL
              AND btrim(monei_payment_id) <> ''
              AND NOT (store_id = ANY($2))
            ORDER BY created_at
            LIMIT $3
            "#
        ))
        .bind(status)
        .bind(excluded_stores.to_vec())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }
}

impl OrderRepository for PgOrderRepository {
    fn get<'a>(&'a self, id: &'a OrderId) -> BoxFuture<'a, Result<Order, PipelineError>> {
        Box::pin(self.fetch(id))
    }

    fn save<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.store(order))
    }

    fn find_reconcilable<'a>(
        &'a self,
        status: &'a str,
        excluded_stores: &'a [i32],
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Order>, PipelineError>> {
        Box::pin(self.reconcilable(status, excluded_stores, limit))
    }
}
