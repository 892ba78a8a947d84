use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::store::StoreResult;
use crate::{Order, OrderDraft, OrderItem, OrderStatus, OrderStore, OrderStoreError, StatusChange};

const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, shipping_address, notes, \
     created_at, shipped_at, delivered_at";

/// PostgreSQL-backed order store.
///
/// An order and its items are written in one transaction. Status changes are
/// a single `UPDATE … WHERE status = $expected`.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> OrderStoreError {
        OrderStoreError::Database(sqlx::Error::Decode(Box::new(e)))
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> StoreResult<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| OrderStoreError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            status,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            shipping_address: row.try_get("shipping_address")?,
            notes: row.try_get("notes")?,
            items,
            created_at: row.try_get("created_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> StoreResult<OrderItem> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(OrderItem {
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: u32::try_from(quantity).map_err(Self::decode_error)?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    /// Loads the items of every listed order, grouped by order id.
    async fn items_for(&self, ids: &[i64]) -> StoreResult<HashMap<i64, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: i64 = row.try_get("order_id")?;
            grouped
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }
        Ok(grouped)
    }

    async fn current_status(&self, id: OrderId) -> StoreResult<Option<OrderStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        status
            .map(|s| {
                s.parse::<OrderStatus>()
                    .map_err(|e| OrderStoreError::Database(sqlx::Error::Decode(e.into())))
            })
            .transpose()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order> {
        let total = draft.total_amount();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, status, total_cents, shipping_address, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(draft.user_id.as_i64())
        .bind(OrderStatus::Pending.as_str())
        .bind(total.cents())
        .bind(&draft.shipping_address)
        .bind(&draft.notes)
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in draft.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(item.product_id.as_i64())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(order_id = id, items = draft.items.len(), "order persisted");

        Ok(draft.into_order(OrderId::new(id)))
    }

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.items_for(&[id.as_i64()]).await?;
        let items = items.remove(&id.as_i64()).unwrap_or_default();
        Self::row_to_order(&row, items).map(Some)
    }

    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut items = self.items_for(&ids).await?;

        rows.iter()
            .zip(&ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(id).unwrap_or_default()))
            .collect()
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $1,
                shipped_at = COALESCE($2, shipped_at),
                delivered_at = COALESCE($3, delivered_at)
            WHERE id = $4 AND status = $5
            RETURNING id
            "#,
        )
        .bind(change.status.as_str())
        .bind(change.shipped_at)
        .bind(change.delivered_at)
        .bind(id.as_i64())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_none() {
            return Err(match self.current_status(id).await? {
                Some(actual) => OrderStoreError::StatusConflict {
                    order_id: id,
                    expected,
                    actual,
                },
                None => OrderStoreError::NotFound(id),
            });
        }

        self.get(id).await?.ok_or(OrderStoreError::NotFound(id))
    }
}
