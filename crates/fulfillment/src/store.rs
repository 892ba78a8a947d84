use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::{Order, OrderDraft, OrderStatus, OrderStoreError, StatusChange};

/// Result type for order store operations.
pub type StoreResult<T> = std::result::Result<T, OrderStoreError>;

/// Persistence seam for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order and its items as one unit, assigning its id.
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order>;

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>>;

    /// Applies `change` only if the stored status is still `expected`.
    ///
    /// This is the guard that makes cancellation release stock at most once.
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order>;
}

#[derive(Debug, Default)]
struct OrderTable {
    /// Arena of orders; positions never change.
    orders: Vec<Order>,
    by_id: HashMap<OrderId, usize>,
    by_user: HashMap<UserId, Vec<usize>>,
}

/// In-memory order store for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
    fail_next_create: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`OrderStore::create`] fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.table.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable("injected create failure".into()));
        }

        let mut table = self.table.write().await;
        let position = table.orders.len();
        let id = OrderId::new(position as i64 + 1);
        let order = draft.into_order(id);

        table.by_id.insert(id, position);
        table.by_user.entry(order.user_id).or_default().push(position);
        table.orders.push(order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).map(|&pos| table.orders[pos].clone()))
    }

    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let table = self.table.read().await;
        let positions = table.by_user.get(&user_id).map(Vec::as_slice).unwrap_or(&[]);
        // Arena order is creation order.
        Ok(positions
            .iter()
            .rev()
            .map(|&pos| table.orders[pos].clone())
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order> {
        let mut table = self.table.write().await;
        let pos = *table.by_id.get(&id).ok_or(OrderStoreError::NotFound(id))?;
        let order = &mut table.orders[pos];

        if order.status != expected {
            return Err(OrderStoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        order.status = change.status;
        if change.shipped_at.is_some() {
            order.shipped_at = change.shipped_at;
        }
        if change.delivered_at.is_some() {
            order.delivered_at = change.delivered_at;
        }
        Ok(order.clone())
    }
}
