//! All-or-nothing stock reservation with optimistic concurrency.

use std::collections::BTreeMap;

use common::Money;
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Product, ProductId, ProductStore, Result, StockRequest};

/// Default number of validate-then-commit rounds before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// One product's share of a committed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Product price observed when the reservation committed.
    pub unit_price: Money,
    pub previous_stock: u32,
    pub new_stock: u32,
}

/// A committed reservation.
///
/// Lines are ordered by ascending product id, one per distinct product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    lines: Vec<ReservedLine>,
}

impl Reservation {
    pub fn lines(&self) -> &[ReservedLine] {
        &self.lines
    }

    pub fn line(&self, product_id: ProductId) -> Option<&ReservedLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.lines.iter().map(|l| l.product_id)
    }

    /// Returns the requests that undo this reservation when passed to
    /// [`InventoryStore::release`].
    pub fn to_requests(&self) -> Vec<StockRequest> {
        self.lines
            .iter()
            .map(|l| StockRequest::new(l.product_id, l.quantity))
            .collect()
    }
}

/// Before/after stock for a single product write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub previous_stock: u32,
    pub new_stock: u32,
}

enum CommitOutcome {
    Committed(Vec<ReservedLine>),
    Conflicted(ProductId),
}

/// Reservation logic over a [`ProductStore`].
///
/// Products touched by one call are always visited in ascending id order.
#[derive(Debug, Clone)]
pub struct InventoryStore<S> {
    store: S,
    max_attempts: u32,
}

impl<S: ProductStore> InventoryStore<S> {
    /// Creates an inventory store with the default retry budget.
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the number of optimistic attempts before reporting a conflict.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns the underlying product store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a product by id.
    pub async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        self.store.get_by_id(id).await
    }

    /// Reserves every requested quantity or nothing.
    ///
    /// A validation pass checks every product before any stock is written.
    /// The commit pass writes each decrement conditionally on the version the
    /// validation pass observed; if any write loses a race, the decrements
    /// already applied are restored and the whole attempt starts over.
    #[tracing::instrument(skip(self, requests), fields(items = requests.len()))]
    pub async fn try_reserve(&self, requests: &[StockRequest]) -> Result<Reservation> {
        let wanted = merge_requests(requests)?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let plan = self.validate(&wanted).await?;
            match self.commit(&plan).await? {
                CommitOutcome::Committed(lines) => {
                    tracing::debug!(attempt, products = lines.len(), "reservation committed");
                    return Ok(Reservation { lines });
                }
                CommitOutcome::Conflicted(product_id) if attempt >= self.max_attempts => {
                    tracing::warn!(%product_id, attempts = attempt, "reservation gave up under contention");
                    return Err(InventoryError::Conflict {
                        product_id,
                        attempts: attempt,
                    });
                }
                CommitOutcome::Conflicted(product_id) => {
                    tracing::debug!(attempt, %product_id, "reservation lost a race, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Returns stock for each request, all or nothing.
    ///
    /// Must be called at most once per committed reservation; the order state
    /// machine upstream guarantees that. Increments are retried through any
    /// number of version conflicts. If the store fails part way, increments
    /// already applied are taken back before the error is returned. Products
    /// that no longer exist are logged and skipped.
    #[tracing::instrument(skip(self, requests), fields(items = requests.len()))]
    pub async fn release(&self, requests: &[StockRequest]) -> Result<Vec<StockChange>> {
        let wanted = merge_requests(requests)?;
        let mut changes = Vec::with_capacity(wanted.len());

        for (product_id, quantity) in wanted {
            match self
                .compensate(product_id, |stock| stock.checked_add(quantity))
                .await
            {
                Ok(change) => changes.push(change),
                Err(InventoryError::ProductNotFound(_)) => {
                    tracing::warn!(%product_id, quantity, "released product no longer exists");
                }
                Err(e) => {
                    self.take_back(&changes).await;
                    return Err(e);
                }
            }
        }

        Ok(changes)
    }

    /// Sets a product's stock to an absolute value.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, product_id: ProductId, new_quantity: u32) -> Result<StockChange> {
        self.adjust(product_id, |_| Some(new_quantity)).await
    }

    async fn validate(&self, wanted: &BTreeMap<ProductId, u32>) -> Result<Vec<(Product, u32)>> {
        let mut plan = Vec::with_capacity(wanted.len());
        for (&product_id, &quantity) in wanted {
            let product = self
                .store
                .get_by_id(product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or(InventoryError::ProductNotFound(product_id))?;

            if product.stock_quantity < quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id,
                    product_name: product.name,
                    requested: quantity,
                    available: product.stock_quantity,
                });
            }
            plan.push((product, quantity));
        }
        Ok(plan)
    }

    async fn commit(&self, plan: &[(Product, u32)]) -> Result<CommitOutcome> {
        let mut applied: Vec<ReservedLine> = Vec::with_capacity(plan.len());

        for (product, quantity) in plan {
            let new_stock = product.stock_quantity - quantity;
            let write = self
                .store
                .update_stock(product.id, new_stock, product.version)
                .await;

            match write {
                Ok(_) => applied.push(ReservedLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: *quantity,
                    unit_price: product.price,
                    previous_stock: product.stock_quantity,
                    new_stock,
                }),
                Err(InventoryError::StockConflict { product_id, .. }) => {
                    // a failed undo must not be followed by another decrement
                    self.undo(&applied).await?;
                    return Ok(CommitOutcome::Conflicted(product_id));
                }
                Err(e) => {
                    self.undo(&applied).await?;
                    return Err(e);
                }
            }
        }

        Ok(CommitOutcome::Committed(applied))
    }

    /// Restores every applied decrement, reporting the first failure.
    async fn undo(&self, applied: &[ReservedLine]) -> Result<()> {
        let mut first_error = None;
        for line in applied.iter().rev() {
            let quantity = line.quantity;
            if let Err(e) = self
                .compensate(line.product_id, |stock| stock.checked_add(quantity))
                .await
            {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity,
                    error = %e,
                    "failed to restore stock after aborted reservation"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reverses increments made by a release that failed part way.
    async fn take_back(&self, changes: &[StockChange]) {
        for change in changes.iter().rev() {
            let quantity = change.new_stock - change.previous_stock;
            if let Err(e) = self
                .compensate(change.product_id, |stock| stock.checked_sub(quantity))
                .await
            {
                tracing::error!(
                    product_id = %change.product_id,
                    quantity,
                    error = %e,
                    "failed to take back stock after partial release"
                );
            }
        }
    }

    /// Read-modify-write with bounded retries on version conflicts.
    async fn adjust<F>(&self, product_id: ProductId, compute: F) -> Result<StockChange>
    where
        F: Fn(u32) -> Option<u32>,
    {
        self.write_stock(product_id, Some(self.max_attempts), compute)
            .await
    }

    /// Read-modify-write that outlasts any number of version conflicts.
    ///
    /// Used for writes that undo earlier ones; those never compete for stock,
    /// so losing a race only means another writer moved first.
    async fn compensate<F>(&self, product_id: ProductId, compute: F) -> Result<StockChange>
    where
        F: Fn(u32) -> Option<u32>,
    {
        self.write_stock(product_id, None, compute).await
    }

    async fn write_stock<F>(
        &self,
        product_id: ProductId,
        max_attempts: Option<u32>,
        compute: F,
    ) -> Result<StockChange>
    where
        F: Fn(u32) -> Option<u32>,
    {
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            let product = self
                .store
                .get_by_id(product_id)
                .await?
                .ok_or(InventoryError::ProductNotFound(product_id))?;

            let new_stock = compute(product.stock_quantity)
                .ok_or(InventoryError::StockOverflow { product_id })?;

            match self
                .store
                .update_stock(product_id, new_stock, product.version)
                .await
            {
                Ok(_) => {
                    return Ok(StockChange {
                        product_id,
                        previous_stock: product.stock_quantity,
                        new_stock,
                    });
                }
                Err(InventoryError::StockConflict { .. }) => {
                    if max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(InventoryError::Conflict {
                            product_id,
                            attempts,
                        });
                    }
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Collapses duplicate product lines and rejects zero quantities.
fn merge_requests(requests: &[StockRequest]) -> Result<BTreeMap<ProductId, u32>> {
    let mut merged = BTreeMap::new();
    for request in requests {
        if request.quantity == 0 {
            return Err(InventoryError::InvalidQuantity {
                product_id: request.product_id,
                quantity: 0,
            });
        }
        let total: &mut u32 = merged.entry(request.product_id).or_default();
        *total = total
            .checked_add(request.quantity)
            .ok_or(InventoryError::StockOverflow {
                product_id: request.product_id,
            })?;
    }
    Ok(merged)
}
