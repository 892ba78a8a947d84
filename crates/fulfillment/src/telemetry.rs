//! Fulfillment metrics.

use std::time::Duration;

use metrics::{Counter, Histogram};

use crate::FulfillmentError;

/// Metric handles used by [`crate::OrderService`] and [`crate::CatalogService`].
///
/// Handles are resolved against the recorder installed when this is
/// constructed, so the binary installs its exporter first.
#[derive(Clone)]
pub struct FulfillmentMetrics {
    orders_created: Counter,
    orders_cancelled: Counter,
    status_updates: Counter,
    stock_updates: Counter,
    reservation_insufficient_stock: Counter,
    reservation_not_found: Counter,
    reservation_conflict: Counter,
    reservation_other: Counter,
    persistence_failures: Counter,
    publish_failures: Counter,
    order_create_duration: Histogram,
}

impl FulfillmentMetrics {
    pub fn new() -> Self {
        let reservation_failure =
            |reason: &'static str| metrics::counter!("reservation_failures_total", "reason" => reason);

        Self {
            orders_created: metrics::counter!("orders_created_total"),
            orders_cancelled: metrics::counter!("orders_cancelled_total"),
            status_updates: metrics::counter!("order_status_updates_total"),
            stock_updates: metrics::counter!("product_stock_updates_total"),
            reservation_insufficient_stock: reservation_failure("insufficient_stock"),
            reservation_not_found: reservation_failure("not_found"),
            reservation_conflict: reservation_failure("conflict"),
            reservation_other: reservation_failure("other"),
            persistence_failures: metrics::counter!("order_persistence_failures_total"),
            publish_failures: metrics::counter!("events_publish_failures_total"),
            order_create_duration: metrics::histogram!("order_create_duration_seconds"),
        }
    }

    pub fn order_created(&self, elapsed: Duration) {
        self.orders_created.increment(1);
        self.order_create_duration.record(elapsed.as_secs_f64());
    }

    pub fn order_cancelled(&self) {
        self.orders_cancelled.increment(1);
    }

    pub fn status_updated(&self) {
        self.status_updates.increment(1);
    }

    pub fn stock_updated(&self) {
        self.stock_updates.increment(1);
    }

    /// Counts a rejected reservation under the reason its error implies.
    pub fn reservation_failed(&self, error: &FulfillmentError) {
        let counter = match error {
            FulfillmentError::InsufficientStock { .. } => &self.reservation_insufficient_stock,
            FulfillmentError::NotFound { .. } => &self.reservation_not_found,
            FulfillmentError::Conflict(_) => &self.reservation_conflict,
            _ => &self.reservation_other,
        };
        counter.increment(1);
    }

    pub fn persistence_failed(&self) {
        self.persistence_failures.increment(1);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.increment(1);
    }
}

impl Default for FulfillmentMetrics {
    fn default() -> Self {
        Self::new()
    }
}
