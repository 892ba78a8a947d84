use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};

use crate::ProductId;

/// Version number of a product's stock row, used for optimistic concurrency.
///
/// Every successful stock write increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StockVersion(i64);

impl StockVersion {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the first version (1) assigned to a newly stored product.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StockVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog product as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub is_active: bool,
    pub category: String,
    pub material: String,
    pub version: StockVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Creates an active product with empty descriptive fields.
    pub fn new(id: ProductId, name: impl Into<String>, price: Money, stock_quantity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            price,
            stock_quantity,
            is_active: true,
            category: String::new(),
            material: String::new(),
            version: StockVersion::default(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = material.into();
        self
    }

    /// Marks the product inactive; inactive products cannot be reserved.
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A request to reserve or release `quantity` units of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}
