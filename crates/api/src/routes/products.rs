//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use fulfillment::OrderStore;
use inventory::{Product, ProductStore, StockChange};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct UpsertProductRequest {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub material: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    pub category: String,
    pub material: String,
    pub is_active: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.as_i64(),
            name: product.name,
            description: product.description,
            price_cents: product.price.cents(),
            stock_quantity: product.stock_quantity,
            category: product.category,
            material: product.material,
            is_active: product.is_active,
        }
    }
}

#[derive(Serialize)]
pub struct StockChangeResponse {
    pub product_id: i64,
    pub previous_stock: u32,
    pub new_stock: u32,
}

impl From<StockChange> for StockChangeResponse {
    fn from(change: StockChange) -> Self {
        Self {
            product_id: change.product_id.as_i64(),
            previous_stock: change.previous_stock,
            new_stock: change.new_stock,
        }
    }
}

// -- Handlers --

/// GET /products — active products by name.
#[tracing::instrument(skip(state))]
pub async fn list<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let products = state.catalog.list_products().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// GET /products/{id} — a single active product.
#[tracing::instrument(skip(state))]
pub async fn get<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let product_id = ProductId::new(parse_id(&id)?);
    let product = state.catalog.get_product(product_id).await?;
    Ok(Json(product.into()))
}

/// POST /products — create or replace a product's catalog data.
#[tracing::instrument(skip(state, req), fields(product_id = req.id))]
pub async fn upsert<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Json(req): Json<UpsertProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest("price_cents must not be negative".into()));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let mut product = Product::new(
        ProductId::new(req.id),
        req.name,
        Money::from_cents(req.price_cents),
        req.stock_quantity,
    )
    .with_description(req.description)
    .with_category(req.category)
    .with_material(req.material);
    product.is_active = req.is_active;

    let stored = state.catalog.upsert_product(product).await?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// PUT /products/{id}/stock — set a product's stock to an absolute value.
#[tracing::instrument(skip(state, req))]
pub async fn set_stock<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Path(id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockChangeResponse>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let product_id = ProductId::new(parse_id(&id)?);
    let reason = req.reason.unwrap_or_else(|| "manual adjustment".to_string());
    let change = state
        .catalog
        .set_stock(product_id, req.quantity, reason)
        .await?;
    Ok(Json(change.into()))
}
