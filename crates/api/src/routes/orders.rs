//! Order placement, lookup, cancellation and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use fulfillment::{NewOrder, Order, OrderLine, OrderStatus, OrderStore};
use inventory::ProductStore;
use serde::{Deserialize, Serialize};

use super::{AppState, CurrentUser, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.as_i64(),
            user_id: order.user_id.as_i64(),
            status: order.status.to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.as_i64(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    total_cents: item.total_price().cents(),
                })
                .collect(),
            total_cents: order.total_amount.cents(),
            shipping_address: order.shipping_address,
            notes: order.notes,
            created_at: order.created_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
        }
    }
}

// -- Handlers --

/// POST /orders — place an order for the calling user.
#[tracing::instrument(skip(state, req))]
pub async fn create<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let request = NewOrder {
        user_id,
        shipping_address: req.shipping_address,
        notes: req.notes,
        items: req
            .items
            .iter()
            .map(|item| OrderLine::new(ProductId::new(item.product_id), item.quantity))
            .collect(),
    };

    let order = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id} — load one of the calling user's orders.
#[tracing::instrument(skip(state))]
pub async fn get<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let order_id = OrderId::new(parse_id(&id)?);
    let order = state.orders.get_order(order_id, user_id).await?;
    Ok(Json(order.into()))
}

/// GET /orders — the calling user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let orders = state.orders.orders_for_user(user_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// POST /orders/{id}/cancel — cancel a pending order and return its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let order_id = OrderId::new(parse_id(&id)?);
    let order = state.orders.cancel_order(order_id, user_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/{id}/status — advance an order along the fulfillment path.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let order_id = OrderId::new(parse_id(&id)?);
    let status: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    let order = state.orders.update_status(order_id, status).await?;
    Ok(Json(order.into()))
}
