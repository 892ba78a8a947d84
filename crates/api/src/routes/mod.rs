//! HTTP handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use fulfillment::{CatalogService, OrderService};

use crate::error::ApiError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState<P, O> {
    pub orders: OrderService<P, O>,
    pub catalog: CatalogService<P>,
}

/// The calling user, taken from the `x-user-id` header.
///
/// There is no authentication; the header is trusted as-is.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {USER_ID_HEADER} header")))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|id| CurrentUser(UserId::new(id)))
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))
    }
}

/// Parses a numeric path id.
pub(crate) fn parse_id(id: &str) -> Result<i64, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
