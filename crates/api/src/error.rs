//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed path, header or body).
    BadRequest(String),
    /// Error raised by the fulfillment services.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    match &err {
        FulfillmentError::Validation(_) | FulfillmentError::InsufficientStock { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        FulfillmentError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        FulfillmentError::Conflict(_) | FulfillmentError::InvalidState { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        FulfillmentError::Storage(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, ProductId};
    use fulfillment::OrderStatus;

    use super::*;

    fn status_of(err: FulfillmentError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(FulfillmentError::Validation("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FulfillmentError::InsufficientStock {
                product_id: ProductId::new(1),
                product_name: "Anvil".into(),
                requested: 5,
                available: 2,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FulfillmentError::order_not_found(OrderId::new(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(FulfillmentError::Conflict("raced".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::InvalidState {
                order_id: OrderId::new(1),
                status: OrderStatus::Shipped,
                action: "cancel",
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::Storage("disk on fire".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
