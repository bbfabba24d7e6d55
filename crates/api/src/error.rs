//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use domain::BookingError;
use reconciliation::ReconcileError;
use serde_json::{Value, json};
use settlement::SettlementError;

use crate::response::{Envelope, FieldError};

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Text of the error behind a 500, attached to the response as an
/// extension. Only [`expose_internal_details`] turns it into body content.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

/// Whether 500 responses carry the underlying error text.
#[derive(Debug, Clone, Copy)]
pub struct ErrorDetails {
    pub expose: bool,
}

/// Middleware that strips [`InternalDetail`] from responses and, when the
/// router exposes details, lists it under `errors`.
pub async fn expose_internal_details(
    State(details): State<ErrorDetails>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(InternalDetail(detail)) = response.extensions_mut().remove::<InternalDetail>()
    else {
        return response;
    };
    if !details.expose {
        return response;
    }

    let body = Envelope::<Value> {
        success: false,
        message: Some(INTERNAL_MESSAGE.to_string()),
        data: None,
        errors: Some(vec![FieldError::message(detail)]),
    };
    (response.status(), axum::Json(body)).into_response()
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unreadable identity.
    Unauthorized(String),
    /// Input rejected before reaching a service.
    BadRequest { field: String, message: String },
    Booking(BookingError),
    Settlement(SettlementError),
    Reconcile(ReconcileError),
}

impl ApiError {
    pub fn bad_request(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            field: field.into(),
            message: message.into(),
        }
    }
}

struct Parts {
    status: StatusCode,
    message: String,
    data: Option<Value>,
    errors: Option<Vec<FieldError>>,
    detail: Option<String>,
}

impl Parts {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            errors: None,
            detail: None,
        }
    }

    fn internal(detail: String) -> Self {
        tracing::error!(error = %detail, "internal server error");
        let mut parts = Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE);
        parts.detail = Some(detail);
        parts
    }
}

fn booking_parts(err: BookingError) -> Parts {
    match err {
        BookingError::Validation { field, message } => {
            let mut parts = Parts::new(StatusCode::BAD_REQUEST, "Validation failed");
            parts.errors = Some(vec![FieldError::new(field, message)]);
            parts
        }
        BookingError::NotFound { .. } => Parts::new(StatusCode::NOT_FOUND, err.to_string()),
        BookingError::Conflict(message) => Parts::new(StatusCode::BAD_REQUEST, message),
        BookingError::InsufficientCapacity {
            requested,
            remaining,
            ..
        } => {
            let mut parts = Parts::new(
                StatusCode::BAD_REQUEST,
                format!("Insufficient capacity: only {remaining} seats remaining"),
            );
            parts.data = Some(json!({ "remaining": remaining, "requested": requested }));
            parts
        }
        BookingError::Forbidden(message) => Parts::new(StatusCode::FORBIDDEN, message),
        BookingError::Store(_) => Parts::internal(err.to_string()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let parts = match self {
            ApiError::Unauthorized(message) => Parts::new(StatusCode::UNAUTHORIZED, message),
            ApiError::BadRequest { field, message } => {
                let mut parts = Parts::new(StatusCode::BAD_REQUEST, "Validation failed");
                parts.errors = Some(vec![FieldError::new(field, message)]);
                parts
            }
            ApiError::Booking(err) => booking_parts(err),
            ApiError::Settlement(SettlementError::Declined(reason)) => {
                let mut parts = Parts::new(StatusCode::BAD_REQUEST, reason.message());
                parts.data = Some(json!({ "reason": reason.code() }));
                parts
            }
            ApiError::Settlement(SettlementError::Booking(err)) => booking_parts(err),
            ApiError::Reconcile(err @ ReconcileError::Unconfirmed { .. }) => {
                let mut parts = Parts::new(StatusCode::BAD_REQUEST, "Validation failed");
                parts.errors = Some(vec![FieldError::new("confirmacion", err.to_string())]);
                parts
            }
            ApiError::Reconcile(ReconcileError::Booking(err)) => booking_parts(err),
        };

        metrics::counter!("http_errors_total", "status" => parts.status.as_str().to_string())
            .increment(1);

        let body = Envelope {
            success: false,
            message: Some(parts.message),
            data: parts.data,
            errors: parts.errors,
        };
        let mut response = (parts.status, axum::Json(body)).into_response();
        if let Some(detail) = parts.detail {
            response.extensions_mut().insert(InternalDetail(detail));
        }
        response
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request("id", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use booking_store::StoreError;
    use common::TripDateId;
    use tower::ServiceExt;

    use super::*;

    async fn failing() -> Result<(), ApiError> {
        Err(BookingError::Store(StoreError::Decode("bad seat count".to_string())).into())
    }

    async fn internal_error_body(expose: bool) -> (StatusCode, Value) {
        let app = Router::new().route("/", get(failing)).layer(
            axum::middleware::from_fn_with_state(ErrorDetails { expose }, expose_internal_details),
        );
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.extensions().get::<InternalDetail>().is_none());
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn body(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_capacity_carries_remaining() {
        let (status, json) = body(ApiError::Booking(BookingError::InsufficientCapacity {
            trip_date_id: TripDateId::new(),
            requested: 3,
            remaining: 2,
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["data"]["remaining"], 2);
    }

    #[tokio::test]
    async fn test_validation_lists_field() {
        let (status, json) = body(BookingError::validation("party_size", "too big").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "party_size");
    }

    #[tokio::test]
    async fn test_internal_detail_follows_router_setting() {
        let (status, exposed) = internal_error_body(true).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            exposed["errors"][0]["message"]
                .as_str()
                .unwrap()
                .contains("bad seat count")
        );

        let (status, hidden) = internal_error_body(false).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hidden["message"], INTERNAL_MESSAGE);
        assert!(hidden.get("errors").is_none());

        // Both settings live side by side
        let (_, again) = internal_error_body(true).await;
        assert!(again["errors"].is_array());
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = [
            (BookingError::not_found("Reservation", "x"), StatusCode::NOT_FOUND),
            (BookingError::Conflict("done".into()), StatusCode::BAD_REQUEST),
            (BookingError::Forbidden("no".into()), StatusCode::FORBIDDEN),
        ];
        for (err, expected) in cases {
            let (status, _) = body(err.into()).await;
            assert_eq!(status, expected);
        }
        let (status, _) = body(ApiError::Unauthorized("who".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
