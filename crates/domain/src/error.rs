//! Domain error types.

use booking_store::StoreError;
use common::TripDateId;
use thiserror::Error;

/// Errors that can occur during booking operations.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Malformed or missing input.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The current state does not allow the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not enough seats left on the trip date.
    #[error("Only {remaining} seats left on trip date {trip_date_id}, {requested} requested")]
    InsufficientCapacity {
        trip_date_id: TripDateId,
        requested: u32,
        remaining: u32,
    },

    /// The actor lacks the role the operation needs.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected persistence failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl BookingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BookingError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::Validation { .. } => "validation",
            BookingError::NotFound { .. } => "not_found",
            BookingError::Conflict(_) => "conflict",
            BookingError::InsufficientCapacity { .. } => "insufficient_capacity",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::Store(_) => "internal",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TripNotFound(id) => BookingError::not_found("Trip", id),
            StoreError::TripDateNotFound(id) => BookingError::not_found("Trip date", id),
            StoreError::ReservationNotFound(id) => BookingError::not_found("Reservation", id),
            StoreError::PurchaseNotFound(id) => BookingError::not_found("Purchase", id),
            StoreError::PaymentNotFound(id) => BookingError::not_found("Payment", id),
            StoreError::CartItemNotFound(id) => BookingError::not_found("Cart item", id),
            StoreError::InsufficientCapacity {
                trip_date_id,
                requested,
                remaining,
            } => BookingError::InsufficientCapacity {
                trip_date_id,
                requested,
                remaining,
            },
            err @ (StoreError::TripDateUnavailable { .. }
            | StoreError::StaleReservationStatus { .. }
            | StoreError::StalePurchaseStatus { .. }
            | StoreError::StalePaymentStatus { .. }
            | StoreError::PaymentAlreadyExists(_)
            | StoreError::DuplicateNumber(_)
            | StoreError::CapacityBelowOccupied { .. }) => BookingError::Conflict(err.to_string()),
            other => BookingError::Store(other),
        }
    }
}

/// Result type for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;
