use common::{
    CartItemId, PaymentId, PaymentStatus, PurchaseId, PurchaseStatus, ReservationId,
    ReservationStatus, TripDateId, TripDateStatus, TripId,
};
use thiserror::Error;

/// Errors that can occur when reading or writing booking data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    #[error("Trip date not found: {0}")]
    TripDateNotFound(TripDateId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    #[error("Cart item not found: {0}")]
    CartItemNotFound(CartItemId),

    /// Seat admission was refused because the date has fewer seats left
    /// than requested. Nothing was written.
    #[error(
        "Insufficient capacity on trip date {trip_date_id}: requested {requested}, remaining {remaining}"
    )]
    InsufficientCapacity {
        trip_date_id: TripDateId,
        requested: u32,
        remaining: u32,
    },

    /// Seat admission was refused because the date does not accept
    /// bookings in its current status.
    #[error("Trip date {trip_date_id} is {status} and does not accept bookings")]
    TripDateUnavailable {
        trip_date_id: TripDateId,
        status: TripDateStatus,
    },

    /// The reservation changed status between read and write.
    #[error(
        "Reservation {reservation_id} status changed: expected {expected}, found {actual}"
    )]
    StaleReservationStatus {
        reservation_id: ReservationId,
        expected: ReservationStatus,
        actual: ReservationStatus,
    },

    #[error("Purchase {purchase_id} status changed: expected {expected}, found {actual}")]
    StalePurchaseStatus {
        purchase_id: PurchaseId,
        expected: PurchaseStatus,
        actual: PurchaseStatus,
    },

    #[error("Payment {payment_id} status changed: expected {expected}, found {actual}")]
    StalePaymentStatus {
        payment_id: PaymentId,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    /// A purchase can be settled by at most one payment.
    #[error("Purchase {0} already has a payment")]
    PaymentAlreadyExists(PurchaseId),

    /// A generated purchase or reservation number collided with an
    /// existing one.
    #[error("Duplicate number: {0}")]
    DuplicateNumber(String),

    #[error(
        "Capacity {capacity} of trip date {trip_date_id} would be below its {occupied} occupied seats"
    )]
    CapacityBelowOccupied {
        trip_date_id: TripDateId,
        capacity: u32,
        occupied: u32,
    },

    /// The booking handed to the store is malformed.
    #[error("Invalid booking: {0}")]
    InvalidBooking(String),

    /// A stored value could not be converted into its domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<common::UnknownStatus> for StoreError {
    fn from(err: common::UnknownStatus) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
