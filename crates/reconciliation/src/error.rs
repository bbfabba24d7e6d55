//! Reconciliation error types.

use booking_store::StoreError;
use domain::BookingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The reset confirmations were missing or did not match.
    #[error("Reset not confirmed: both confirmations must be exactly \"{expected}\"")]
    Unconfirmed { expected: &'static str },

    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        ReconcileError::Booking(err.into())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
