//! Settlement error types.

use booking_store::StoreError;
use domain::BookingError;
use thiserror::Error;

use crate::gateway::DeclineReason;

/// Errors that can occur while settling a payment.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The gateway refused the card.
    #[error("Payment declined: {0}")]
    Declined(DeclineReason),

    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl SettlementError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SettlementError::Declined(reason) => reason.code(),
            SettlementError::Booking(err) => err.reason(),
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        SettlementError::Booking(err.into())
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
