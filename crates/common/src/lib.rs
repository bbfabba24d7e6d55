//! Shared types for the trekking booking service.
//!
//! Everything here is plain data: typed identifiers, money in cents,
//! the status enumerations (including the reservation state machine)
//! and the pagination envelope used by list operations.

pub mod money;
pub mod page;
pub mod status;
pub mod types;

pub use money::Money;
pub use page::{Page, PageRequest};
pub use status::{
    PaymentMethod, PaymentStatus, PurchaseStatus, ReservationStatus, TripDateStatus,
    UnknownStatus,
};
pub use types::{
    CartId, CartItemId, PaymentId, PurchaseId, ReservationId, TripDateId, TripId, UserId,
};
