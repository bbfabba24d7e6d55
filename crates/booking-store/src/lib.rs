//! Persistence for the trekking booking service.
//!
//! The [`BookingStore`] trait is implemented twice: [`InMemoryBookingStore`]
//! for tests and local runs, [`PostgresBookingStore`] for production.
//! Both give the same atomicity guarantees, most importantly that seat
//! admission checks and increments a date's `occupied` counter in one step.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryBookingStore;
pub use model::{
    Cart, CartItem, NewBooking, OccupancyChange, Payment, PaymentApproval, Purchase, Reservation,
    ResetSummary, Settlement, StatusChange, StatusChangeOutcome, Trip, TripDate, TripDateUpdate,
};
pub use postgres::PostgresBookingStore;
pub use query::ReservationQuery;
pub use store::{BookingStore, BookingStoreExt, TripDateStream};
