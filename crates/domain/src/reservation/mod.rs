//! Reservation workflow: create, list, transition and cancel.

mod commands;
mod service;

pub use commands::{CreateReservation, ReservationFilter, UpdateReservationStatus};
pub use service::{ReservationDetails, ReservationService};
