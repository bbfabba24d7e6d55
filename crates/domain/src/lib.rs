//! Booking domain for the trekking seat inventory.
//!
//! Services here validate input, decide who may do what and snapshot
//! prices. Every seat-changing write is a single atomic call on a
//! [`booking_store::BookingStore`]; notifications go out afterwards
//! through the [`Outbox`].

pub mod actor;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod numbers;
pub mod reservation;
pub mod rules;

pub use actor::{Actor, Role};
pub use cart::{AddCartItem, CartService, CartView, Checkout};
pub use catalog::{
    CatalogService, MAX_CAPACITY, MAX_PRICE_CENTS, NewTrip, ScheduleTripDate, TripDateChanges,
    TripDateView,
};
pub use error::{BookingError, Result};
pub use ledger::SeatLedger;
pub use notify::{
    AdminBroadcast, LogMailer, Notification, Notifier, NotifyError, Outbox, spawn_dispatcher,
};
pub use reservation::{
    CreateReservation, ReservationDetails, ReservationFilter, ReservationService,
    UpdateReservationStatus,
};
pub use rules::BookingRules;
