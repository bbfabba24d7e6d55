//! Route handlers, one module per resource.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod payments;
pub mod reservations;
