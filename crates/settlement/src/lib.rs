//! Payment settlement for purchases.
//!
//! A card payment is authorized by a [`PaymentGateway`] and, when approved,
//! recorded together with the purchase and reservation cascade in one store
//! call. Pay-later payments are recorded as pending and confirmed by an
//! admin through [`PaymentSettlement::confirm_deferred`].

pub mod error;
pub mod gateway;
pub mod service;

pub use error::{Result, SettlementError};
pub use gateway::{
    Authorization, CardBrand, CardData, CardOutcome, DeclineReason, GatewayConfig,
    PaymentGateway, SimulatedGateway, TEST_CARDS, TestCard,
};
pub use service::{BookedReservation, PaymentReceipt, PaymentSettlement, ProcessPayment};
