//! Status enumerations and the reservation state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a status string does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownStatus {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The state of a reservation in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► InProgress ──► Completed
///    │            │              │
///    └────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Seats are held, payment not yet settled.
    #[default]
    #[serde(alias = "pendiente")]
    Pending,

    /// Payment approved or confirmed by an admin.
    #[serde(alias = "confirmada")]
    Confirmed,

    /// The trip is under way.
    #[serde(alias = "en_curso")]
    InProgress,

    /// The trip finished (terminal state).
    #[serde(alias = "completada")]
    Completed,

    /// Cancelled by its owner or an admin (terminal state).
    #[serde(alias = "cancelada")]
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 5] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::InProgress,
        ReservationStatus::Completed,
        ReservationStatus::Cancelled,
    ];

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Pending | Confirmed | InProgress, Cancelled)
        )
    }

    /// Returns true if the reservation can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(ReservationStatus::Cancelled)
    }

    /// Returns true if the reservation holds seats on its trip date.
    pub fn holds_seats(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::InProgress => "in_progress",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "pendiente" => Ok(ReservationStatus::Pending),
            "confirmed" | "confirmada" => Ok(ReservationStatus::Confirmed),
            "in_progress" | "en_curso" => Ok(ReservationStatus::InProgress),
            "completed" | "completada" => Ok(ReservationStatus::Completed),
            "cancelled" | "cancelada" => Ok(ReservationStatus::Cancelled),
            other => Err(UnknownStatus::new("reservation status", other)),
        }
    }
}

/// Purchase lifecycle: `Pending ──► Paid`, `Pending ──► Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    #[default]
    #[serde(alias = "pendiente")]
    Pending,
    #[serde(alias = "pagada")]
    Paid,
    #[serde(alias = "cancelada")]
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "paid" => Ok(PurchaseStatus::Paid),
            "cancelled" => Ok(PurchaseStatus::Cancelled),
            other => Err(UnknownStatus::new("purchase status", other)),
        }
    }
}

/// Payment resolution. Immutable once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "approved" => Ok(PaymentStatus::Approved),
            "rejected" => Ok(PaymentStatus::Rejected),
            other => Err(UnknownStatus::new("payment status", other)),
        }
    }
}

/// How a purchase is being paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card authorised by the gateway.
    #[serde(alias = "tarjeta")]
    Card,
    /// Deposit model: recorded now, confirmed later by an admin.
    #[serde(alias = "pago_posterior")]
    PayLater,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::PayLater => "pay_later",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" | "tarjeta" => Ok(PaymentMethod::Card),
            "pay_later" | "pago_posterior" => Ok(PaymentMethod::PayLater),
            other => Err(UnknownStatus::new("payment method", other)),
        }
    }
}

/// Availability of a trip date.
///
/// `Full` is derived from the seat counter; `Cancelled` is set by an admin
/// and blocks admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripDateStatus {
    #[default]
    #[serde(alias = "disponible")]
    Open,
    #[serde(alias = "completo")]
    Full,
    #[serde(alias = "cancelado")]
    Cancelled,
}

impl TripDateStatus {
    /// Status implied by the seat counter, keeping `Cancelled` sticky.
    pub fn derive(self, capacity: u32, occupied: u32) -> TripDateStatus {
        match self {
            TripDateStatus::Cancelled => TripDateStatus::Cancelled,
            _ if occupied >= capacity => TripDateStatus::Full,
            _ => TripDateStatus::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripDateStatus::Open => "open",
            TripDateStatus::Full => "full",
            TripDateStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TripDateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TripDateStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" | "disponible" => Ok(TripDateStatus::Open),
            "full" | "completo" => Ok(TripDateStatus::Full),
            "cancelled" | "cancelado" => Ok(TripDateStatus::Cancelled),
            other => Err(UnknownStatus::new("trip date status", other)),
        }
    }
}
