//! Records persisted by the booking store.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use common::{
    CartId, CartItemId, Money, PaymentId, PaymentMethod, PaymentStatus, PurchaseId,
    PurchaseStatus, ReservationId, ReservationStatus, TripDateId, TripDateStatus, TripId, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// A catalog trip that guides run on several dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub base_price: Money,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(name: impl Into<String>, base_price: Money) -> Self {
        Self {
            id: TripId::new(),
            name: name.into(),
            base_price,
            created_at: Utc::now(),
        }
    }
}

/// A scheduled departure of a trip. This row is the seat ledger: `occupied`
/// is the cached count of seats held by non-cancelled reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDate {
    pub id: TripDateId,
    pub trip_id: TripId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub capacity: u32,
    pub occupied: u32,
    pub status: TripDateStatus,
    /// Date-specific price overriding the trip's base price.
    pub price: Option<Money>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TripDate {
    /// Creates an open date with no seats taken.
    pub fn new(trip_id: TripId, starts_on: NaiveDate, ends_on: NaiveDate, capacity: u32) -> Self {
        Self {
            id: TripDateId::new(),
            trip_id,
            starts_on,
            ends_on,
            capacity,
            occupied: 0,
            status: TripDateStatus::Open,
            price: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Seats still available, `capacity - occupied` (never negative).
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.occupied)
    }

    /// Price charged per person: the date price, or the trip's base price.
    pub fn effective_price(&self, trip: &Trip) -> Money {
        self.price.unwrap_or(trip.base_price)
    }
}

/// The order aggregating one or more reservations, settled by one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub number: String,
    pub user_id: UserId,
    pub total: Money,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(number: impl Into<String>, user_id: UserId, total: Money) -> Self {
        let now = Utc::now();
        Self {
            id: PurchaseId::new(),
            number: number.into(),
            user_id,
            total,
            status: PurchaseStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A booking of `party_size` seats on one trip date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub number: String,
    pub user_id: UserId,
    pub purchase_id: PurchaseId,
    pub trip_date_id: TripDateId,
    pub party_size: u32,
    /// Price per person captured at creation. Never rewritten.
    pub unit_price: Money,
    pub subtotal: Money,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a pending reservation with `subtotal = unit_price × party_size`.
    ///
    /// Fails with `InvalidBooking` if the subtotal overflows.
    pub fn new(
        number: impl Into<String>,
        purchase: &Purchase,
        trip_date_id: TripDateId,
        party_size: u32,
        unit_price: Money,
    ) -> Result<Self> {
        let number = number.into();
        let subtotal = unit_price.checked_multiply(party_size).ok_or_else(|| {
            StoreError::InvalidBooking(format!("subtotal of reservation {number} overflows"))
        })?;
        let now = Utc::now();
        Ok(Self {
            id: ReservationId::new(),
            number,
            user_id: purchase.user_id,
            purchase_id: purchase.id,
            trip_date_id,
            party_size,
            unit_price,
            subtotal,
            status: ReservationStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// The single payment attempt recorded for a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub purchase_id: PurchaseId,
    pub method: PaymentMethod,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Gateway transaction id, or a placeholder for deferred payments.
    pub reference: String,
    pub authorization_code: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub trip_date_id: TripDateId,
    pub party_size: u32,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(cart_id: CartId, trip_date_id: TripDateId, party_size: u32) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            trip_date_id,
            party_size,
            notes: None,
            added_at: Utc::now(),
        }
    }
}

/// A purchase with its reservations, admitted as one atomic unit.
///
/// The cart items listed in `clear_items` are deleted in the same unit.
/// Items added to the cart after the booking was built are left alone.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub purchase: Purchase,
    pub reservations: Vec<Reservation>,
    pub clear_items: Vec<CartItemId>,
}

impl NewBooking {
    pub fn new(purchase: Purchase, reservations: Vec<Reservation>) -> Self {
        Self {
            purchase,
            reservations,
            clear_items: Vec::new(),
        }
    }

    /// Removes the given cart items once the booking is admitted.
    pub fn clearing_items(mut self, items: impl IntoIterator<Item = CartItemId>) -> Self {
        self.clear_items.extend(items);
        self
    }

    /// Seats requested per trip date, ordered by date id.
    ///
    /// The ordering fixes the row-lock order during admission.
    pub fn seat_demand(&self) -> Vec<(TripDateId, u32)> {
        let mut demand: BTreeMap<TripDateId, u32> = BTreeMap::new();
        for reservation in &self.reservations {
            *demand.entry(reservation.trip_date_id).or_default() += reservation.party_size;
        }
        demand.into_iter().collect()
    }

    /// Checks the booking is internally consistent before it is written.
    pub fn validate(&self) -> Result<()> {
        if self.reservations.is_empty() {
            return Err(StoreError::InvalidBooking(
                "a booking needs at least one reservation".to_string(),
            ));
        }
        for reservation in &self.reservations {
            if reservation.purchase_id != self.purchase.id {
                return Err(StoreError::InvalidBooking(format!(
                    "reservation {} does not belong to purchase {}",
                    reservation.number, self.purchase.number
                )));
            }
            if reservation.party_size == 0 {
                return Err(StoreError::InvalidBooking(format!(
                    "reservation {} has no seats",
                    reservation.number
                )));
            }
        }
        let total = self
            .reservations
            .iter()
            .try_fold(Money::zero(), |acc, r| acc.checked_add(r.subtotal))
            .ok_or_else(|| StoreError::InvalidBooking("booking total overflows".to_string()))?;
        if total != self.purchase.total {
            return Err(StoreError::InvalidBooking(format!(
                "purchase total {} does not match reservation subtotals {}",
                self.purchase.total, total
            )));
        }
        Ok(())
    }
}

/// A compare-and-set status change on a reservation.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub reservation_id: ReservationId,
    /// Status the caller read; the write fails if the row moved on.
    pub expected: ReservationStatus,
    pub next: ReservationStatus,
    /// Replaces the reservation notes when set.
    pub notes: Option<String>,
}

/// Result of a reservation status change.
#[derive(Debug, Clone)]
pub struct StatusChangeOutcome {
    pub reservation: Reservation,
    pub purchase: Purchase,
    /// Seats given back to the trip date by this change.
    pub seats_released: u32,
}

/// Approval of a pending (deferred) payment.
#[derive(Debug, Clone)]
pub struct PaymentApproval {
    pub payment_id: PaymentId,
    pub authorization_code: Option<String>,
    pub settled_at: DateTime<Utc>,
}

/// Result of recording or approving a payment.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment: Payment,
    pub purchase: Purchase,
    /// Reservations moved from pending to confirmed by this settlement.
    pub confirmed: Vec<Reservation>,
}

/// Partial update of a trip date. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TripDateUpdate {
    pub capacity: Option<u32>,
    pub price: Option<Option<Money>>,
    pub status: Option<TripDateStatus>,
    pub notes: Option<Option<String>>,
}

impl TripDateUpdate {
    /// Applies the update to a date, re-deriving open/full.
    pub fn apply(&self, date: &mut TripDate) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if capacity < date.occupied {
                return Err(StoreError::CapacityBelowOccupied {
                    trip_date_id: date.id,
                    capacity,
                    occupied: date.occupied,
                });
            }
            date.capacity = capacity;
        }
        if let Some(price) = self.price {
            date.price = price;
        }
        if let Some(notes) = &self.notes {
            date.notes = notes.clone();
        }
        let status = self.status.unwrap_or(date.status);
        date.status = match status {
            TripDateStatus::Cancelled => TripDateStatus::Cancelled,
            _ => TripDateStatus::Open.derive(date.capacity, date.occupied),
        };
        Ok(())
    }
}

/// Before/after of an occupied-counter recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyChange {
    pub trip_date_id: TripDateId,
    pub before: u32,
    pub after: u32,
}

impl OccupancyChange {
    pub fn delta(&self) -> i64 {
        i64::from(self.after) - i64::from(self.before)
    }

    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Row counts removed by a full reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub payments: u64,
    pub reservations: u64,
    pub purchases: u64,
    pub cart_items: u64,
    pub carts: u64,
    pub trip_dates_reset: u64,
}
