use std::pin::Pin;

use async_trait::async_trait;
use common::{
    CartId, CartItemId, Money, Page, PaymentId, PurchaseId, ReservationId, TripDateId, TripId,
    UserId,
};
use futures_core::Stream;

use crate::{
    Cart, CartItem, NewBooking, OccupancyChange, Payment, PaymentApproval, Purchase, Reservation,
    ReservationQuery, ResetSummary, Result, Settlement, StatusChange, StatusChangeOutcome, Trip,
    TripDate, TripDateUpdate,
};

/// A stream of trip dates.
pub type TripDateStream = Pin<Box<dyn Stream<Item = Result<TripDate>> + Send>>;

/// Persistence for trips, the seat ledger, purchases, reservations,
/// payments and carts.
///
/// Every method that touches more than one row is atomic: either all of
/// its writes happen or none do. The store enforces row-level consistency
/// (capacity, compare-and-set on statuses, one payment per purchase);
/// ownership and the reservation state machine are the caller's job.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_trip(&self, trip: Trip) -> Result<Trip>;

    async fn get_trip(&self, id: TripId) -> Result<Option<Trip>>;

    /// Changes a trip's base price. Existing reservations keep their
    /// price snapshot.
    async fn update_trip_price(&self, id: TripId, base_price: Money) -> Result<Trip>;

    /// Inserts a trip date. Fails with `TripNotFound` if the trip is unknown.
    async fn insert_trip_date(&self, date: TripDate) -> Result<TripDate>;

    async fn get_trip_date(&self, id: TripDateId) -> Result<Option<TripDate>>;

    /// Dates of one trip, earliest departure first.
    async fn list_trip_dates(&self, trip_id: TripId) -> Result<Vec<TripDate>>;

    async fn update_trip_date(&self, id: TripDateId, update: TripDateUpdate) -> Result<TripDate>;

    /// Streams every trip date in the store, ordered by id.
    async fn stream_trip_dates(&self) -> Result<TripDateStream>;

    /// Admits the booking's seats and inserts its purchase and reservations.
    ///
    /// For each trip date the capacity check and the `occupied` increment
    /// are a single conditional write, so concurrent admissions can never
    /// oversell a date. Fails with `InsufficientCapacity` or
    /// `TripDateUnavailable` without writing anything.
    async fn admit(&self, booking: NewBooking) -> Result<(Purchase, Vec<Reservation>)>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Lists reservations matching the query, newest first.
    async fn list_reservations(&self, query: ReservationQuery) -> Result<Page<Reservation>>;

    async fn reservations_for_purchase(&self, purchase_id: PurchaseId)
    -> Result<Vec<Reservation>>;

    /// Non-cancelled reservations on a date, oldest first.
    async fn active_reservations_for_date(&self, trip_date_id: TripDateId)
    -> Result<Vec<Reservation>>;

    /// A trip date together with its non-cancelled reservations, read from
    /// one consistent view so the counter and the rows agree unless they
    /// have genuinely drifted.
    async fn trip_date_snapshot(
        &self,
        trip_date_id: TripDateId,
    ) -> Result<Option<(TripDate, Vec<Reservation>)>>;

    /// Applies a compare-and-set status change to a reservation.
    ///
    /// Moving from a seat-holding status to `cancelled` releases the
    /// reservation's seats (saturating at zero) and cancels the purchase
    /// if it is still pending and all of its reservations are cancelled.
    async fn transition_reservation(&self, change: StatusChange) -> Result<StatusChangeOutcome>;

    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>>;

    /// Records the payment of a pending purchase.
    ///
    /// If the payment is approved, the purchase becomes paid and its
    /// pending reservations are confirmed in the same unit.
    async fn settle(&self, payment: Payment) -> Result<Settlement>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn payment_for_purchase(&self, purchase_id: PurchaseId) -> Result<Option<Payment>>;

    /// Approves a pending payment with the same cascade as [`settle`](Self::settle).
    async fn approve_payment(&self, approval: PaymentApproval) -> Result<Settlement>;

    /// Returns the user's cart, creating it on first use.
    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart>;

    async fn cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>>;

    async fn add_cart_item(&self, item: CartItem) -> Result<CartItem>;

    /// Removes an item from the given cart. Fails with `CartItemNotFound`
    /// if the item is absent or belongs to another cart.
    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()>;

    /// Sets `occupied` to the seats held by the date's non-cancelled
    /// reservations, atomically with computing that sum, and re-derives
    /// open/full.
    async fn recompute_occupied(&self, trip_date_id: TripDateId) -> Result<OccupancyChange>;

    /// Deletes all transactional data and zeroes every seat counter.
    async fn reset_all(&self) -> Result<ResetSummary>;
}

/// Extension trait providing convenience methods for booking stores.
#[async_trait]
pub trait BookingStoreExt: BookingStore {
    /// Gets a trip date with the trip it belongs to.
    async fn trip_date_with_trip(&self, id: TripDateId) -> Result<Option<(TripDate, Trip)>> {
        let Some(date) = self.get_trip_date(id).await? else {
            return Ok(None);
        };
        let trip = self
            .get_trip(date.trip_id)
            .await?
            .ok_or(crate::StoreError::TripNotFound(date.trip_id))?;
        Ok(Some((date, trip)))
    }

    /// Seats still available on a date.
    async fn remaining_capacity(&self, id: TripDateId) -> Result<Option<u32>> {
        Ok(self.get_trip_date(id).await?.map(|d| d.remaining()))
    }
}

// Blanket implementation for all BookingStore implementations
impl<T: BookingStore + ?Sized> BookingStoreExt for T {}
