use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, Money, Page, PaymentId, PaymentStatus, PurchaseId, PurchaseStatus,
    ReservationId, ReservationStatus, TripDateId, TripDateStatus, TripId, UserId,
};
use tokio::sync::RwLock;

use crate::{
    Cart, CartItem, NewBooking, OccupancyChange, Payment, PaymentApproval, Purchase, Reservation,
    ReservationQuery, ResetSummary, Result, Settlement, StatusChange, StatusChangeOutcome,
    StoreError, Trip, TripDate, TripDateUpdate,
    store::{BookingStore, TripDateStream},
};

#[derive(Default)]
struct Tables {
    trips: HashMap<TripId, Trip>,
    trip_dates: BTreeMap<TripDateId, TripDate>,
    purchases: HashMap<PurchaseId, Purchase>,
    /// Insertion order; listing sorts by creation time.
    reservations: Vec<Reservation>,
    payments: HashMap<PaymentId, Payment>,
    carts: HashMap<CartId, Cart>,
    cart_items: Vec<CartItem>,
}

impl Tables {
    fn purchase_mut(&mut self, id: PurchaseId) -> Result<&mut Purchase> {
        self.purchases
            .get_mut(&id)
            .ok_or(StoreError::PurchaseNotFound(id))
    }

    /// Non-cancelled reservations on a date, oldest first.
    fn active_for_date(&self, trip_date_id: TripDateId) -> Vec<Reservation> {
        let mut active: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.trip_date_id == trip_date_id && r.status.holds_seats())
            .cloned()
            .collect();
        // Stable sort keeps insertion order on identical timestamps
        active.sort_by_key(|r| r.created_at);
        active
    }

    fn number_taken(&self, number: &str) -> bool {
        self.purchases.values().any(|p| p.number == number)
            || self.reservations.iter().any(|r| r.number == number)
    }

    /// Marks the purchase paid and confirms its pending reservations.
    fn cascade_paid(&mut self, purchase_id: PurchaseId) -> Result<(Purchase, Vec<Reservation>)> {
        let now = Utc::now();
        let purchase = self.purchase_mut(purchase_id)?;
        purchase.status = PurchaseStatus::Paid;
        purchase.updated_at = now;
        let purchase = purchase.clone();

        let mut confirmed = Vec::new();
        for reservation in self
            .reservations
            .iter_mut()
            .filter(|r| r.purchase_id == purchase_id && r.status == ReservationStatus::Pending)
        {
            reservation.status = ReservationStatus::Confirmed;
            reservation.updated_at = now;
            confirmed.push(reservation.clone());
        }
        Ok((purchase, confirmed))
    }

    fn ensure_pending(&self, purchase_id: PurchaseId) -> Result<()> {
        let purchase = self
            .purchases
            .get(&purchase_id)
            .ok_or(StoreError::PurchaseNotFound(purchase_id))?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(StoreError::StalePurchaseStatus {
                purchase_id,
                expected: PurchaseStatus::Pending,
                actual: purchase.status,
            });
        }
        Ok(())
    }
}

/// In-memory booking store for tests and local runs.
///
/// One write lock guards all tables, so every multi-row operation is
/// atomic with respect to every other.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reservation_count(&self) -> usize {
        self.tables.read().await.reservations.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    /// Inserts a purchase and its reservations without admitting seats,
    /// leaving `occupied` untouched. Models rows imported from a system
    /// that did not keep the counter in step.
    pub async fn import_booking(&self, booking: NewBooking) -> Result<()> {
        booking.validate()?;
        let mut tables = self.tables.write().await;
        tables
            .purchases
            .insert(booking.purchase.id, booking.purchase);
        tables.reservations.extend(booking.reservations);
        Ok(())
    }

    /// Overwrites the cached `occupied` counter of a date.
    pub async fn set_occupied(&self, id: TripDateId, occupied: u32) -> Result<()> {
        let mut tables = self.tables.write().await;
        let date = tables
            .trip_dates
            .get_mut(&id)
            .ok_or(StoreError::TripDateNotFound(id))?;
        date.occupied = occupied;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_trip(&self, trip: Trip) -> Result<Trip> {
        let mut tables = self.tables.write().await;
        tables.trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, id: TripId) -> Result<Option<Trip>> {
        Ok(self.tables.read().await.trips.get(&id).cloned())
    }

    async fn update_trip_price(&self, id: TripId, base_price: Money) -> Result<Trip> {
        let mut tables = self.tables.write().await;
        let trip = tables
            .trips
            .get_mut(&id)
            .ok_or(StoreError::TripNotFound(id))?;
        trip.base_price = base_price;
        Ok(trip.clone())
    }

    async fn insert_trip_date(&self, date: TripDate) -> Result<TripDate> {
        let mut tables = self.tables.write().await;
        if !tables.trips.contains_key(&date.trip_id) {
            return Err(StoreError::TripNotFound(date.trip_id));
        }
        tables.trip_dates.insert(date.id, date.clone());
        Ok(date)
    }

    async fn get_trip_date(&self, id: TripDateId) -> Result<Option<TripDate>> {
        Ok(self.tables.read().await.trip_dates.get(&id).cloned())
    }

    async fn list_trip_dates(&self, trip_id: TripId) -> Result<Vec<TripDate>> {
        let tables = self.tables.read().await;
        let mut dates: Vec<TripDate> = tables
            .trip_dates
            .values()
            .filter(|d| d.trip_id == trip_id)
            .cloned()
            .collect();
        dates.sort_by_key(|d| (d.starts_on, d.id));
        Ok(dates)
    }

    async fn update_trip_date(&self, id: TripDateId, update: TripDateUpdate) -> Result<TripDate> {
        let mut tables = self.tables.write().await;
        let date = tables
            .trip_dates
            .get_mut(&id)
            .ok_or(StoreError::TripDateNotFound(id))?;
        let mut updated = date.clone();
        update.apply(&mut updated)?;
        *date = updated.clone();
        Ok(updated)
    }

    async fn stream_trip_dates(&self) -> Result<TripDateStream> {
        let dates: Vec<TripDate> = self.tables.read().await.trip_dates.values().cloned().collect();
        Ok(Box::pin(futures_util::stream::iter(dates.into_iter().map(Ok))))
    }

    async fn admit(&self, booking: NewBooking) -> Result<(Purchase, Vec<Reservation>)> {
        booking.validate()?;
        let demand = booking.seat_demand();

        let mut tables = self.tables.write().await;

        // Check every date before touching any of them
        for &(trip_date_id, requested) in &demand {
            let date = tables
                .trip_dates
                .get(&trip_date_id)
                .ok_or(StoreError::TripDateNotFound(trip_date_id))?;
            if date.status == TripDateStatus::Cancelled {
                return Err(StoreError::TripDateUnavailable {
                    trip_date_id,
                    status: date.status,
                });
            }
            if date.remaining() < requested {
                return Err(StoreError::InsufficientCapacity {
                    trip_date_id,
                    requested,
                    remaining: date.remaining(),
                });
            }
        }

        // Unique constraint simulation
        let numbers = std::iter::once(&booking.purchase.number)
            .chain(booking.reservations.iter().map(|r| &r.number));
        for number in numbers {
            if tables.number_taken(number) {
                return Err(StoreError::DuplicateNumber(number.clone()));
            }
        }

        for (trip_date_id, requested) in demand {
            if let Some(date) = tables.trip_dates.get_mut(&trip_date_id) {
                date.occupied += requested;
                date.status = date.status.derive(date.capacity, date.occupied);
            }
        }

        let NewBooking {
            purchase,
            reservations,
            clear_items,
        } = booking;
        tables.purchases.insert(purchase.id, purchase.clone());
        tables.reservations.extend(reservations.iter().cloned());
        if !clear_items.is_empty() {
            tables.cart_items.retain(|item| !clear_items.contains(&item.id));
        }

        Ok((purchase, reservations))
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn list_reservations(&self, query: ReservationQuery) -> Result<Page<Reservation>> {
        let tables = self.tables.read().await;
        // Newest first; later insertions win ties on identical timestamps
        let mut matching: Vec<(usize, &Reservation)> = tables
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| query.matches(r))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.page.offset() as usize)
            .take(query.page.limit() as usize)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Page::new(items, total, query.page))
    }

    async fn reservations_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reservations
            .iter()
            .filter(|r| r.purchase_id == purchase_id)
            .cloned()
            .collect())
    }

    async fn active_reservations_for_date(
        &self,
        trip_date_id: TripDateId,
    ) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.active_for_date(trip_date_id))
    }

    async fn trip_date_snapshot(
        &self,
        trip_date_id: TripDateId,
    ) -> Result<Option<(TripDate, Vec<Reservation>)>> {
        let tables = self.tables.read().await;
        Ok(tables
            .trip_dates
            .get(&trip_date_id)
            .map(|date| (date.clone(), tables.active_for_date(trip_date_id))))
    }

    async fn transition_reservation(&self, change: StatusChange) -> Result<StatusChangeOutcome> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let reservation = tables
            .reservations
            .iter_mut()
            .find(|r| r.id == change.reservation_id)
            .ok_or(StoreError::ReservationNotFound(change.reservation_id))?;

        if reservation.status != change.expected {
            return Err(StoreError::StaleReservationStatus {
                reservation_id: change.reservation_id,
                expected: change.expected,
                actual: reservation.status,
            });
        }

        reservation.status = change.next;
        reservation.updated_at = now;
        if let Some(notes) = change.notes {
            reservation.notes = Some(notes);
        }
        let reservation = reservation.clone();

        let mut seats_released = 0;
        if change.expected.holds_seats() && !change.next.holds_seats() {
            let date = tables
                .trip_dates
                .get_mut(&reservation.trip_date_id)
                .ok_or(StoreError::TripDateNotFound(reservation.trip_date_id))?;
            date.occupied = date.occupied.saturating_sub(reservation.party_size);
            date.status = date.status.derive(date.capacity, date.occupied);
            seats_released = reservation.party_size;
        }

        let purchase_id = reservation.purchase_id;
        if change.next == ReservationStatus::Cancelled {
            let all_cancelled = tables
                .reservations
                .iter()
                .filter(|r| r.purchase_id == purchase_id)
                .all(|r| r.status == ReservationStatus::Cancelled);
            let purchase = tables.purchase_mut(purchase_id)?;
            if all_cancelled && purchase.status == PurchaseStatus::Pending {
                purchase.status = PurchaseStatus::Cancelled;
                purchase.updated_at = now;
            }
        }

        let purchase = tables.purchase_mut(purchase_id)?.clone();
        Ok(StatusChangeOutcome {
            reservation,
            purchase,
            seats_released,
        })
    }

    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        Ok(self.tables.read().await.purchases.get(&id).cloned())
    }

    async fn settle(&self, payment: Payment) -> Result<Settlement> {
        let mut tables = self.tables.write().await;

        tables.ensure_pending(payment.purchase_id)?;
        if tables
            .payments
            .values()
            .any(|p| p.purchase_id == payment.purchase_id)
        {
            return Err(StoreError::PaymentAlreadyExists(payment.purchase_id));
        }

        tables.payments.insert(payment.id, payment.clone());

        let (purchase, confirmed) = if payment.status == PaymentStatus::Approved {
            tables.cascade_paid(payment.purchase_id)?
        } else {
            (tables.purchase_mut(payment.purchase_id)?.clone(), Vec::new())
        };

        Ok(Settlement {
            payment,
            purchase,
            confirmed,
        })
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn payment_for_purchase(&self, purchase_id: PurchaseId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.purchase_id == purchase_id)
            .cloned())
    }

    async fn approve_payment(&self, approval: PaymentApproval) -> Result<Settlement> {
        let mut tables = self.tables.write().await;

        let payment = tables
            .payments
            .get(&approval.payment_id)
            .ok_or(StoreError::PaymentNotFound(approval.payment_id))?;
        if payment.status != PaymentStatus::Pending {
            return Err(StoreError::StalePaymentStatus {
                payment_id: approval.payment_id,
                expected: PaymentStatus::Pending,
                actual: payment.status,
            });
        }
        let purchase_id = payment.purchase_id;
        tables.ensure_pending(purchase_id)?;

        let payment = tables
            .payments
            .get_mut(&approval.payment_id)
            .ok_or(StoreError::PaymentNotFound(approval.payment_id))?;
        payment.status = PaymentStatus::Approved;
        payment.authorization_code = approval.authorization_code;
        payment.settled_at = Some(approval.settled_at);
        let payment = payment.clone();

        let (purchase, confirmed) = tables.cascade_paid(purchase_id)?;
        Ok(Settlement {
            payment,
            purchase,
            confirmed,
        })
    }

    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart> {
        let mut tables = self.tables.write().await;
        if let Some(cart) = tables.carts.values().find(|c| c.user_id == user_id) {
            return Ok(cart.clone());
        }
        let cart = Cart {
            id: CartId::new(),
            user_id,
            created_at: Utc::now(),
        };
        tables.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cart_items
            .iter()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn add_cart_item(&self, item: CartItem) -> Result<CartItem> {
        let mut tables = self.tables.write().await;
        if !tables.trip_dates.contains_key(&item.trip_date_id) {
            return Err(StoreError::TripDateNotFound(item.trip_date_id));
        }
        tables.cart_items.push(item.clone());
        Ok(item)
    }

    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let before = tables.cart_items.len();
        tables
            .cart_items
            .retain(|item| !(item.id == item_id && item.cart_id == cart_id));
        if tables.cart_items.len() == before {
            return Err(StoreError::CartItemNotFound(item_id));
        }
        Ok(())
    }

    async fn recompute_occupied(&self, trip_date_id: TripDateId) -> Result<OccupancyChange> {
        let mut tables = self.tables.write().await;

        let active: u32 = tables
            .reservations
            .iter()
            .filter(|r| r.trip_date_id == trip_date_id && r.status.holds_seats())
            .map(|r| r.party_size)
            .sum();

        let date = tables
            .trip_dates
            .get_mut(&trip_date_id)
            .ok_or(StoreError::TripDateNotFound(trip_date_id))?;
        let before = date.occupied;
        date.occupied = active;
        date.status = date.status.derive(date.capacity, date.occupied);

        Ok(OccupancyChange {
            trip_date_id,
            before,
            after: active,
        })
    }

    async fn reset_all(&self) -> Result<ResetSummary> {
        let mut tables = self.tables.write().await;

        let summary = ResetSummary {
            payments: tables.payments.len() as u64,
            reservations: tables.reservations.len() as u64,
            purchases: tables.purchases.len() as u64,
            cart_items: tables.cart_items.len() as u64,
            carts: tables.carts.len() as u64,
            trip_dates_reset: tables.trip_dates.len() as u64,
        };

        tables.payments.clear();
        tables.reservations.clear();
        tables.purchases.clear();
        tables.cart_items.clear();
        tables.carts.clear();
        for date in tables.trip_dates.values_mut() {
            date.occupied = 0;
            date.status = date.status.derive(date.capacity, 0);
        }

        Ok(summary)
    }
}
