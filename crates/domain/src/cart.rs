//! Shopping cart and checkout.

use std::collections::HashSet;

use booking_store::{BookingStore, BookingStoreExt, CartItem, NewBooking, Purchase, Reservation};
use common::{CartId, CartItemId, Money, TripDateId, TripDateStatus};
use serde::Serialize;

use crate::notify::{Notification, Outbox};
use crate::numbers::{purchase_number, reservation_number};
use crate::{Actor, BookingError, BookingRules, Result};

#[derive(Debug, Clone)]
pub struct AddCartItem {
    pub trip_date_id: TripDateId,
    pub party_size: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub items: Vec<CartItem>,
}

/// The purchase and reservations produced by a checkout.
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub purchase: Purchase,
    pub reservations: Vec<Reservation>,
}

pub struct CartService<S: BookingStore> {
    store: S,
    rules: BookingRules,
    outbox: Outbox,
}

impl<S: BookingStore> CartService<S> {
    pub fn new(store: S, rules: BookingRules, outbox: Outbox) -> Self {
        Self {
            store,
            rules,
            outbox,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn items(&self, actor: &Actor) -> Result<CartView> {
        let cart = self.store.cart_for_user(actor.user_id).await?;
        let items = self.store.cart_items(cart.id).await?;
        Ok(CartView {
            cart_id: cart.id,
            items,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, actor: &Actor, cmd: AddCartItem) -> Result<CartItem> {
        self.rules.validate_party_size(cmd.party_size)?;
        self.rules.validate_notes(cmd.notes.as_deref())?;

        let date = self
            .store
            .get_trip_date(cmd.trip_date_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip date", cmd.trip_date_id))?;
        if date.status == TripDateStatus::Cancelled {
            return Err(BookingError::Conflict(format!(
                "trip date {} is cancelled",
                date.id
            )));
        }

        let cart = self.store.cart_for_user(actor.user_id).await?;
        let mut item = CartItem::new(cart.id, date.id, cmd.party_size);
        item.notes = cmd.notes;
        Ok(self.store.add_cart_item(item).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, actor: &Actor, item_id: CartItemId) -> Result<()> {
        let cart = self.store.cart_for_user(actor.user_id).await?;
        Ok(self.store.remove_cart_item(cart.id, item_id).await?)
    }

    /// Turns the cart into one purchase with one reservation per item.
    ///
    /// Every date must have room for its items; otherwise nothing is
    /// booked and the cart is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, actor: &Actor) -> Result<Checkout> {
        let cart = self.store.cart_for_user(actor.user_id).await?;
        let items = self.store.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(BookingError::validation("cart", "is empty"));
        }

        let mut priced = Vec::with_capacity(items.len());
        for item in &items {
            let (date, trip) = self
                .store
                .trip_date_with_trip(item.trip_date_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Trip date", item.trip_date_id))?;
            if date.status == TripDateStatus::Cancelled {
                return Err(BookingError::Conflict(format!(
                    "trip date {} is cancelled",
                    date.id
                )));
            }
            priced.push((item, date.effective_price(&trip)));
        }

        let total = priced
            .iter()
            .try_fold(Money::zero(), |acc, (item, unit)| {
                unit.checked_multiply(item.party_size)
                    .and_then(|subtotal| acc.checked_add(subtotal))
            })
            .ok_or_else(|| BookingError::validation("cart", "total price is too large"))?;
        let purchase = Purchase::new(purchase_number(), actor.user_id, total);

        let mut numbers = HashSet::new();
        let reservations = priced
            .into_iter()
            .map(|(item, unit)| {
                let mut number = reservation_number();
                while !numbers.insert(number.clone()) {
                    number = reservation_number();
                }
                Ok(
                    Reservation::new(number, &purchase, item.trip_date_id, item.party_size, unit)?
                        .with_notes(item.notes.clone()),
                )
            })
            .collect::<Result<Vec<Reservation>>>()?;

        // Only the items priced above; anything added meanwhile stays in the cart
        let booking = NewBooking::new(purchase.clone(), reservations.clone())
            .clearing_items(items.iter().map(|item| item.id));
        self.store.admit(booking).await.map_err(|e| {
            let err = BookingError::from(e);
            metrics::counter!("reservations_rejected_total", "reason" => err.reason())
                .increment(1);
            err
        })?;

        metrics::counter!("reservations_created_total").increment(reservations.len() as u64);
        tracing::info!(
            purchase_id = %purchase.id,
            number = %purchase.number,
            reservations = reservations.len(),
            total = %purchase.total,
            "cart checked out"
        );

        self.outbox.publish(Notification::PurchaseCheckedOut {
            purchase_id: purchase.id,
            number: purchase.number.clone(),
            user_id: purchase.user_id,
            reservations: reservations.len(),
        });

        Ok(Checkout {
            purchase,
            reservations,
        })
    }
}

#[cfg(test)]
mod tests {
    use booking_store::{InMemoryBookingStore, Trip, TripDate};
    use chrono::NaiveDate;
    use common::UserId;

    use super::*;

    async fn seed(store: &InMemoryBookingStore, capacity: u32, price: Option<Money>) -> TripDate {
        let trip = store
            .insert_trip(Trip::new("Rincón de la Vieja", Money::from_dollars(100)))
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 11, 14).unwrap();
        let mut date = TripDate::new(trip.id, day, day, capacity);
        date.price = price;
        store.insert_trip_date(date).await.unwrap()
    }

    fn item(trip_date_id: TripDateId, party_size: u32) -> AddCartItem {
        AddCartItem {
            trip_date_id,
            party_size,
            notes: None,
        }
    }

    fn service(store: &InMemoryBookingStore) -> CartService<InMemoryBookingStore> {
        CartService::new(store.clone(), BookingRules::default(), Outbox::disabled())
    }

    #[tokio::test]
    async fn test_checkout_creates_one_purchase() {
        let store = InMemoryBookingStore::new();
        let a = seed(&store, 10, None).await;
        let b = seed(&store, 10, Some(Money::from_dollars(80))).await;
        let cart = service(&store);
        let actor = Actor::customer(UserId::new());

        cart.add_item(&actor, item(a.id, 2)).await.unwrap();
        cart.add_item(&actor, item(b.id, 1)).await.unwrap();

        let checkout = cart.checkout(&actor).await.unwrap();
        assert_eq!(checkout.reservations.len(), 2);
        assert_eq!(checkout.purchase.total, Money::from_dollars(280));
        assert!(
            checkout
                .reservations
                .iter()
                .all(|r| r.purchase_id == checkout.purchase.id)
        );
        assert!(cart.items(&actor).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_cannot_check_out() {
        let store = InMemoryBookingStore::new();
        let result = service(&store)
            .checkout(&Actor::customer(UserId::new()))
            .await;
        assert!(matches!(
            result,
            Err(BookingError::Validation { field: "cart", .. })
        ));
    }

    #[tokio::test]
    async fn test_checkout_rejects_overflowing_total() {
        let store = InMemoryBookingStore::new();
        let pricey = seed(&store, 50, Some(Money::from_cents(i64::MAX / 10))).await;
        let cart = service(&store);
        let actor = Actor::customer(UserId::new());
        cart.add_item(&actor, item(pricey.id, 20)).await.unwrap();

        let result = cart.checkout(&actor).await;

        assert!(matches!(
            result,
            Err(BookingError::Validation { field: "cart", .. })
        ));
        assert_eq!(cart.items(&actor).await.unwrap().items.len(), 1);
        let stored = store.get_trip_date(pricey.id).await.unwrap().unwrap();
        assert_eq!(stored.occupied, 0);
    }

    #[tokio::test]
    async fn test_remove_item_of_other_user_is_not_found() {
        let store = InMemoryBookingStore::new();
        let date = seed(&store, 10, None).await;
        let cart = service(&store);
        let owner = Actor::customer(UserId::new());
        let added = cart.add_item(&owner, item(date.id, 1)).await.unwrap();

        let result = cart
            .remove_item(&Actor::customer(UserId::new()), added.id)
            .await;
        assert!(matches!(result, Err(BookingError::NotFound { .. })));

        cart.remove_item(&owner, added.id).await.unwrap();
        assert!(cart.items(&owner).await.unwrap().items.is_empty());
    }
}
