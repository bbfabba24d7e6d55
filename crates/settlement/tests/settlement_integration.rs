//! Integration tests for payment settlement.
//!
//! Purchases are created through the cart and reservation services so the
//! cascade is exercised on realistic data.

use booking_store::{BookingStore, InMemoryBookingStore, Trip, TripDate};
use chrono::NaiveDate;
use common::{
    Money, PaymentMethod, PaymentStatus, PurchaseStatus, ReservationStatus, TripDateId, UserId,
};
use domain::{
    Actor, AddCartItem, BookingError, BookingRules, CartService, CreateReservation,
    Notification, Outbox, ReservationService,
};
use settlement::{
    CardData, DeclineReason, GatewayConfig, PaymentSettlement, ProcessPayment, SettlementError,
    SimulatedGateway,
};

type Settlement = PaymentSettlement<InMemoryBookingStore, SimulatedGateway>;

fn settlement(store: &InMemoryBookingStore, outbox: Outbox) -> Settlement {
    PaymentSettlement::new(
        store.clone(),
        SimulatedGateway::new(GatewayConfig::instant()),
        outbox,
    )
}

async fn seed_date(store: &InMemoryBookingStore, price: Money) -> TripDateId {
    let trip = store
        .insert_trip(Trip::new("Cerro Chirripó", price))
        .await
        .unwrap();
    let day = NaiveDate::from_ymd_opt(2026, 12, 19).unwrap();
    store
        .insert_trip_date(TripDate::new(trip.id, day, day, 30))
        .await
        .unwrap()
        .id
}

async fn single_reservation(
    store: &InMemoryBookingStore,
    actor: &Actor,
    price: Money,
    party_size: u32,
) -> common::PurchaseId {
    let date = seed_date(store, price).await;
    ReservationService::new(store.clone(), BookingRules::default(), Outbox::disabled())
        .create(actor, CreateReservation::new(date, party_size))
        .await
        .unwrap()
        .purchase
        .id
}

mod card_payments {
    use super::*;

    #[tokio::test]
    async fn amex_approval_cascades_to_every_reservation() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let cart = CartService::new(store.clone(), BookingRules::default(), Outbox::disabled());
        let a = seed_date(&store, Money::from_dollars(50)).await;
        let b = seed_date(&store, Money::from_dollars(25)).await;
        for (trip_date_id, party_size) in [(a, 2), (b, 2)] {
            cart.add_item(
                &actor,
                AddCartItem {
                    trip_date_id,
                    party_size,
                    notes: None,
                },
            )
            .await
            .unwrap();
        }
        let checkout = cart.checkout(&actor).await.unwrap();
        assert_eq!(checkout.purchase.total, Money::from_dollars(150));

        let receipt = settlement(&store, Outbox::disabled())
            .process(
                &actor,
                ProcessPayment::card(checkout.purchase.id, CardData::new("378282246310005")),
            )
            .await
            .unwrap();

        assert_eq!(receipt.payment.status, PaymentStatus::Approved);
        assert_eq!(receipt.payment.amount, Money::from_dollars(150));
        assert!(receipt.payment.reference.starts_with("TXN-"));
        assert_eq!(receipt.purchase.status, PurchaseStatus::Paid);
        assert_eq!(receipt.reservations.len(), 2);

        let stored = store
            .reservations_for_purchase(checkout.purchase.id)
            .await
            .unwrap();
        assert!(
            stored
                .iter()
                .all(|r| r.status == ReservationStatus::Confirmed)
        );
    }

    #[tokio::test]
    async fn test_cards_are_deterministic() {
        let cases = [
            ("4111111111111111", None),
            ("5555555555554444", None),
            ("4000000000000002", Some(DeclineReason::InsufficientFunds)),
            ("4000000000000069", Some(DeclineReason::ExpiredCard)),
            ("1234567812345678", Some(DeclineReason::InvalidCard)),
        ];

        for _ in 0..2 {
            for (number, expected) in cases {
                let store = InMemoryBookingStore::new();
                let actor = Actor::customer(UserId::new());
                let purchase =
                    single_reservation(&store, &actor, Money::from_dollars(10), 1).await;

                let result = settlement(&store, Outbox::disabled())
                    .process(&actor, ProcessPayment::card(purchase, CardData::new(number)))
                    .await;

                match expected {
                    None => assert_eq!(
                        result.unwrap().payment.status,
                        PaymentStatus::Approved,
                        "{number}"
                    ),
                    Some(reason) => assert!(
                        matches!(result, Err(SettlementError::Declined(r)) if r == reason),
                        "{number}"
                    ),
                }
            }
        }
    }

    #[tokio::test]
    async fn declined_card_leaves_purchase_pending() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(40), 2).await;
        let service = settlement(&store, Outbox::disabled());

        let declined = service
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("4000000000000069")),
            )
            .await;
        assert!(declined.is_err());

        let stored = store.get_purchase(purchase).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);

        // A later attempt with a good card still goes through
        let receipt = service
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("4111 1111 1111 1111")),
            )
            .await
            .unwrap();
        assert_eq!(receipt.purchase.status, PurchaseStatus::Paid);
    }

    #[tokio::test]
    async fn paid_purchase_cannot_be_paid_again() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(40), 1).await;
        let service = settlement(&store, Outbox::disabled());
        service
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("4111111111111111")),
            )
            .await
            .unwrap();

        let again = service
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("4111111111111111")),
            )
            .await;
        assert!(matches!(
            again,
            Err(SettlementError::Booking(BookingError::NotFound { .. }))
        ));
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn approval_publishes_notification() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(40), 3).await;
        let (outbox, mut receiver) = Outbox::channel(4);

        settlement(&store, outbox)
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("4111111111111111")),
            )
            .await
            .unwrap();

        match receiver.recv().await {
            Some(Notification::PurchasePaid {
                purchase_id,
                total,
                reservations_confirmed,
                ..
            }) => {
                assert_eq!(purchase_id, purchase);
                assert_eq!(total, Money::from_dollars(120));
                assert_eq!(reservations_confirmed, 1);
            }
            other => panic!("expected PurchasePaid, got {other:?}"),
        }
    }
}

mod deferred_payments {
    use super::*;

    #[tokio::test]
    async fn pay_later_then_admin_confirms() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(80), 2).await;
        let service = settlement(&store, Outbox::disabled());

        let pending = service
            .process(&actor, ProcessPayment::pay_later(purchase))
            .await
            .unwrap();
        assert_eq!(pending.payment.method, PaymentMethod::PayLater);
        assert_eq!(pending.payment.status, PaymentStatus::Pending);
        assert!(pending.payment.reference.starts_with("PL-"));
        assert!(pending.authorization_code.is_none());
        assert_eq!(pending.purchase.status, PurchaseStatus::Pending);
        assert!(
            pending
                .reservations
                .iter()
                .all(|r| r.reservation.status == ReservationStatus::Pending)
        );

        let confirmed = service
            .confirm_deferred(&Actor::admin(UserId::new()), pending.payment.id)
            .await
            .unwrap();
        assert_eq!(confirmed.payment.status, PaymentStatus::Approved);
        assert_eq!(confirmed.purchase.status, PurchaseStatus::Paid);
        assert!(
            confirmed
                .reservations
                .iter()
                .all(|r| r.reservation.status == ReservationStatus::Confirmed)
        );
    }

    #[tokio::test]
    async fn confirming_requires_admin() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(80), 1).await;
        let service = settlement(&store, Outbox::disabled());
        let pending = service
            .process(&actor, ProcessPayment::pay_later(purchase))
            .await
            .unwrap();

        let result = service.confirm_deferred(&actor, pending.payment.id).await;
        assert!(matches!(
            result,
            Err(SettlementError::Booking(BookingError::Forbidden(_)))
        ));
    }

    #[tokio::test]
    async fn card_payment_cannot_be_confirmed() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(80), 1).await;
        let service = settlement(&store, Outbox::disabled());
        let paid = service
            .process(
                &actor,
                ProcessPayment::card(purchase, CardData::new("5555555555554444")),
            )
            .await
            .unwrap();

        let result = service
            .confirm_deferred(&Actor::admin(UserId::new()), paid.payment.id)
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::Booking(BookingError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn second_pay_later_is_conflict() {
        let store = InMemoryBookingStore::new();
        let actor = Actor::customer(UserId::new());
        let purchase = single_reservation(&store, &actor, Money::from_dollars(80), 1).await;
        let service = settlement(&store, Outbox::disabled());
        service
            .process(&actor, ProcessPayment::pay_later(purchase))
            .await
            .unwrap();

        let result = service
            .process(&actor, ProcessPayment::pay_later(purchase))
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::Booking(BookingError::Conflict(_)))
        ));
    }
}

#[test]
fn test_card_table_has_five_entries() {
    let store = InMemoryBookingStore::new();
    let cards = settlement(&store, Outbox::disabled()).test_cards();
    assert_eq!(cards.len(), 5);
    let json = serde_json::to_value(cards).unwrap();
    assert_eq!(json[0]["number"], "4111111111111111");
    assert_eq!(json[0]["outcome"], "approved");
}
