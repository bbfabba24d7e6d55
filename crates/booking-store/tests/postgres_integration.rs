//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p booking-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use booking_store::{
    BookingStore, BookingStoreExt, CartItem, NewBooking, Payment, PaymentApproval,
    PostgresBookingStore, Purchase, Reservation, ReservationQuery, StatusChange, StoreError, Trip,
    TripDate, TripDateUpdate,
};
use chrono::{NaiveDate, Utc};
use common::{
    Money, PageRequest, PaymentId, PaymentMethod, PaymentStatus, PurchaseStatus, ReservationId,
    ReservationStatus, TripDateId, TripDateStatus, UserId,
};
use futures_util::TryStreamExt;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_booking_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresBookingStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE payments, reservations, purchases, cart_items, carts, trip_dates, trips",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresBookingStore::new(pool)
}

async fn seed_date(store: &PostgresBookingStore, capacity: u32) -> TripDate {
    let trip = store
        .insert_trip(Trip::new("Cerro Chirripó", Money::from_dollars(150)))
        .await
        .unwrap();
    let starts = NaiveDate::from_ymd_opt(2026, 12, 5).unwrap();
    let ends = NaiveDate::from_ymd_opt(2026, 12, 7).unwrap();
    store
        .insert_trip_date(TripDate::new(trip.id, starts, ends, capacity))
        .await
        .unwrap()
}

fn booking(user_id: UserId, items: &[(TripDateId, u32)]) -> NewBooking {
    let unit = Money::from_dollars(150);
    let total = items
        .iter()
        .map(|&(_, n)| unit.checked_multiply(n).unwrap())
        .sum();
    let purchase = Purchase::new(format!("CMP-{}", uuid::Uuid::new_v4()), user_id, total);
    let reservations = items
        .iter()
        .map(|&(date_id, n)| {
            Reservation::new(
                format!("RES-{}", ReservationId::new()),
                &purchase,
                date_id,
                n,
                unit,
            )
            .unwrap()
        })
        .collect();
    NewBooking::new(purchase, reservations)
}

fn payment(purchase: &Purchase, status: PaymentStatus) -> Payment {
    Payment {
        id: PaymentId::new(),
        purchase_id: purchase.id,
        method: PaymentMethod::Card,
        amount: purchase.total,
        status,
        reference: "TXN-TEST".to_string(),
        authorization_code: None,
        settled_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[serial]
async fn admit_and_read_back() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    let user = UserId::new();

    let (purchase, reservations) = store.admit(booking(user, &[(date.id, 3)])).await.unwrap();

    let stored = store.get_reservation(reservations[0].id).await.unwrap().unwrap();
    assert_eq!(stored.party_size, 3);
    assert_eq!(stored.subtotal, Money::from_dollars(450));
    assert_eq!(stored.status, ReservationStatus::Pending);

    let stored_purchase = store.get_purchase(purchase.id).await.unwrap().unwrap();
    assert_eq!(stored_purchase.total, Money::from_dollars(450));

    assert_eq!(store.remaining_capacity(date.id).await.unwrap(), Some(7));
}

#[tokio::test]
#[serial]
async fn admission_refusal_reports_remaining() {
    let store = get_test_store().await;
    let date = seed_date(&store, 4).await;
    store
        .admit(booking(UserId::new(), &[(date.id, 3)]))
        .await
        .unwrap();

    let result = store.admit(booking(UserId::new(), &[(date.id, 2)])).await;

    assert!(matches!(
        result,
        Err(StoreError::InsufficientCapacity {
            requested: 2,
            remaining: 1,
            ..
        })
    ));
    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 3);
}

#[tokio::test]
#[serial]
async fn admission_refused_on_cancelled_date() {
    let store = get_test_store().await;
    let date = seed_date(&store, 4).await;
    store
        .update_trip_date(
            date.id,
            TripDateUpdate {
                status: Some(TripDateStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = store.admit(booking(UserId::new(), &[(date.id, 1)])).await;
    assert!(matches!(
        result,
        Err(StoreError::TripDateUnavailable { .. })
    ));
}

#[tokio::test]
#[serial]
async fn multi_date_admission_is_all_or_nothing() {
    let store = get_test_store().await;
    let roomy = seed_date(&store, 10).await;
    let tight = seed_date(&store, 1).await;

    let result = store
        .admit(booking(UserId::new(), &[(roomy.id, 2), (tight.id, 2)]))
        .await;
    assert!(result.is_err());

    let roomy = store.get_trip_date(roomy.id).await.unwrap().unwrap();
    assert_eq!(roomy.occupied, 0);
    let page = store
        .list_reservations(ReservationQuery::new())
        .await
        .unwrap();
    assert_eq!(page.total_items, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_admissions_never_oversell() {
    let store = get_test_store().await;
    let date = seed_date(&store, 5).await;

    let mut handles = Vec::new();
    for _ in 0..15 {
        let store = store.clone();
        let date_id = date.id;
        handles.push(tokio::spawn(async move {
            store.admit(booking(UserId::new(), &[(date_id, 1)])).await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(StoreError::InsufficientCapacity { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 5);
    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 5);
    assert_eq!(stored.status, TripDateStatus::Full);
}

#[tokio::test]
#[serial]
async fn duplicate_number_is_rejected_and_rolled_back() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    let first = booking(UserId::new(), &[(date.id, 1)]);
    let number = first.reservations[0].number.clone();
    store.admit(first).await.unwrap();

    let mut second = booking(UserId::new(), &[(date.id, 2)]);
    second.reservations[0].number = number;
    let result = store.admit(second).await;

    assert!(matches!(result, Err(StoreError::DuplicateNumber(_))));
    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 1);
}

#[tokio::test]
#[serial]
async fn cancellation_releases_seats_and_cancels_purchase() {
    let store = get_test_store().await;
    let date = seed_date(&store, 3).await;
    let (purchase, reservations) = store
        .admit(booking(UserId::new(), &[(date.id, 3)]))
        .await
        .unwrap();

    let outcome = store
        .transition_reservation(StatusChange {
            reservation_id: reservations[0].id,
            expected: ReservationStatus::Pending,
            next: ReservationStatus::Cancelled,
            notes: Some("cliente canceló".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(outcome.seats_released, 3);
    assert_eq!(outcome.reservation.notes.as_deref(), Some("cliente canceló"));
    assert_eq!(outcome.purchase.id, purchase.id);
    assert_eq!(outcome.purchase.status, PurchaseStatus::Cancelled);

    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 0);
    assert_eq!(stored.status, TripDateStatus::Open);
}

#[tokio::test]
#[serial]
async fn stale_transition_is_rejected() {
    let store = get_test_store().await;
    let date = seed_date(&store, 3).await;
    let (_, reservations) = store
        .admit(booking(UserId::new(), &[(date.id, 1)]))
        .await
        .unwrap();

    let result = store
        .transition_reservation(StatusChange {
            reservation_id: reservations[0].id,
            expected: ReservationStatus::Confirmed,
            next: ReservationStatus::Cancelled,
            notes: None,
        })
        .await;

    assert!(matches!(
        result,
        Err(StoreError::StaleReservationStatus { .. })
    ));
    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 1);
}

#[tokio::test]
#[serial]
async fn approved_settlement_cascades() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    let (purchase, _) = store
        .admit(booking(UserId::new(), &[(date.id, 2)]))
        .await
        .unwrap();

    let settlement = store
        .settle(payment(&purchase, PaymentStatus::Approved))
        .await
        .unwrap();

    assert_eq!(settlement.purchase.status, PurchaseStatus::Paid);
    assert_eq!(settlement.confirmed.len(), 1);
    let stored = store.payment_for_purchase(purchase.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Approved);

    let again = store
        .settle(payment(&purchase, PaymentStatus::Approved))
        .await;
    assert!(matches!(
        again,
        Err(StoreError::StalePurchaseStatus { .. })
    ));
}

#[tokio::test]
#[serial]
async fn deferred_payment_approval() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    let (purchase, _) = store
        .admit(booking(UserId::new(), &[(date.id, 2)]))
        .await
        .unwrap();

    let mut deferred = payment(&purchase, PaymentStatus::Pending);
    deferred.method = PaymentMethod::PayLater;
    let pending = store.settle(deferred).await.unwrap();
    assert!(pending.confirmed.is_empty());

    let duplicate = store
        .settle(payment(&purchase, PaymentStatus::Approved))
        .await;
    assert!(matches!(
        duplicate,
        Err(StoreError::PaymentAlreadyExists(_))
    ));

    let settled = store
        .approve_payment(PaymentApproval {
            payment_id: pending.payment.id,
            authorization_code: None,
            settled_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(settled.payment.status, PaymentStatus::Approved);
    assert_eq!(settled.purchase.status, PurchaseStatus::Paid);
    assert_eq!(settled.confirmed[0].status, ReservationStatus::Confirmed);
}

#[tokio::test]
#[serial]
async fn list_filters_and_pages() {
    let store = get_test_store().await;
    let date = seed_date(&store, 50).await;
    let user = UserId::new();
    for _ in 0..3 {
        store.admit(booking(user, &[(date.id, 1)])).await.unwrap();
    }
    store
        .admit(booking(UserId::new(), &[(date.id, 1)]))
        .await
        .unwrap();

    let page = store
        .list_reservations(ReservationQuery::for_user(user).page(PageRequest::new(2, 2)))
        .await
        .unwrap();
    assert_eq!(page.total_items, 3);
    assert_eq!(page.items.len(), 1);

    let confirmed = store
        .list_reservations(ReservationQuery::new().status(ReservationStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.total_items, 0);
}

#[tokio::test]
#[serial]
async fn recompute_repairs_drift() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    store
        .admit(booking(UserId::new(), &[(date.id, 4)]))
        .await
        .unwrap();

    sqlx::query("UPDATE trip_dates SET occupied = 9 WHERE id = $1")
        .bind(date.id.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();

    let change = store.recompute_occupied(date.id).await.unwrap();
    assert_eq!(change.before, 9);
    assert_eq!(change.after, 4);
    assert_eq!(change.delta(), -5);

    let idempotent = store.recompute_occupied(date.id).await.unwrap();
    assert!(!idempotent.changed());
}

#[tokio::test]
#[serial]
async fn stream_yields_every_date() {
    let store = get_test_store().await;
    for _ in 0..4 {
        seed_date(&store, 5).await;
    }

    let stream = store.stream_trip_dates().await.unwrap();
    let dates: Vec<TripDate> = stream.try_collect().await.unwrap();

    assert_eq!(dates.len(), 4);
    assert!(dates.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
#[serial]
async fn cart_lifecycle() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    let user = UserId::new();

    let cart = store.cart_for_user(user).await.unwrap();
    assert_eq!(store.cart_for_user(user).await.unwrap().id, cart.id);

    let item = store
        .add_cart_item(CartItem::new(cart.id, date.id, 2))
        .await
        .unwrap();
    let missing = store
        .add_cart_item(CartItem::new(cart.id, TripDateId::new(), 1))
        .await;
    assert!(matches!(missing, Err(StoreError::TripDateNotFound(_))));

    let pending = booking(user, &[(date.id, 2)]).clearing_items([item.id]);
    let late = store
        .add_cart_item(CartItem::new(cart.id, date.id, 1))
        .await
        .unwrap();
    store.admit(pending).await.unwrap();

    let remaining = store.cart_items(cart.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, late.id);

    let gone = store.remove_cart_item(cart.id, item.id).await;
    assert!(matches!(gone, Err(StoreError::CartItemNotFound(_))));
}

#[tokio::test]
#[serial]
async fn snapshot_matches_counter_and_rows() {
    let store = get_test_store().await;
    let date = seed_date(&store, 10).await;
    store
        .admit(booking(UserId::new(), &[(date.id, 2), (date.id, 3)]))
        .await
        .unwrap();

    let (snapshot, active) = store.trip_date_snapshot(date.id).await.unwrap().unwrap();
    assert_eq!(snapshot.occupied, 5);
    assert_eq!(active.len(), 2);
    assert_eq!(active.iter().map(|r| r.party_size).sum::<u32>(), 5);
    assert!(store.trip_date_snapshot(TripDateId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn reset_all_zeroes_counters() {
    let store = get_test_store().await;
    let date = seed_date(&store, 2).await;
    let (purchase, _) = store
        .admit(booking(UserId::new(), &[(date.id, 2)]))
        .await
        .unwrap();
    store
        .settle(payment(&purchase, PaymentStatus::Approved))
        .await
        .unwrap();

    let summary = store.reset_all().await.unwrap();
    assert_eq!(summary.payments, 1);
    assert_eq!(summary.reservations, 1);
    assert_eq!(summary.purchases, 1);
    assert_eq!(summary.trip_dates_reset, 1);

    let stored = store.get_trip_date(date.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 0);
    assert_eq!(stored.status, TripDateStatus::Open);
}
