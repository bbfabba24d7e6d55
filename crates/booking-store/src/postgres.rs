use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, Money, Page, PaymentId, PaymentStatus, PurchaseId, PurchaseStatus,
    ReservationId, ReservationStatus, TripDateId, TripDateStatus, TripId, UserId,
};
use futures_util::{TryStreamExt, stream};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cart, CartItem, NewBooking, OccupancyChange, Payment, PaymentApproval, Purchase, Reservation,
    ReservationQuery, ResetSummary, Result, Settlement, StatusChange, StatusChangeOutcome,
    StoreError, Trip, TripDate, TripDateUpdate,
    store::{BookingStore, TripDateStream},
};

const TRIP_COLUMNS: &str = "id, name, base_price_cents, created_at";

const TRIP_DATE_COLUMNS: &str =
    "id, trip_id, starts_on, ends_on, capacity, occupied, status, price_cents, notes, created_at";

const PURCHASE_COLUMNS: &str = "id, number, user_id, total_cents, status, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, number, user_id, purchase_id, trip_date_id, party_size, \
     unit_price_cents, subtotal_cents, status, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, purchase_id, method, amount_cents, status, reference, \
     authorization_code, settled_at, created_at";

const CART_ITEM_COLUMNS: &str = "id, cart_id, trip_date_id, party_size, notes, added_at";

/// Trip dates fetched per round trip while streaming.
const STREAM_BATCH: i64 = 500;

type Tx = Transaction<'static, Postgres>;

/// Position of a trip date stream: the pool and the last id yielded.
type StreamCursor = Option<(PgPool, Option<Uuid>)>;

/// PostgreSQL-backed booking store.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_trip(row: PgRow) -> Result<Trip> {
        Ok(Trip {
            id: TripId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            base_price: Money::from_cents(row.try_get("base_price_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_trip_date(row: PgRow) -> Result<TripDate> {
        Ok(TripDate {
            id: TripDateId::from_uuid(row.try_get("id")?),
            trip_id: TripId::from_uuid(row.try_get("trip_id")?),
            starts_on: row.try_get("starts_on")?,
            ends_on: row.try_get("ends_on")?,
            capacity: to_u32(row.try_get("capacity")?)?,
            occupied: to_u32(row.try_get("occupied")?)?,
            status: row.try_get::<String, _>("status")?.parse()?,
            price: row
                .try_get::<Option<i64>, _>("price_cents")?
                .map(Money::from_cents),
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_purchase(row: PgRow) -> Result<Purchase> {
        Ok(Purchase {
            id: PurchaseId::from_uuid(row.try_get("id")?),
            number: row.try_get("number")?,
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            status: row.try_get::<String, _>("status")?.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get("id")?),
            number: row.try_get("number")?,
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            purchase_id: PurchaseId::from_uuid(row.try_get("purchase_id")?),
            trip_date_id: TripDateId::from_uuid(row.try_get("trip_date_id")?),
            party_size: to_u32(row.try_get("party_size")?)?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            status: row.try_get::<String, _>("status")?.parse()?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get("id")?),
            purchase_id: PurchaseId::from_uuid(row.try_get("purchase_id")?),
            method: row.try_get::<String, _>("method")?.parse()?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: row.try_get::<String, _>("status")?.parse()?,
            reference: row.try_get("reference")?,
            authorization_code: row.try_get("authorization_code")?,
            settled_at: row.try_get("settled_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get("id")?),
            cart_id: CartId::from_uuid(row.try_get("cart_id")?),
            trip_date_id: TripDateId::from_uuid(row.try_get("trip_date_id")?),
            party_size: to_u32(row.try_get("party_size")?)?,
            notes: row.try_get("notes")?,
            added_at: row.try_get("added_at")?,
        })
    }

    /// Works out why a conditional admission touched no row.
    async fn admission_refusal(
        tx: &mut Tx,
        trip_date_id: TripDateId,
        requested: u32,
    ) -> Result<StoreError> {
        let row = sqlx::query("SELECT capacity, occupied, status FROM trip_dates WHERE id = $1")
            .bind(trip_date_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        let Some(row) = row else {
            return Ok(StoreError::TripDateNotFound(trip_date_id));
        };

        let status: TripDateStatus = row.try_get::<String, _>("status")?.parse()?;
        if status == TripDateStatus::Cancelled {
            return Ok(StoreError::TripDateUnavailable {
                trip_date_id,
                status,
            });
        }

        let capacity = to_u32(row.try_get("capacity")?)?;
        let occupied = to_u32(row.try_get("occupied")?)?;
        Ok(StoreError::InsufficientCapacity {
            trip_date_id,
            requested,
            remaining: capacity.saturating_sub(occupied),
        })
    }

    async fn lock_pending_purchase(tx: &mut Tx, purchase_id: PurchaseId) -> Result<Purchase> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(purchase_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::PurchaseNotFound(purchase_id))?;

        let purchase = Self::row_to_purchase(row)?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(StoreError::StalePurchaseStatus {
                purchase_id,
                expected: PurchaseStatus::Pending,
                actual: purchase.status,
            });
        }
        Ok(purchase)
    }

    /// Marks the purchase paid and confirms its pending reservations.
    async fn cascade_paid(
        tx: &mut Tx,
        purchase_id: PurchaseId,
    ) -> Result<(Purchase, Vec<Reservation>)> {
        let now = Utc::now();

        let sql = format!(
            "UPDATE purchases SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {PURCHASE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(purchase_id.as_uuid())
            .bind(PurchaseStatus::Paid.as_str())
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;
        let purchase = Self::row_to_purchase(row)?;

        let sql = format!(
            r#"
            UPDATE reservations SET status = $2, updated_at = $3
            WHERE purchase_id = $1 AND status = $4
            RETURNING {RESERVATION_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(purchase_id.as_uuid())
            .bind(ReservationStatus::Confirmed.as_str())
            .bind(now)
            .bind(ReservationStatus::Pending.as_str())
            .fetch_all(&mut **tx)
            .await?;
        let confirmed = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;

        Ok((purchase, confirmed))
    }

    async fn next_trip_date_batch(
        cursor: StreamCursor,
    ) -> Result<Option<(Vec<TripDate>, StreamCursor)>> {
        let Some((pool, after)) = cursor else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {TRIP_DATE_COLUMNS} FROM trip_dates WHERE $1::uuid IS NULL OR id > $1 ORDER BY id LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(STREAM_BATCH)
            .fetch_all(&pool)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let dates = rows
            .into_iter()
            .map(Self::row_to_trip_date)
            .collect::<Result<Vec<_>>>()?;
        let next = if (dates.len() as i64) < STREAM_BATCH {
            None
        } else {
            dates.last().map(|d| (pool.clone(), Some(d.id.as_uuid())))
        };
        Ok(Some((dates, next)))
    }
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative count {value}")))
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("count {value} out of range")))
}

fn push_reservation_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ReservationQuery) {
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.as_uuid());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(trip_date_id) = query.trip_date_id {
        builder
            .push(" AND trip_date_id = ")
            .push_bind(trip_date_id.as_uuid());
    }
    if let Some(purchase_id) = query.purchase_id {
        builder
            .push(" AND purchase_id = ")
            .push_bind(purchase_id.as_uuid());
    }
    if let Some(from) = query.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert_trip(&self, trip: Trip) -> Result<Trip> {
        sqlx::query(
            "INSERT INTO trips (id, name, base_price_cents, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(trip.id.as_uuid())
        .bind(&trip.name)
        .bind(trip.base_price.cents())
        .bind(trip.created_at)
        .execute(&self.pool)
        .await?;

        Ok(trip)
    }

    async fn get_trip(&self, id: TripId) -> Result<Option<Trip>> {
        let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_trip).transpose()
    }

    async fn update_trip_price(&self, id: TripId, base_price: Money) -> Result<Trip> {
        let sql = format!(
            "UPDATE trips SET base_price_cents = $2 WHERE id = $1 RETURNING {TRIP_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(base_price.cents())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::TripNotFound(id))?;

        Self::row_to_trip(row)
    }

    async fn insert_trip_date(&self, date: TripDate) -> Result<TripDate> {
        sqlx::query(
            r#"
            INSERT INTO trip_dates (id, trip_id, starts_on, ends_on, capacity, occupied, status, price_cents, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(date.id.as_uuid())
        .bind(date.trip_id.as_uuid())
        .bind(date.starts_on)
        .bind(date.ends_on)
        .bind(to_i32(date.capacity)?)
        .bind(to_i32(date.occupied)?)
        .bind(date.status.as_str())
        .bind(date.price.map(|p| p.cents()))
        .bind(&date.notes)
        .bind(date.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("trip_dates_trip_id_fkey")
            {
                return StoreError::TripNotFound(date.trip_id);
            }
            StoreError::Database(e)
        })?;

        Ok(date)
    }

    async fn get_trip_date(&self, id: TripDateId) -> Result<Option<TripDate>> {
        let sql = format!("SELECT {TRIP_DATE_COLUMNS} FROM trip_dates WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_trip_date).transpose()
    }

    async fn list_trip_dates(&self, trip_id: TripId) -> Result<Vec<TripDate>> {
        let sql = format!(
            "SELECT {TRIP_DATE_COLUMNS} FROM trip_dates WHERE trip_id = $1 ORDER BY starts_on ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(trip_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_trip_date).collect()
    }

    async fn update_trip_date(&self, id: TripDateId, update: TripDateUpdate) -> Result<TripDate> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {TRIP_DATE_COLUMNS} FROM trip_dates WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::TripDateNotFound(id))?;

        let mut date = Self::row_to_trip_date(row)?;
        update.apply(&mut date)?;

        sqlx::query(
            r#"
            UPDATE trip_dates
            SET capacity = $2, status = $3, price_cents = $4, notes = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(to_i32(date.capacity)?)
        .bind(date.status.as_str())
        .bind(date.price.map(|p| p.cents()))
        .bind(&date.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(date)
    }

    async fn stream_trip_dates(&self) -> Result<TripDateStream> {
        let batches = stream::try_unfold(
            Some((self.pool.clone(), None)),
            Self::next_trip_date_batch,
        );
        let dates = batches
            .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<TripDate, StoreError>)))
            .try_flatten();

        Ok(Box::pin(dates))
    }

    async fn admit(&self, booking: NewBooking) -> Result<(Purchase, Vec<Reservation>)> {
        booking.validate()?;

        let mut tx = self.pool.begin().await?;

        // Check and increment in one statement; the row lock it takes is
        // held until commit, so concurrent admissions queue on the date.
        for (trip_date_id, requested) in booking.seat_demand() {
            let admitted = sqlx::query(
                r#"
                UPDATE trip_dates
                SET occupied = occupied + $2,
                    status = CASE WHEN occupied + $2 >= capacity THEN 'full' ELSE status END
                WHERE id = $1 AND status <> 'cancelled' AND capacity - occupied >= $2
                "#,
            )
            .bind(trip_date_id.as_uuid())
            .bind(to_i32(requested)?)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if admitted == 0 {
                let refusal = Self::admission_refusal(&mut tx, trip_date_id, requested).await?;
                tracing::debug!(%trip_date_id, requested, reason = %refusal, "Seat admission refused");
                return Err(refusal);
            }
        }

        let purchase = &booking.purchase;
        sqlx::query(
            r#"
            INSERT INTO purchases (id, number, user_id, total_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(&purchase.number)
        .bind(purchase.user_id.as_uuid())
        .bind(purchase.total.cents())
        .bind(purchase.status.as_str())
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("purchases_number_key")
            {
                return StoreError::DuplicateNumber(purchase.number.clone());
            }
            StoreError::Database(e)
        })?;

        for reservation in &booking.reservations {
            sqlx::query(
                r#"
                INSERT INTO reservations (id, number, user_id, purchase_id, trip_date_id, party_size,
                    unit_price_cents, subtotal_cents, status, notes, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(reservation.id.as_uuid())
            .bind(&reservation.number)
            .bind(reservation.user_id.as_uuid())
            .bind(reservation.purchase_id.as_uuid())
            .bind(reservation.trip_date_id.as_uuid())
            .bind(to_i32(reservation.party_size)?)
            .bind(reservation.unit_price.cents())
            .bind(reservation.subtotal.cents())
            .bind(reservation.status.as_str())
            .bind(&reservation.notes)
            .bind(reservation.created_at)
            .bind(reservation.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("reservations_number_key")
                {
                    return StoreError::DuplicateNumber(reservation.number.clone());
                }
                StoreError::Database(e)
            })?;
        }

        if !booking.clear_items.is_empty() {
            let item_ids: Vec<Uuid> =
                booking.clear_items.iter().map(|id| id.as_uuid()).collect();
            sqlx::query("DELETE FROM cart_items WHERE id = ANY($1)")
                .bind(&item_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((booking.purchase, booking.reservations))
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn list_reservations(&self, query: ReservationQuery) -> Result<Page<Reservation>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM reservations WHERE TRUE");
        push_reservation_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE TRUE"
        ));
        push_reservation_filters(&mut select, &query);
        select
            .push(" ORDER BY created_at DESC, number DESC LIMIT ")
            .push_bind(query.page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, query.page))
    }

    async fn reservations_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE purchase_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(purchase_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn active_reservations_for_date(
        &self,
        trip_date_id: TripDateId,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE trip_date_id = $1 AND status <> 'cancelled'
            ORDER BY created_at ASC, number ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(trip_date_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn trip_date_snapshot(
        &self,
        trip_date_id: TripDateId,
    ) -> Result<Option<(TripDate, Vec<Reservation>)>> {
        // Both reads see the same snapshot of committed data
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {TRIP_DATE_COLUMNS} FROM trip_dates WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(trip_date_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };
        let date = Self::row_to_trip_date(row)?;

        let sql = format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE trip_date_id = $1 AND status <> 'cancelled'
            ORDER BY created_at ASC, number ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(trip_date_id.as_uuid())
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let active = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((date, active)))
    }

    async fn transition_reservation(&self, change: StatusChange) -> Result<StatusChangeOutcome> {
        let reservation_id = change.reservation_id;
        let mut tx = self.pool.begin().await?;

        // Lock the purchase before the reservation, the same order
        // settlement uses.
        let purchase_id: Uuid =
            sqlx::query_scalar("SELECT purchase_id FROM reservations WHERE id = $1")
                .bind(reservation_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        sqlx::query("SELECT id FROM purchases WHERE id = $1 FOR UPDATE")
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(reservation_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
        let current = Self::row_to_reservation(row)?;

        if current.status != change.expected {
            return Err(StoreError::StaleReservationStatus {
                reservation_id,
                expected: change.expected,
                actual: current.status,
            });
        }

        let now = Utc::now();
        let sql = format!(
            r#"
            UPDATE reservations SET status = $2, notes = COALESCE($3, notes), updated_at = $4
            WHERE id = $1
            RETURNING {RESERVATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(reservation_id.as_uuid())
            .bind(change.next.as_str())
            .bind(change.notes.as_deref())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
        let reservation = Self::row_to_reservation(row)?;

        let mut seats_released = 0;
        if change.expected.holds_seats() && !change.next.holds_seats() {
            sqlx::query(
                r#"
                UPDATE trip_dates
                SET occupied = GREATEST(occupied - $2, 0),
                    status = CASE
                        WHEN status = 'cancelled' THEN status
                        WHEN GREATEST(occupied - $2, 0) >= capacity THEN 'full'
                        ELSE 'open'
                    END
                WHERE id = $1
                "#,
            )
            .bind(reservation.trip_date_id.as_uuid())
            .bind(to_i32(reservation.party_size)?)
            .execute(&mut *tx)
            .await?;
            seats_released = reservation.party_size;
        }

        if change.next == ReservationStatus::Cancelled {
            sqlx::query(
                r#"
                UPDATE purchases SET status = 'cancelled', updated_at = $2
                WHERE id = $1 AND status = 'pending'
                  AND NOT EXISTS (
                      SELECT 1 FROM reservations WHERE purchase_id = $1 AND status <> 'cancelled'
                  )
                "#,
            )
            .bind(purchase_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(purchase_id)
            .fetch_one(&mut *tx)
            .await?;
        let purchase = Self::row_to_purchase(row)?;

        tx.commit().await?;
        Ok(StatusChangeOutcome {
            reservation,
            purchase,
            seats_released,
        })
    }

    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_purchase).transpose()
    }

    async fn settle(&self, payment: Payment) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;

        let purchase = Self::lock_pending_purchase(&mut tx, payment.purchase_id).await?;

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM payments WHERE purchase_id = $1")
                .bind(purchase.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::PaymentAlreadyExists(purchase.id));
        }

        sqlx::query(
            r#"
            INSERT INTO payments (id, purchase_id, method, amount_cents, status, reference,
                authorization_code, settled_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.purchase_id.as_uuid())
        .bind(payment.method.as_str())
        .bind(payment.amount.cents())
        .bind(payment.status.as_str())
        .bind(&payment.reference)
        .bind(&payment.authorization_code)
        .bind(payment.settled_at)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("payments_purchase_key")
            {
                return StoreError::PaymentAlreadyExists(payment.purchase_id);
            }
            StoreError::Database(e)
        })?;

        let (purchase, confirmed) = if payment.status == PaymentStatus::Approved {
            Self::cascade_paid(&mut tx, purchase.id).await?
        } else {
            (purchase, Vec::new())
        };

        tx.commit().await?;
        Ok(Settlement {
            payment,
            purchase,
            confirmed,
        })
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn payment_for_purchase(&self, purchase_id: PurchaseId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE purchase_id = $1");
        let row = sqlx::query(&sql)
            .bind(purchase_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn approve_payment(&self, approval: PaymentApproval) -> Result<Settlement> {
        let payment_id = approval.payment_id;
        let mut tx = self.pool.begin().await?;

        let purchase_id: Uuid = sqlx::query_scalar("SELECT purchase_id FROM payments WHERE id = $1")
            .bind(payment_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::PaymentNotFound(payment_id))?;
        let purchase = Self::lock_pending_purchase(&mut tx, PurchaseId::from_uuid(purchase_id)).await?;

        let status: String =
            sqlx::query_scalar("SELECT status FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let status: PaymentStatus = status.parse()?;
        if status != PaymentStatus::Pending {
            return Err(StoreError::StalePaymentStatus {
                payment_id,
                expected: PaymentStatus::Pending,
                actual: status,
            });
        }

        let sql = format!(
            r#"
            UPDATE payments SET status = $2, authorization_code = $3, settled_at = $4
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(payment_id.as_uuid())
            .bind(PaymentStatus::Approved.as_str())
            .bind(&approval.authorization_code)
            .bind(approval.settled_at)
            .fetch_one(&mut *tx)
            .await?;
        let payment = Self::row_to_payment(row)?;

        let (purchase, confirmed) = Self::cascade_paid(&mut tx, purchase.id).await?;

        tx.commit().await?;
        Ok(Settlement {
            payment,
            purchase,
            confirmed,
        })
    }

    async fn cart_for_user(&self, user_id: UserId) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(CartId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(Cart {
            id: CartId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let sql = format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY added_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(cart_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_cart_item).collect()
    }

    async fn add_cart_item(&self, item: CartItem) -> Result<CartItem> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, trip_date_id, party_size, notes, added_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.trip_date_id.as_uuid())
        .bind(to_i32(item.party_size)?)
        .bind(&item.notes)
        .bind(item.added_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("cart_items_trip_date_id_fkey")
            {
                return StoreError::TripDateNotFound(item.trip_date_id);
            }
            StoreError::Database(e)
        })?;

        Ok(item)
    }

    async fn remove_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<()> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id.as_uuid())
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(StoreError::CartItemNotFound(item_id));
        }
        Ok(())
    }

    async fn recompute_occupied(&self, trip_date_id: TripDateId) -> Result<OccupancyChange> {
        let mut tx = self.pool.begin().await?;

        // The row lock makes admissions and releases on this date wait
        // until the corrected counter is committed.
        let before: i32 =
            sqlx::query_scalar("SELECT occupied FROM trip_dates WHERE id = $1 FOR UPDATE")
                .bind(trip_date_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::TripDateNotFound(trip_date_id))?;

        let active: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(party_size), 0)::BIGINT FROM reservations
            WHERE trip_date_id = $1 AND status <> 'cancelled'
            "#,
        )
        .bind(trip_date_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let after = i32::try_from(active)
            .map_err(|_| StoreError::Decode(format!("active seat total {active} out of range")))?;

        sqlx::query(
            r#"
            UPDATE trip_dates
            SET occupied = $2,
                status = CASE
                    WHEN status = 'cancelled' THEN status
                    WHEN $2 >= capacity THEN 'full'
                    ELSE 'open'
                END
            WHERE id = $1
            "#,
        )
        .bind(trip_date_id.as_uuid())
        .bind(after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(OccupancyChange {
            trip_date_id,
            before: to_u32(before)?,
            after: to_u32(after)?,
        })
    }

    async fn reset_all(&self) -> Result<ResetSummary> {
        let mut tx = self.pool.begin().await?;

        let payments = sqlx::query("DELETE FROM payments")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let reservations = sqlx::query("DELETE FROM reservations")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let purchases = sqlx::query("DELETE FROM purchases")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let cart_items = sqlx::query("DELETE FROM cart_items")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let carts = sqlx::query("DELETE FROM carts")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let trip_dates_reset = sqlx::query(
            r#"
            UPDATE trip_dates
            SET occupied = 0,
                status = CASE
                    WHEN status = 'cancelled' THEN status
                    WHEN capacity = 0 THEN 'full'
                    ELSE 'open'
                END
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(ResetSummary {
            payments,
            reservations,
            purchases,
            cart_items,
            carts,
            trip_dates_reset,
        })
    }
}
