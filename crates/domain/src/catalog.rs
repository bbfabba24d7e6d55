//! Trip catalog: trips and their scheduled dates.

use booking_store::{BookingStore, Trip, TripDate, TripDateUpdate};
use chrono::NaiveDate;
use common::{Money, TripDateId, TripDateStatus, TripId};
use serde::Serialize;

use crate::{Actor, BookingError, Result};

/// Largest capacity a single date may be scheduled with.
pub const MAX_CAPACITY: u32 = 10_000;

/// Highest price per person, in cents. Keeps every subtotal and cart
/// total well inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

const MAX_TRIP_NAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub name: String,
    pub base_price: Money,
}

#[derive(Debug, Clone)]
pub struct ScheduleTripDate {
    pub trip_id: TripId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub capacity: u32,
    pub price: Option<Money>,
    pub notes: Option<String>,
}

/// Admin changes to a date. `None` leaves a field as it is; the inner
/// `None` of `price`/`notes` clears the field.
#[derive(Debug, Clone, Default)]
pub struct TripDateChanges {
    pub capacity: Option<u32>,
    pub price: Option<Option<Money>>,
    pub status: Option<TripDateStatus>,
    pub notes: Option<Option<String>>,
}

/// A trip date as shown to customers.
#[derive(Debug, Clone, Serialize)]
pub struct TripDateView {
    #[serde(flatten)]
    pub date: TripDate,
    pub trip_name: String,
    pub remaining: u32,
    pub effective_price: Money,
}

impl TripDateView {
    pub fn new(date: TripDate, trip: &Trip) -> Self {
        Self {
            remaining: date.remaining(),
            effective_price: date.effective_price(trip),
            trip_name: trip.name.clone(),
            date,
        }
    }
}

fn validate_price(field: &'static str, price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(BookingError::validation(field, "must not be negative"));
    }
    if price.cents() > MAX_PRICE_CENTS {
        return Err(BookingError::validation(
            field,
            format!("must be at most {}", Money::from_cents(MAX_PRICE_CENTS)),
        ));
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<()> {
    if capacity > MAX_CAPACITY {
        return Err(BookingError::validation(
            "capacity",
            format!("must be at most {MAX_CAPACITY}"),
        ));
    }
    Ok(())
}

pub struct CatalogService<S: BookingStore> {
    store: S,
}

impl<S: BookingStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_trip(&self, actor: &Actor, cmd: NewTrip) -> Result<Trip> {
        actor.require_admin()?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(BookingError::validation("name", "must not be empty"));
        }
        if name.chars().count() > MAX_TRIP_NAME_LEN {
            return Err(BookingError::validation(
                "name",
                format!("must be at most {MAX_TRIP_NAME_LEN} characters"),
            ));
        }
        validate_price("base_price", cmd.base_price)?;

        let trip = self
            .store
            .insert_trip(Trip::new(name, cmd.base_price))
            .await?;
        tracing::info!(trip_id = %trip.id, name = %trip.name, "trip created");
        Ok(trip)
    }

    /// Changes the base price. Reservations already made keep their price.
    #[tracing::instrument(skip(self))]
    pub async fn update_trip_price(
        &self,
        actor: &Actor,
        trip_id: TripId,
        base_price: Money,
    ) -> Result<Trip> {
        actor.require_admin()?;
        validate_price("base_price", base_price)?;
        Ok(self.store.update_trip_price(trip_id, base_price).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn schedule_date(&self, actor: &Actor, cmd: ScheduleTripDate) -> Result<TripDate> {
        actor.require_admin()?;

        if cmd.ends_on < cmd.starts_on {
            return Err(BookingError::validation(
                "ends_on",
                "must not be before starts_on",
            ));
        }
        validate_capacity(cmd.capacity)?;
        if let Some(price) = cmd.price {
            validate_price("price", price)?;
        }

        let mut date = TripDate::new(cmd.trip_id, cmd.starts_on, cmd.ends_on, cmd.capacity);
        date.price = cmd.price;
        date.notes = cmd.notes;
        // A zero-capacity date is full from the start
        date.status = date.status.derive(date.capacity, date.occupied);

        let date = self.store.insert_trip_date(date).await?;
        tracing::info!(trip_date_id = %date.id, capacity = date.capacity, "trip date scheduled");
        Ok(date)
    }

    /// Applies admin changes to a date.
    ///
    /// Capacity cannot drop below the seats already taken, and `full` is
    /// derived from the counters rather than set directly.
    #[tracing::instrument(skip(self))]
    pub async fn update_date(
        &self,
        actor: &Actor,
        id: TripDateId,
        changes: TripDateChanges,
    ) -> Result<TripDate> {
        actor.require_admin()?;

        if let Some(capacity) = changes.capacity {
            validate_capacity(capacity)?;
        }
        if let Some(Some(price)) = changes.price {
            validate_price("price", price)?;
        }
        if changes.status == Some(TripDateStatus::Full) {
            return Err(BookingError::validation(
                "status",
                "full is derived from occupancy and cannot be set",
            ));
        }

        let date = self
            .store
            .update_trip_date(
                id,
                TripDateUpdate {
                    capacity: changes.capacity,
                    price: changes.price,
                    status: changes.status,
                    notes: changes.notes,
                },
            )
            .await?;
        tracing::info!(trip_date_id = %id, status = %date.status, "trip date updated");
        Ok(date)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_date(&self, id: TripDateId) -> Result<TripDateView> {
        let date = self
            .store
            .get_trip_date(id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip date", id))?;
        let trip = self
            .store
            .get_trip(date.trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip", date.trip_id))?;
        Ok(TripDateView::new(date, &trip))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_dates(&self, trip_id: TripId) -> Result<Vec<TripDateView>> {
        let trip = self
            .store
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip", trip_id))?;
        let dates = self.store.list_trip_dates(trip_id).await?;
        Ok(dates
            .into_iter()
            .map(|date| TripDateView::new(date, &trip))
            .collect())
    }
}
