//! Seat ledger queries and repair.
//!
//! Admission and release are not here: they are store primitives so the
//! capacity check and the counter update happen in one atomic step.

use booking_store::{BookingStore, BookingStoreExt, OccupancyChange};
use common::TripDateId;

use crate::{BookingError, Result};

/// Read and repair access to the per-date seat counters.
#[derive(Debug, Clone)]
pub struct SeatLedger<S> {
    store: S,
}

impl<S: BookingStore> SeatLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Seats still available, `capacity - occupied`.
    #[tracing::instrument(skip(self))]
    pub async fn remaining_capacity(&self, trip_date_id: TripDateId) -> Result<u32> {
        self.store
            .remaining_capacity(trip_date_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip date", trip_date_id))
    }

    /// Rewrites the cached counter from the date's non-cancelled reservations.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_occupied(&self, trip_date_id: TripDateId) -> Result<OccupancyChange> {
        let change = self.store.recompute_occupied(trip_date_id).await?;
        if change.changed() {
            metrics::counter!("reconciliation_dates_corrected_total").increment(1);
            tracing::info!(
                %trip_date_id,
                before = change.before,
                after = change.after,
                delta = change.delta(),
                "occupied counter corrected"
            );
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use booking_store::{InMemoryBookingStore, Trip, TripDate};
    use chrono::NaiveDate;
    use common::Money;

    use super::*;

    #[tokio::test]
    async fn test_remaining_capacity() {
        let store = InMemoryBookingStore::new();
        let trip = store
            .insert_trip(Trip::new("Arenal", Money::from_dollars(60)))
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap();
        let date = store
            .insert_trip_date(TripDate::new(trip.id, day, day, 12))
            .await
            .unwrap();
        store.set_occupied(date.id, 10).await.unwrap();

        let ledger = SeatLedger::new(store);
        assert_eq!(ledger.remaining_capacity(date.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_date_is_not_found() {
        let ledger = SeatLedger::new(InMemoryBookingStore::new());
        let result = ledger.remaining_capacity(TripDateId::new()).await;
        assert!(matches!(result, Err(BookingError::NotFound { .. })));
    }
}
