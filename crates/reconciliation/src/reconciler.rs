//! Reconciler: diagnose, repair and reset seat counters.

use booking_store::{BookingStore, ResetSummary};
use common::TripDateId;
use domain::{BookingError, SeatLedger};
use futures_util::StreamExt;

use crate::Result;
use crate::report::{DiagnosticReport, ReconcileSummary, ResetConfirmation};

/// Compares cached seat counters with the reservations behind them.
pub struct Reconciler<S: BookingStore> {
    store: S,
    ledger: SeatLedger<S>,
}

impl<S: BookingStore + Clone> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            ledger: SeatLedger::new(store.clone()),
            store,
        }
    }

    /// Reports the cached counter of a date against its active reservations.
    /// Read only. Counter and rows come from one snapshot, so admissions
    /// running alongside never show up as drift.
    #[tracing::instrument(skip(self))]
    pub async fn diagnose(&self, trip_date_id: TripDateId) -> Result<DiagnosticReport> {
        let (date, active) = self
            .store
            .trip_date_snapshot(trip_date_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip date", trip_date_id))?;

        let report = DiagnosticReport::build(date.id, date.capacity, date.occupied, &active);
        if !report.is_healthy() {
            metrics::counter!("seat_counter_inconsistencies_total").increment(1);
            tracing::warn!(
                %trip_date_id,
                occupied = report.occupied,
                active_total = report.active_total,
                oversold = report.oversold,
                drift = report.drift,
                "seat counter inconsistent"
            );
        }
        Ok(report)
    }

    /// Recomputes every date's counter from its reservations.
    ///
    /// Each date is repaired in its own atomic step; running it again right
    /// away reports no changes.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<ReconcileSummary> {
        let mut dates = self.store.stream_trip_dates().await?;
        let mut summary = ReconcileSummary::default();

        while let Some(date) = dates.next().await {
            let date = date?;
            let change = self.ledger.recompute_occupied(date.id).await?;
            summary.record(change);
        }

        tracing::info!(
            examined = summary.examined,
            changed = summary.changed.len(),
            "reconciliation complete"
        );
        Ok(summary)
    }

    /// Deletes every payment, reservation, purchase and cart, and zeroes all
    /// seat counters. Only for wiping test data.
    #[tracing::instrument(skip(self, _confirmation))]
    pub async fn reset_all(&self, _confirmation: ResetConfirmation) -> Result<ResetSummary> {
        let summary = self.store.reset_all().await?;
        metrics::counter!("booking_resets_total").increment(1);
        tracing::warn!(
            payments = summary.payments,
            reservations = summary.reservations,
            purchases = summary.purchases,
            carts = summary.carts,
            trip_dates_reset = summary.trip_dates_reset,
            "all booking data reset"
        );
        Ok(summary)
    }
}
