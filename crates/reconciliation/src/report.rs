//! Reports produced by the reconciler.

use booking_store::{OccupancyChange, Reservation};
use common::{ReservationId, ReservationStatus, TripDateId};
use serde::Serialize;

use crate::error::{ReconcileError, Result};

/// The word both reset confirmations must match.
pub const RESET_CONFIRMATION: &str = "RESET";

/// One active reservation in a diagnostic, with the running seat total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationLine {
    pub reservation_id: ReservationId,
    pub number: String,
    pub status: ReservationStatus,
    pub party_size: u32,
    /// Seats taken by this and every earlier reservation.
    pub cumulative: u32,
    /// This reservation pushed the running total past capacity.
    pub over_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub trip_date_id: TripDateId,
    pub capacity: u32,
    /// Cached counter as stored.
    pub occupied: u32,
    /// `capacity - occupied` from the cached counter.
    pub remaining: u32,
    /// Seats held by non-cancelled reservations.
    pub active_total: u32,
    pub reservations: Vec<ReservationLine>,
    pub oversold: bool,
    pub drift: bool,
}

impl DiagnosticReport {
    /// Builds a report from a date's counters and its active reservations,
    /// oldest first.
    pub fn build(
        trip_date_id: TripDateId,
        capacity: u32,
        occupied: u32,
        reservations: &[Reservation],
    ) -> Self {
        let mut cumulative = 0u32;
        let lines: Vec<ReservationLine> = reservations
            .iter()
            .map(|r| {
                cumulative = cumulative.saturating_add(r.party_size);
                ReservationLine {
                    reservation_id: r.id,
                    number: r.number.clone(),
                    status: r.status,
                    party_size: r.party_size,
                    cumulative,
                    over_capacity: cumulative > capacity,
                }
            })
            .collect();

        Self {
            trip_date_id,
            capacity,
            occupied,
            remaining: capacity.saturating_sub(occupied),
            active_total: cumulative,
            reservations: lines,
            oversold: cumulative > capacity,
            drift: occupied != cumulative,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.oversold && !self.drift
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Dates looked at.
    pub examined: u64,
    /// Dates whose counter was rewritten.
    pub changed: Vec<OccupancyChange>,
}

impl ReconcileSummary {
    pub fn record(&mut self, change: OccupancyChange) {
        self.examined += 1;
        if change.changed() {
            self.changed.push(change);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Proof that an operator confirmed a reset twice.
#[derive(Debug, Clone, Copy)]
pub struct ResetConfirmation {
    _confirmed: (),
}

impl ResetConfirmation {
    /// Both inputs must be exactly [`RESET_CONFIRMATION`].
    pub fn new(first: &str, second: &str) -> Result<Self> {
        if first == RESET_CONFIRMATION && second == RESET_CONFIRMATION {
            Ok(Self { _confirmed: () })
        } else {
            Err(ReconcileError::Unconfirmed {
                expected: RESET_CONFIRMATION,
            })
        }
    }
}
