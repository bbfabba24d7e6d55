//! Reservation commands and filters.

use chrono::{DateTime, NaiveDate, Utc};
use common::{ReservationStatus, TripDateId};

use crate::{BookingError, Result};

/// Command to book seats on a trip date.
#[derive(Debug, Clone)]
pub struct CreateReservation {
    pub trip_date_id: TripDateId,
    pub party_size: u32,
    pub notes: Option<String>,
}

impl CreateReservation {
    pub fn new(trip_date_id: TripDateId, party_size: u32) -> Self {
        Self {
            trip_date_id,
            party_size,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Command for an admin to move a reservation to another status.
#[derive(Debug, Clone)]
pub struct UpdateReservationStatus {
    pub status: ReservationStatus,
    /// Replaces the reservation notes when set.
    pub notes: Option<String>,
}

impl UpdateReservationStatus {
    pub fn to(status: ReservationStatus) -> Self {
        Self {
            status,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Listing filters. The date range is on creation date, both ends inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}

impl ReservationFilter {
    pub fn status(status: ReservationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Converts the date range into instants covering whole UTC days.
    pub(crate) fn created_range(
        &self,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to)
            && from > to
        {
            return Err(BookingError::validation(
                "created_to",
                "must not be earlier than created_from",
            ));
        }

        let from = self
            .created_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let to = self
            .created_to
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
            .map(|dt| dt.and_utc());
        Ok((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_covers_whole_days() {
        let day = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let filter = ReservationFilter {
            created_from: Some(day),
            created_to: Some(day),
            ..Default::default()
        };
        let (from, to) = filter.created_range().unwrap();
        assert_eq!(from.unwrap().to_rfc3339(), "2026-05-10T00:00:00+00:00");
        assert!(to.unwrap() > from.unwrap());
        assert_eq!(to.unwrap().date_naive(), day);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let filter = ReservationFilter {
            created_from: NaiveDate::from_ymd_opt(2026, 5, 10),
            created_to: NaiveDate::from_ymd_opt(2026, 5, 9),
            ..Default::default()
        };
        assert!(matches!(
            filter.created_range(),
            Err(BookingError::Validation { .. })
        ));
    }
}
