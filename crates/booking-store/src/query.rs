use chrono::{DateTime, Utc};
use common::{PageRequest, PurchaseId, ReservationStatus, TripDateId, UserId};

use crate::Reservation;

/// Builder for filtering reservation listings.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct ReservationQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    pub status: Option<ReservationStatus>,

    pub trip_date_id: Option<TripDateId>,

    pub purchase_id: Option<PurchaseId>,

    /// Created at or after this instant (inclusive).
    pub created_from: Option<DateTime<Utc>>,

    /// Created at or before this instant (inclusive).
    pub created_to: Option<DateTime<Utc>>,

    pub page: PageRequest,
}

impl ReservationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the reservations of one user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn trip_date(mut self, trip_date_id: TripDateId) -> Self {
        self.trip_date_id = Some(trip_date_id);
        self
    }

    pub fn purchase(mut self, purchase_id: PurchaseId) -> Self {
        self.purchase_id = Some(purchase_id);
        self
    }

    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self
    }

    pub fn created_to(mut self, to: DateTime<Utc>) -> Self {
        self.created_to = Some(to);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Checks whether a reservation passes every filter (paging aside).
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.user_id.is_none_or(|id| reservation.user_id == id)
            && self.status.is_none_or(|s| reservation.status == s)
            && self.trip_date_id.is_none_or(|id| reservation.trip_date_id == id)
            && self.purchase_id.is_none_or(|id| reservation.purchase_id == id)
            && self.created_from.is_none_or(|from| reservation.created_at >= from)
            && self.created_to.is_none_or(|to| reservation.created_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::Money;

    use super::*;
    use crate::Purchase;

    fn reservation(user_id: UserId) -> Reservation {
        let purchase = Purchase::new("CMP-1", user_id, Money::from_cents(100));
        Reservation::new("RES-1", &purchase, TripDateId::new(), 1, Money::from_cents(100)).unwrap()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(ReservationQuery::new().matches(&reservation(UserId::new())));
    }

    #[test]
    fn test_user_and_status_filters() {
        let user = UserId::new();
        let r = reservation(user);

        assert!(ReservationQuery::for_user(user).matches(&r));
        assert!(!ReservationQuery::for_user(UserId::new()).matches(&r));
        assert!(
            !ReservationQuery::for_user(user)
                .status(ReservationStatus::Confirmed)
                .matches(&r)
        );
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let r = reservation(UserId::new());
        let q = ReservationQuery::new()
            .created_from(r.created_at)
            .created_to(r.created_at);
        assert!(q.matches(&r));

        let later = ReservationQuery::new().created_from(r.created_at + Duration::seconds(1));
        assert!(!later.matches(&r));
    }
}
