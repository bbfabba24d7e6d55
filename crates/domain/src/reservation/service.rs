//! Reservation service.

use booking_store::{
    BookingStore, BookingStoreExt, NewBooking, Purchase, Reservation, ReservationQuery,
    StatusChange,
};
use common::{Page, PageRequest, ReservationId, ReservationStatus, TripDateStatus};
use serde::Serialize;

use super::{CreateReservation, ReservationFilter, UpdateReservationStatus};
use crate::notify::{Notification, Outbox};
use crate::numbers::{purchase_number, reservation_number};
use crate::{Actor, BookingError, BookingRules, Result};

/// A reservation together with the purchase it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub purchase: Purchase,
}

/// Service for creating and managing reservations.
///
/// Every write goes through one atomic store call; notifications are
/// published only after that call succeeded.
pub struct ReservationService<S: BookingStore> {
    store: S,
    rules: BookingRules,
    outbox: Outbox,
}

impl<S: BookingStore> ReservationService<S> {
    pub fn new(store: S, rules: BookingRules, outbox: Outbox) -> Self {
        Self {
            store,
            rules,
            outbox,
        }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Books `party_size` seats for the actor.
    ///
    /// The unit price is captured from the date (or the trip's base price)
    /// and never changes afterwards.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %actor.user_id, trip_date_id = %cmd.trip_date_id))]
    pub async fn create(&self, actor: &Actor, cmd: CreateReservation) -> Result<ReservationDetails> {
        self.rules.validate_party_size(cmd.party_size)?;
        self.rules.validate_notes(cmd.notes.as_deref())?;

        let (date, trip) = self
            .store
            .trip_date_with_trip(cmd.trip_date_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Trip date", cmd.trip_date_id))?;

        if date.status == TripDateStatus::Cancelled {
            return Err(BookingError::Conflict(format!(
                "trip date {} is cancelled",
                date.id
            )));
        }

        let unit_price = date.effective_price(&trip);
        let total = unit_price
            .checked_multiply(cmd.party_size)
            .ok_or_else(|| BookingError::validation("party_size", "total price is too large"))?;
        let purchase = Purchase::new(purchase_number(), actor.user_id, total);
        let reservation = Reservation::new(
            reservation_number(),
            &purchase,
            date.id,
            cmd.party_size,
            unit_price,
        )?
        .with_notes(cmd.notes);

        self.store
            .admit(NewBooking::new(purchase.clone(), vec![reservation.clone()]))
            .await
            .map_err(|e| {
                let err = BookingError::from(e);
                metrics::counter!("reservations_rejected_total", "reason" => err.reason())
                    .increment(1);
                err
            })?;

        metrics::counter!("reservations_created_total").increment(1);
        tracing::info!(
            reservation_id = %reservation.id,
            number = %reservation.number,
            party_size = reservation.party_size,
            remaining = date.remaining().saturating_sub(reservation.party_size),
            "reservation created"
        );

        self.outbox.publish(Notification::ReservationCreated {
            reservation_id: reservation.id,
            number: reservation.number.clone(),
            user_id: reservation.user_id,
            trip_date_id: reservation.trip_date_id,
            party_size: reservation.party_size,
        });

        Ok(ReservationDetails {
            reservation,
            purchase,
        })
    }

    /// Loads a reservation visible to the actor.
    ///
    /// Reservations owned by someone else are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, actor: &Actor, id: ReservationId) -> Result<ReservationDetails> {
        let reservation = self.visible_reservation(actor, id).await?;
        self.with_purchase(reservation).await
    }

    /// Lists the actor's own reservations, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        actor: &Actor,
        filter: ReservationFilter,
        page: PageRequest,
    ) -> Result<Page<Reservation>> {
        let query = Self::query(ReservationQuery::for_user(actor.user_id), filter, page)?;
        Ok(self.store.list_reservations(query).await?)
    }

    /// Lists every reservation, newest first. Admin only.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(
        &self,
        actor: &Actor,
        filter: ReservationFilter,
        page: PageRequest,
    ) -> Result<Page<Reservation>> {
        actor.require_admin()?;
        let query = Self::query(ReservationQuery::new(), filter, page)?;
        Ok(self.store.list_reservations(query).await?)
    }

    /// Moves a reservation along the state machine. Admin only.
    ///
    /// Moving to `cancelled` releases the seats.
    #[tracing::instrument(skip(self, cmd), fields(next = %cmd.status))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: ReservationId,
        cmd: UpdateReservationStatus,
    ) -> Result<ReservationDetails> {
        actor.require_admin()?;
        self.rules.validate_notes(cmd.notes.as_deref())?;

        let current = self
            .store
            .get_reservation(id)
            .await?
            .ok_or_else(|| BookingError::not_found("Reservation", id))?;

        if !current.status.can_transition_to(cmd.status) {
            return Err(BookingError::Conflict(format!(
                "reservation {} cannot move from {} to {}",
                current.number, current.status, cmd.status
            )));
        }

        let outcome = self
            .store
            .transition_reservation(StatusChange {
                reservation_id: id,
                expected: current.status,
                next: cmd.status,
                notes: cmd.notes,
            })
            .await?;

        if cmd.status == ReservationStatus::Cancelled {
            metrics::counter!("reservations_cancelled_total").increment(1);
        }
        tracing::info!(
            reservation_id = %id,
            from = %current.status,
            to = %cmd.status,
            seats_released = outcome.seats_released,
            "reservation status changed"
        );

        self.outbox.publish(Notification::ReservationStatusChanged {
            reservation_id: id,
            number: outcome.reservation.number.clone(),
            user_id: outcome.reservation.user_id,
            from: current.status,
            to: cmd.status,
        });

        Ok(ReservationDetails {
            reservation: outcome.reservation,
            purchase: outcome.purchase,
        })
    }

    /// Cancels the actor's own reservation and releases its seats.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, actor: &Actor, id: ReservationId) -> Result<ReservationDetails> {
        let current = self
            .store
            .get_reservation(id)
            .await?
            .filter(|r| r.user_id == actor.user_id)
            .ok_or_else(|| BookingError::not_found("Reservation", id))?;

        if !current.status.can_cancel() {
            return Err(BookingError::Conflict(format!(
                "reservation {} is already {}",
                current.number, current.status
            )));
        }

        let outcome = self
            .store
            .transition_reservation(StatusChange {
                reservation_id: id,
                expected: current.status,
                next: ReservationStatus::Cancelled,
                notes: None,
            })
            .await?;

        metrics::counter!("reservations_cancelled_total").increment(1);
        tracing::info!(
            reservation_id = %id,
            seats_released = outcome.seats_released,
            purchase_status = %outcome.purchase.status,
            "reservation cancelled"
        );

        self.outbox.publish(Notification::ReservationCancelled {
            reservation_id: id,
            number: outcome.reservation.number.clone(),
            user_id: outcome.reservation.user_id,
            seats_released: outcome.seats_released,
        });

        Ok(ReservationDetails {
            reservation: outcome.reservation,
            purchase: outcome.purchase,
        })
    }

    async fn visible_reservation(&self, actor: &Actor, id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .filter(|r| actor.can_view(r.user_id))
            .ok_or_else(|| BookingError::not_found("Reservation", id))
    }

    async fn with_purchase(&self, reservation: Reservation) -> Result<ReservationDetails> {
        let purchase = self
            .store
            .get_purchase(reservation.purchase_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Purchase", reservation.purchase_id))?;
        Ok(ReservationDetails {
            reservation,
            purchase,
        })
    }

    fn query(
        base: ReservationQuery,
        filter: ReservationFilter,
        page: PageRequest,
    ) -> Result<ReservationQuery> {
        let (from, to) = filter.created_range()?;
        let mut query = base.page(page);
        query.status = filter.status;
        query.created_from = from;
        query.created_to = to;
        Ok(query)
    }
}
