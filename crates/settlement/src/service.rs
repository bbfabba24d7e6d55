//! Settlement service: records payments and cascades confirmation.

use std::collections::HashMap;
use std::time::Instant;

use booking_store::{
    BookingStore, BookingStoreExt, Payment, PaymentApproval, Purchase, Reservation, Settlement,
};
use chrono::Utc;
use common::{PaymentId, PaymentMethod, PaymentStatus, PurchaseId, PurchaseStatus, TripDateId};
use domain::notify::{Notification, Outbox};
use domain::numbers::format_number;
use domain::{Actor, BookingError, TripDateView};
use rand::Rng;
use serde::Serialize;

use crate::error::{Result, SettlementError};
use crate::gateway::{CardData, PaymentGateway, TEST_CARDS, TestCard, authorization_code};

const DEFERRED_PREFIX: &str = "PL";

/// Command to pay a purchase.
#[derive(Debug, Clone)]
pub struct ProcessPayment {
    pub purchase_id: PurchaseId,
    pub method: PaymentMethod,
    /// Required when `method` is [`PaymentMethod::Card`].
    pub card: Option<CardData>,
}

impl ProcessPayment {
    pub fn card(purchase_id: PurchaseId, card: CardData) -> Self {
        Self {
            purchase_id,
            method: PaymentMethod::Card,
            card: Some(card),
        }
    }

    pub fn pay_later(purchase_id: PurchaseId) -> Self {
        Self {
            purchase_id,
            method: PaymentMethod::PayLater,
            card: None,
        }
    }
}

/// A reservation with the trip date and trip it books.
#[derive(Debug, Clone, Serialize)]
pub struct BookedReservation {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub trip_date: TripDateView,
}

/// A recorded payment with the purchase and reservations it settled.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub purchase: Purchase,
    pub reservations: Vec<BookedReservation>,
    pub authorization_code: Option<String>,
}

fn deferred_reference() -> String {
    let suffix = rand::thread_rng().gen_range(0..10_000);
    format_number(DEFERRED_PREFIX, Utc::now(), suffix)
}

/// Payment settlement over a booking store and a card gateway.
pub struct PaymentSettlement<S, G>
where
    S: BookingStore,
    G: PaymentGateway,
{
    store: S,
    gateway: G,
    outbox: Outbox,
}

impl<S, G> PaymentSettlement<S, G>
where
    S: BookingStore,
    G: PaymentGateway,
{
    pub fn new(store: S, gateway: G, outbox: Outbox) -> Self {
        Self {
            store,
            gateway,
            outbox,
        }
    }

    /// The fixed table of test instruments and their outcomes.
    pub fn test_cards(&self) -> &'static [TestCard] {
        TEST_CARDS
    }

    /// Pays one of the actor's pending purchases.
    ///
    /// An approved card marks the purchase paid and confirms its pending
    /// reservations in the same store call. Pay-later records a pending
    /// payment and leaves everything else untouched.
    #[tracing::instrument(skip(self, cmd), fields(purchase_id = %cmd.purchase_id, method = %cmd.method))]
    pub async fn process(&self, actor: &Actor, cmd: ProcessPayment) -> Result<PaymentReceipt> {
        let started = Instant::now();

        let purchase = self
            .store
            .get_purchase(cmd.purchase_id)
            .await?
            .filter(|p| p.user_id == actor.user_id && p.status == PurchaseStatus::Pending)
            .ok_or_else(|| BookingError::not_found("Pending purchase", cmd.purchase_id))?;

        if self
            .store
            .payment_for_purchase(purchase.id)
            .await?
            .is_some()
        {
            return Err(BookingError::Conflict(format!(
                "purchase {} already has a payment",
                purchase.number
            ))
            .into());
        }

        let payment = match cmd.method {
            PaymentMethod::Card => {
                let card = cmd.card.ok_or_else(|| {
                    BookingError::validation("card_data", "is required for card payments")
                })?;
                let authorization = self
                    .gateway
                    .authorize(&card, purchase.total)
                    .await
                    .map_err(|reason| {
                        metrics::counter!("payments_processed_total", "outcome" => reason.code())
                            .increment(1);
                        tracing::warn!(
                            purchase_id = %purchase.id,
                            reason = reason.code(),
                            "card declined"
                        );
                        SettlementError::Declined(reason)
                    })?;
                let now = Utc::now();
                Payment {
                    id: PaymentId::new(),
                    purchase_id: purchase.id,
                    method: PaymentMethod::Card,
                    amount: purchase.total,
                    status: PaymentStatus::Approved,
                    reference: authorization.transaction_id,
                    authorization_code: Some(authorization.authorization_code),
                    settled_at: Some(now),
                    created_at: now,
                }
            }
            PaymentMethod::PayLater => Payment {
                id: PaymentId::new(),
                purchase_id: purchase.id,
                method: PaymentMethod::PayLater,
                amount: purchase.total,
                status: PaymentStatus::Pending,
                reference: deferred_reference(),
                authorization_code: None,
                settled_at: None,
                created_at: Utc::now(),
            },
        };

        let settlement = self.store.settle(payment).await?;

        let outcome = settlement.payment.status.as_str();
        metrics::counter!("payments_processed_total", "outcome" => outcome).increment(1);
        metrics::histogram!("settlement_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            payment_id = %settlement.payment.id,
            reference = %settlement.payment.reference,
            outcome,
            confirmed = settlement.confirmed.len(),
            "payment recorded"
        );

        self.finish(settlement).await
    }

    /// Approves a pending pay-later payment. Admin only.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_deferred(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
    ) -> Result<PaymentReceipt> {
        actor.require_admin()?;

        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Payment", payment_id))?;
        if payment.method != PaymentMethod::PayLater || payment.status != PaymentStatus::Pending {
            return Err(BookingError::Conflict(format!(
                "payment {} is a {} payment in status {}",
                payment.reference, payment.method, payment.status
            ))
            .into());
        }

        let settlement = self
            .store
            .approve_payment(PaymentApproval {
                payment_id,
                authorization_code: Some(authorization_code()),
                settled_at: Utc::now(),
            })
            .await?;

        metrics::counter!("payments_processed_total", "outcome" => "approved").increment(1);
        tracing::info!(
            %payment_id,
            confirmed = settlement.confirmed.len(),
            "deferred payment confirmed"
        );

        self.finish(settlement).await
    }

    async fn finish(&self, settlement: Settlement) -> Result<PaymentReceipt> {
        let Settlement {
            payment,
            purchase,
            confirmed,
        } = settlement;

        if payment.status == PaymentStatus::Approved {
            self.outbox.publish(Notification::PurchasePaid {
                purchase_id: purchase.id,
                number: purchase.number.clone(),
                user_id: purchase.user_id,
                total: purchase.total,
                reservations_confirmed: confirmed.len(),
            });
        }

        let reservations = self.store.reservations_for_purchase(purchase.id).await?;
        let reservations = self.with_trip_dates(reservations).await?;
        Ok(PaymentReceipt {
            authorization_code: payment.authorization_code.clone(),
            payment,
            purchase,
            reservations,
        })
    }

    async fn with_trip_dates(
        &self,
        reservations: Vec<Reservation>,
    ) -> Result<Vec<BookedReservation>> {
        let mut dates: HashMap<TripDateId, TripDateView> = HashMap::new();
        let mut booked = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            let id = reservation.trip_date_id;
            let trip_date = match dates.get(&id) {
                Some(view) => view.clone(),
                None => {
                    let (date, trip) = self
                        .store
                        .trip_date_with_trip(id)
                        .await?
                        .ok_or_else(|| BookingError::not_found("Trip date", id))?;
                    let view = TripDateView::new(date, &trip);
                    dates.insert(id, view.clone());
                    view
                }
            };
            booked.push(BookedReservation {
                reservation,
                trip_date,
            });
        }
        Ok(booked)
    }
}
