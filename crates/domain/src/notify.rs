//! Post-commit notifications.
//!
//! Services publish to the [`Outbox`] only after the store call returned
//! successfully. Delivery happens on a background task so a slow or failing
//! sink never affects the booking operation that produced the notification.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, PurchaseId, ReservationId, ReservationStatus, TripDateId, UserId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Something that happened to a booking and is worth telling someone about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ReservationCreated {
        reservation_id: ReservationId,
        number: String,
        user_id: UserId,
        trip_date_id: TripDateId,
        party_size: u32,
    },
    ReservationCancelled {
        reservation_id: ReservationId,
        number: String,
        user_id: UserId,
        seats_released: u32,
    },
    ReservationStatusChanged {
        reservation_id: ReservationId,
        number: String,
        user_id: UserId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    PurchasePaid {
        purchase_id: PurchaseId,
        number: String,
        user_id: UserId,
        total: Money,
        reservations_confirmed: usize,
    },
    PurchaseCheckedOut {
        purchase_id: PurchaseId,
        number: String,
        user_id: UserId,
        reservations: usize,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ReservationCreated { .. } => "reservation_created",
            Notification::ReservationCancelled { .. } => "reservation_cancelled",
            Notification::ReservationStatusChanged { .. } => "reservation_status_changed",
            Notification::PurchasePaid { .. } => "purchase_paid",
            Notification::PurchaseCheckedOut { .. } => "purchase_checked_out",
        }
    }

    /// The user the notification concerns.
    pub fn user_id(&self) -> UserId {
        match self {
            Notification::ReservationCreated { user_id, .. }
            | Notification::ReservationCancelled { user_id, .. }
            | Notification::ReservationStatusChanged { user_id, .. }
            | Notification::PurchasePaid { user_id, .. }
            | Notification::PurchaseCheckedOut { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Error)]
#[error("{sink} delivery failed: {message}")]
pub struct NotifyError {
    pub sink: &'static str,
    pub message: String,
}

/// A delivery channel for notifications (email, realtime broadcast, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sending half of the post-commit notification queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: Option<mpsc::Sender<Notification>>,
}

impl Outbox {
    /// Creates a bounded outbox and the receiver to hand to [`spawn_dispatcher`].
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// An outbox that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queues a notification without waiting. A full or closed queue drops
    /// it with a warning.
    pub fn publish(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            return;
        };

        if let Err(err) = sender.try_send(notification) {
            let (reason, notification) = match err {
                mpsc::error::TrySendError::Full(n) => ("full", n),
                mpsc::error::TrySendError::Closed(n) => ("closed", n),
            };
            metrics::counter!("notifications_dropped_total", "reason" => reason).increment(1);
            tracing::warn!(
                kind = notification.kind(),
                reason,
                "notification dropped"
            );
        }
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Spawns the task that delivers queued notifications to every sink.
///
/// The task ends once every [`Outbox`] clone has been dropped.
pub fn spawn_dispatcher(
    mut receiver: mpsc::Receiver<Notification>,
    sinks: Vec<Arc<dyn Notifier>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = receiver.recv().await {
            for sink in &sinks {
                if let Err(err) = sink.notify(&notification).await {
                    tracing::warn!(
                        sink = sink.name(),
                        kind = notification.kind(),
                        error = %err,
                        "notification delivery failed"
                    );
                }
            }
        }
        tracing::debug!("notification dispatcher stopped");
    })
}

/// Stands in for the email service: records what would have been sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Notifier for LogMailer {
    fn name(&self) -> &'static str {
        "mailer"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let user_id = notification.user_id();
        tracing::info!(%user_id, kind = notification.kind(), "email queued");
        Ok(())
    }
}

/// Realtime channel for admin dashboards.
#[derive(Debug, Clone)]
pub struct AdminBroadcast {
    sender: broadcast::Sender<Notification>,
}

impl AdminBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for AdminBroadcast {
    fn name(&self) -> &'static str {
        "admin_broadcast"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        // No subscribers is not an error: nobody is watching right now.
        let _ = self.sender.send(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn created() -> Notification {
        Notification::ReservationCreated {
            reservation_id: ReservationId::new(),
            number: "RES-20260101000000-0001".to_string(),
            user_id: UserId::new(),
            trip_date_id: TripDateId::new(),
            party_size: 2,
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError {
                sink: "failing",
                message: "smtp unreachable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_past_failing_sink() {
        let (outbox, receiver) = Outbox::channel(8);
        let recorder = Arc::new(Recorder::default());
        let sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(Failing), recorder.clone()];
        let handle = spawn_dispatcher(receiver, sinks);

        let notification = created();
        outbox.publish(notification.clone());
        drop(outbox);
        handle.await.unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![notification]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (outbox, mut receiver) = Outbox::channel(1);
        outbox.publish(created());
        outbox.publish(created());

        assert!(receiver.recv().await.is_some());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disabled_outbox_is_silent() {
        Outbox::disabled().publish(created());
    }

    #[tokio::test]
    async fn test_admin_broadcast_reaches_subscribers() {
        let broadcast = AdminBroadcast::new(4);
        let mut rx = broadcast.subscribe();
        let notification = created();

        broadcast.notify(&notification).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), notification);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(created()).unwrap();
        assert_eq!(json["type"], "reservation_created");
        assert_eq!(json["party_size"], 2);
    }
}
