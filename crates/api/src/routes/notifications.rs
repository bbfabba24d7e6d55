//! Live booking notifications for admin dashboards.

use std::convert::Infallible;
use std::future;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use booking_store::BookingStore;
use domain::Notification;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::auth::AdminUser;
use crate::state::AppState;

fn to_event(
    received: Result<Notification, BroadcastStreamRecvError>,
) -> Option<Result<Event, Infallible>> {
    match received {
        Ok(notification) => {
            match Event::default()
                .event(notification.kind())
                .json_data(&notification)
            {
                Ok(event) => Some(Ok(event)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to encode notification");
                    None
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "admin notification stream lagged");
            None
        }
    }
}

/// GET /admin/notificaciones
///
/// Server-sent events, one per notification, named by its kind. A client
/// that falls behind the broadcast buffer skips the notifications it missed.
/// The stream ends when the server starts shutting down.
pub async fn stream<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(user_id = %actor.user_id, "admin notification stream opened");

    let events = BroadcastStream::new(state.admin_feed.subscribe())
        .filter_map(|received| future::ready(to_event(received)))
        .take_until(state.shutting_down());
    Sse::new(events).keep_alive(KeepAlive::default())
}
