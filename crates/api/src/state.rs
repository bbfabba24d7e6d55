//! Shared application state.

use booking_store::BookingStore;
use domain::{AdminBroadcast, CartService, CatalogService, Outbox, ReservationService};
use reconciliation::Reconciler;
use settlement::{PaymentSettlement, SimulatedGateway};
use tokio::sync::watch;

use crate::config::Config;

/// Services shared by every handler, all over one store.
pub struct AppState<S: BookingStore> {
    pub reservations: ReservationService<S>,
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub payments: PaymentSettlement<S, SimulatedGateway>,
    pub reconciler: Reconciler<S>,
    /// Feed behind `/admin/notificaciones`; the outbox dispatcher publishes into it.
    pub admin_feed: AdminBroadcast,
    shutdown: watch::Sender<bool>,
}

impl<S: BookingStore + Clone> AppState<S> {
    /// Wires the services over `store`. Notifications go to `outbox`;
    /// `admin_feed` must be one of the dispatcher's sinks for admins to
    /// see them live.
    pub fn new(store: S, config: &Config, outbox: Outbox, admin_feed: AdminBroadcast) -> Self {
        let rules = config.booking_rules();
        Self {
            reservations: ReservationService::new(store.clone(), rules, outbox.clone()),
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone(), rules, outbox.clone()),
            payments: PaymentSettlement::new(
                store.clone(),
                SimulatedGateway::new(config.gateway()),
                outbox,
            ),
            reconciler: Reconciler::new(store),
            admin_feed,
            shutdown: watch::Sender::new(false),
        }
    }

    /// Ends long-lived responses so graceful shutdown is not held open.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`begin_shutdown`](Self::begin_shutdown) was called.
    pub fn shutting_down(&self) -> impl Future<Output = ()> + Send + 'static + use<S> {
        let mut receiver = self.shutdown.subscribe();
        async move {
            let _ = receiver.wait_for(|closing| *closing).await;
        }
    }
}
