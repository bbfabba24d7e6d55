//! HTTP API for the trekking booking service.
//!
//! Exposes reservations, payments, the trip catalog, the cart and the
//! seat counter maintenance endpoints and a live notification stream for
//! admins, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use booking_store::BookingStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, Environment};
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: BookingStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) -> Router {
    let error_details = error::ErrorDetails {
        expose: config.expose_error_details(),
    };

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Reservations
        .route(
            "/reservas",
            post(routes::reservations::create::<S>).get(routes::reservations::list::<S>),
        )
        .route("/reservas/mis-reservas", get(routes::reservations::mine::<S>))
        .route("/reservas/{id}", get(routes::reservations::get::<S>))
        .route(
            "/reservas/{id}/estado",
            put(routes::reservations::update_status::<S>),
        )
        .route("/reservas/{id}/cancelar", put(routes::reservations::cancel::<S>))
        // Payments
        .route("/pagos/procesar", post(routes::payments::process::<S>))
        .route("/pagos/{id}/confirmar", put(routes::payments::confirm::<S>))
        .route("/pagos/tarjetas-prueba", get(routes::payments::test_cards::<S>))
        // Catalog
        .route("/viajes", post(routes::catalog::create_trip::<S>))
        .route("/viajes/{id}/precio", put(routes::catalog::update_trip_price::<S>))
        .route("/viajes/{id}/fechas", get(routes::catalog::list_dates::<S>))
        .route("/fechas-viaje", post(routes::catalog::schedule_date::<S>))
        .route(
            "/fechas-viaje/{id}",
            get(routes::catalog::get_date::<S>).put(routes::catalog::update_date::<S>),
        )
        // Cart
        .route("/carrito", get(routes::cart::view::<S>))
        .route("/carrito/items", post(routes::cart::add_item::<S>))
        .route("/carrito/items/{id}", delete(routes::cart::remove_item::<S>))
        .route("/carrito/checkout", post(routes::cart::checkout::<S>))
        // Seat counter maintenance
        .route(
            "/admin/cupos/{id}/diagnostico",
            get(routes::admin::diagnose::<S>),
        )
        .route("/admin/cupos/sincronizar", post(routes::admin::sync::<S>))
        .route("/admin/cupos/reset", post(routes::admin::reset::<S>))
        .route("/admin/notificaciones", get(routes::notifications::stream::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(middleware::from_fn_with_state(
            error_details,
            error::expose_internal_details,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
