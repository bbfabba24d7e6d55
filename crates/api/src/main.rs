//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config};
use booking_store::{BookingStore, InMemoryBookingStore, PostgresBookingStore};
use domain::{AdminBroadcast, LogMailer, Notifier, Outbox, spawn_dispatcher};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: BookingStore + Clone + 'static>(
    store: S,
    config: Config,
    outbox: Outbox,
    admin_feed: AdminBroadcast,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(store, &config, outbox, admin_feed));
    let app = api::create_app(state.clone(), metrics_handle, &config);

    let addr = config.addr();
    tracing::info!(%addr, environment = ?config.environment, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            state.begin_shutdown();
        })
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Start the notification dispatcher
    let (outbox, receiver) = Outbox::channel(config.notification_buffer);
    let admin_feed = AdminBroadcast::new(config.notification_buffer);
    let sinks: Vec<Arc<dyn Notifier>> =
        vec![Arc::new(LogMailer), Arc::new(admin_feed.clone())];
    let dispatcher = spawn_dispatcher(receiver, sinks);

    // 4. Pick the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");
            let store = PostgresBookingStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL booking store");
            serve(store, config, outbox, admin_feed, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory booking store");
            let store = InMemoryBookingStore::new();
            serve(store, config, outbox, admin_feed, metrics_handle).await;
        }
    }

    // The outbox was dropped with the app state, so the dispatcher drains and exits.
    let _ = dispatcher.await;
    tracing::info!("server shut down gracefully");
}
