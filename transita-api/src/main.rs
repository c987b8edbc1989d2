use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transita_api::{app, state::AuthConfig, AppState};
use transita_booking::{BookingCoordinator, SettlementProcessor};
use transita_core::notify::LoggingDispatcher;
use transita_core::TicketStore;
use transita_store::{DbClient, PgTicketStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transita_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = transita_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Transita API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to database");
    db.migrate().await.expect("Failed to run migrations");

    let store: Arc<dyn TicketStore> = Arc::new(PgTicketStore::new(db.pool.clone()));

    let (outbox_tx, outbox_rx) = tokio::sync::mpsc::channel(config.notifications.queue_capacity);
    tokio::spawn(transita_api::worker::run_notification_worker(
        outbox_rx,
        Arc::new(LoggingDispatcher),
    ));

    let app_state = AppState {
        store: store.clone(),
        booking: Arc::new(BookingCoordinator::new(store.clone())),
        settlement: Arc::new(SettlementProcessor::new(store, outbox_tx)),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
