//! Waypost - geofence violation detection and alerting for tracked tourists.
//!
//! # API Endpoints
//!
//! - `POST /locations` - Ingest a location sample and evaluate geofences
//! - `POST /emergency` - Panic button
//! - `GET /zones`, `POST /zones`, `GET /zones/:id`, `PUT /zones/:id/active` - Zone management
//! - `GET /alerts/recent`, `POST /alerts/:id/resolve` - Alerts
//! - `GET /notifications/recent` - Notifications
//! - `GET /subjects/:id/location` - Latest known location of a subject
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use waypost::api::{AppState, router};
use waypost::config::Config;
use waypost::notify::WebhookNotifier;
use waypost::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("waypost=info".parse()?))
        .init();

    let config = Config::from_env();

    info!(
        port = config.port,
        db_url = %config.database_url,
        zone_cache_seconds = config.zone_cache_ttl.as_secs(),
        notify_timeout_seconds = config.notify_timeout.as_secs(),
        "Starting Waypost server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let notifier = WebhookNotifier::from_url(config.notify_webhook_url.as_deref())
        .with_timeout(config.notify_timeout);
    if !notifier.is_enabled() {
        info!("No notification webhook configured; notifications are stored only");
    }

    let state = AppState::new(storage, notifier, config.zone_cache_ttl);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Waypost is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
