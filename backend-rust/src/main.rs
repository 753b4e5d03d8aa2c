use std::sync::Arc;

use anyhow::Context;
use socketioxide::extract::SocketRef;
use socketioxide::SocketIo;
use tracing::info;

use caddie_backend::audit::AuditLogger;
use caddie_backend::auth::AuthEngine;
use caddie_backend::booking_engine::BookingEngine;
use caddie_backend::config::AppConfig;
use caddie_backend::handlers::{router, AppState};
use caddie_backend::notify::{on_connect, SocketIoNotifier};
use caddie_backend::payments::{gateway_from_config, PaymentService};
use caddie_backend::persistence::JsonFileStore;

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caddie_backend=info,socketioxide=warn,tower_http=info".into()),
        )
        .init();

    info!("⛳ Caddie booking backend starting...");

    let config = AppConfig::from_env();

    // Load persisted state
    let store = Arc::new(JsonFileStore::open(&config.state_file).await);
    let audit = AuditLogger::resume(&config.audit_log_path).await;
    let auth = Arc::new(AuthEngine::new(&config.jwt_secret));

    // Build Socket.IO layer
    let (socket_layer, io) = SocketIo::builder().build_layer();

    let auth_sock = auth.clone();
    io.ns("/", move |socket: SocketRef| {
        let auth = auth_sock.clone();
        async move {
            on_connect(socket, auth).await;
        }
    });

    let notifier = Arc::new(SocketIoNotifier::new(io));
    let engine = BookingEngine::new(store.clone(), notifier, audit.clone(), &config);
    let payments = PaymentService::new(
        store,
        gateway_from_config(&config),
        audit,
        config.commission_percentage,
    );

    let app = router(AppState {
        engine: Arc::new(engine),
        payments: Arc::new(payments),
        auth,
    })
    .layer(socket_layer);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
