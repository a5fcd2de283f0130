//! PharmChat API server

use std::sync::Arc;

use anyhow::Context;
use pharmchat_api::{
    auth::{AuthResolver, JwtManager},
    build_router,
    config::LogFormat,
    store::{PgMessageStore, PgStaffDirectory},
    websocket::{ChatContext, Hub},
    AppState, Config,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(config.log_format);

    let pool = pharmchat_shared::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    pharmchat_shared::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let jwt = JwtManager::new(
        &config.jwt_secret,
        config.jwt_expiry_hours,
        config.chat_token_expiry_minutes,
    );
    let auth = AuthResolver::with_defaults(jwt, Arc::new(PgStaffDirectory::new(pool.clone())));

    // One hub per process, owned here and shared with every connection
    let hub = Arc::new(Hub::new());
    let chat = ChatContext::new(Arc::clone(&hub), Arc::new(PgMessageStore::new(pool)));

    let pump_settings = config.pump_settings();
    let state = AppState::new(chat, Arc::new(auth), pump_settings);
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "PharmChat API listening");

    // Upgraded sockets are not tracked by axum, so the hub closes them itself
    let shutdown_hub = Arc::clone(&hub);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_hub.close_all().await;
        })
        .await
        .context("server error")?;

    if !hub.wait_until_empty(pump_settings.write_wait).await {
        tracing::warn!(connections = ?hub.stats().await, "Chat connections still open at shutdown");
    }

    tracing::info!("PharmChat API stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pharmchat_api=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
