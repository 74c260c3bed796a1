//! # Voice Session Engine - Service Entry Point
//!
//! Hosts the voice session engine behind a local HTTP/WebSocket control surface.
//!
//! ## Application Architecture:
//! - **config**: TOML file + environment variables (library crate)
//! - **session controller**: one tokio task owning the live voice session
//! - **state**: shared handle to the controller plus startup configuration
//! - **health**: service and session health endpoint
//! - **handlers**: session REST endpoints, the `/ws/session` event feed and HTTP errors
//!
//! ## Shutdown:
//! SIGINT/SIGTERM stops the HTTP server, then stops the session so every
//! device, graph and transport handle is released before the process exits.

mod handlers;
mod health;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_session_engine::audio::wav::WavAudioEngine;
use voice_session_engine::config::AppConfig;
use voice_session_engine::session::SessionController;
use voice_session_engine::transport::live::LiveConnector;
use voice_session_engine::transport::LiveConfig;

/// Upper bound on waiting for the session to settle during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    // The provider connection is TLS; pick the process-wide crypto backend once
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if !config.has_api_key() {
        warn!("No transport API key configured; sessions will fail to connect");
    }

    let engine = WavAudioEngine::new(&config.device);
    let connector = LiveConnector::new(
        config.transport.endpoint.clone(),
        Some(config.transport.api_key.clone()),
    );
    let (session, controller_task) =
        SessionController::spawn(Arc::new(engine), Arc::new(connector), LiveConfig::default());

    let app_state = AppState::new(config.clone(), session.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/session", web::get().to(handlers::get_session))
                    .route("/session/start", web::post().to(handlers::start_session))
                    .route("/session/stop", web::post().to(handlers::stop_session))
                    .route("/session/toggle", web::post().to(handlers::toggle_session)),
            )
            .route("/ws/session", web::get().to(handlers::session_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            match signal {
                Ok(name) => info!("Received {}, stopping server...", name),
                Err(e) => error!("Signal handler failed, stopping server: {}", e),
            }
            server_handle.stop(true).await;
        }
    }

    session.stop();
    let settled = tokio::time::timeout(
        SHUTDOWN_GRACE,
        session.wait_for(|s| !s.is_active),
    )
    .await;
    if settled.is_err() {
        warn!("Session did not settle within {:?}", SHUTDOWN_GRACE);
    }

    controller_task.abort();

    info!("Server stopped gracefully");
    Ok(())
}

/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "voice_session_engine=trace")
/// - If not set, defaults to "voice_session_engine=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_session_engine=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve with the name of the first SIGTERM or SIGINT received.
async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}
