//! # Whisper API Backend - Main Application Entry Point
//!
//! Sets up an Actix-web HTTP server that exposes Whisper speech-to-text over
//! a single-shot multipart endpoint and a streaming WebSocket endpoint.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **error**: The `ApiError` type and its HTTP response mapping
//! - **device**: Compute device selection (CPU/CUDA/Metal)
//! - **audio**: Audio normalization to canonical 16 kHz mono f32
//! - **transcription**: Model loading, the registry, and the inference engine
//! - **state**: Shared application state handed to every handler
//! - **handlers**: HTTP request handlers (single-shot transcription, model list)
//! - **websocket**: The streaming session actor
//! - **health**: Liveness endpoint
//!
//! ## Startup Sequence:
//! Configuration is loaded and validated first, then every configured model
//! is loaded eagerly. Models that fail to load are skipped with a logged
//! error; the server starts with whatever loaded. The finished registry is
//! injected into `AppState`, so nothing below `main` reaches for a global.

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod state;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::ModelRegistry;

/// Global shutdown flag, set by the signal handler task and polled by the
/// shutdown waiter below.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-api-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}, {} model(s) configured",
        config.server.host,
        config.server.port,
        config.models.len()
    );

    // Load all configured models up front. This can take a while on first
    // run (weights are downloaded from the Hugging Face hub).
    let registry = Arc::new(ModelRegistry::load(&config.models).await);
    if registry.is_empty() {
        warn!("No models loaded; every transcription request will fail with 404");
    } else {
        info!("Models ready: {:?}", registry.list());
    }

    let app_state = AppState::new(config.clone(), registry);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

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
            .route("/transcribe", web::post().to(handlers::transcribe))
            .route(
                "/transcribe/stream",
                web::get().to(websocket::transcribe_stream),
            )
            .route("/models", web::get().to(handlers::list_models))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal.
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging.
///
/// `RUST_LOG` controls the filter; the default keeps our own crate at debug
/// and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_api_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
///
/// Graceful shutdown lets in-flight transcriptions finish before the process
/// exits instead of cutting them off mid-inference.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
