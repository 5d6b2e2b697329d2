//! Main Entrypoint for the Tutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Loading the course outline and the session instruction template.
//! 3. Creating the Gemini Live transport shared by all connections.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use clap::Parser;
use gemini_realtime::{GeminiConfig, GeminiLiveTransport};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tutor_api::{
    assets::{load_instructions_template, load_outline},
    config::Config,
    router::create_router,
    state::AppState,
};

#[derive(Parser, Debug)]
#[command(version, about = "Voice tutoring service for step-based courses")]
struct Args {
    /// Course outline JSON file. Overrides OUTLINE_PATH.
    #[arg(short, long, value_name = "FILE")]
    outline: Option<PathBuf>,

    /// Address to listen on. Overrides BIND_ADDRESS.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(outline) = args.outline {
        config.outline_path = Some(outline);
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Course and Prompts ---
    let outline = load_outline(config.outline_path.as_deref())?;
    let instructions_template = load_instructions_template(&config.prompts_path)?;

    // --- 4. Initialize the Realtime Transport ---
    let gemini = GeminiConfig {
        model: config.gemini_model.clone(),
        endpoint: config.gemini_endpoint.clone(),
        voice: config.gemini_voice.clone(),
        ..GeminiConfig::new(config.gemini_api_key.clone())
    };
    let transport = Arc::new(GeminiLiveTransport::new(gemini));

    let app_state = Arc::new(AppState::new(
        config.clone(),
        outline,
        transport,
        instructions_template,
    ));
    info!(steps = app_state.steps.len(), "Course flattened.");

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.gemini_model,
        bind_address = %config.bind_address,
        rebind_delay = ?config.rebind_delay,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
