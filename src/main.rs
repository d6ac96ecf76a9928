// AirSync - Main Entry Point
// Copyright (C) 2025 - Shared-sky state synchronization client
// Licensed under AGPL v3

use airsync::bridge::{CsvBridge, LifecycleBridge, LogBridge};
use airsync::config::{self, Config};
use airsync::net::transport::endpoint_with_token;
use airsync::net::Transport;
use airsync::ownship::OrbitSource;
use airsync::registry::Registry;
use airsync::sampler::Sampler;
use std::sync::Arc;
use tokio::signal;
use clap::Parser;
use tracing::{info, error, warn};
use tower_http::services::ServeDir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting shared-sky client");

    // Resolve credentials and build the relay endpoint
    let token = match config::resolve_token(&config) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to read token file: {}", e);
            return Err(e.into());
        }
    };
    if token.is_none() {
        warn!("No auth token configured, connecting unauthenticated");
    }
    let url = endpoint_with_token(&config.server_url, token.as_deref());

    let own_id = config
        .entity_id
        .clone()
        .unwrap_or_else(config::generate_entity_id);
    info!("Own entity id: {}", own_id);

    let registry = Arc::new(Registry::new(own_id.clone()));

    // Optional: HTTP server to expose work directory (entities.json)
    if let Some(port) = std::env::var("HTTP_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
    {
        tokio::spawn(serve_work_dir(port, config.work_dir.clone()));
    }

    // Single connection task; the handle is all the sampler needs
    info!("Connecting to {}", config.server_url);
    let transport = Transport::start(url, registry.clone());

    // Render side: CSV recorder if requested, debug logging otherwise
    let bridge: Box<dyn LifecycleBridge> = match &config.write_csv {
        Some(filename) => {
            info!("Writing sampled states to {}", filename);
            match CsvBridge::new(filename) {
                Ok(csv_bridge) => Box::new(csv_bridge),
                Err(e) => {
                    error!("Failed to open CSV output file {}: {}", filename, e);
                    return Err(e.into());
                }
            }
        }
        None => Box::new(LogBridge),
    };

    let own_source = OrbitSource::new(config.latitude, config.longitude, config.elevation_m);

    // Spawn the render loop
    let sampler = Sampler::new(
        registry.clone(),
        transport,
        bridge,
        Box::new(own_source),
        own_id,
        config.work_dir.clone(),
        config.status_interval,
    );
    tokio::spawn(sampler.run());

    info!("Client ready");

    // Wait for shutdown signal (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            return Err(err.into());
        }
    }

    // Report final statistics
    let entity_count = registry.entity_count().await;
    info!("Client stopped. Final entity count: {}", entity_count);

    Ok(())
}

/// Serve the work directory over HTTP so the entities.json snapshot can be
/// polled remotely.
async fn serve_work_dir(port: u16, work_dir: String) {
    let addr = (std::net::Ipv4Addr::UNSPECIFIED, port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Status server failed to bind port {}: {}", port, e);
            return;
        }
    };
    info!("Status server on port {} serving {}", port, work_dir);
    let app = axum::Router::new().nest_service("/", ServeDir::new(work_dir));
    if let Err(e) = axum::serve(listener, app).await {
        error!("Status server error: {}", e);
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let span_events = if verbose {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(span_events)
        .with_max_level(level)
        .init();

    if verbose {
        info!("Verbose logging enabled (DEBUG level)");
    }
}
