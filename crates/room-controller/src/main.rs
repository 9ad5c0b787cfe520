//! Room Controller
//!
//! Stateful WebSocket signaling server for synchronized group video
//! playback.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize the snapshot store
//! 3. Spawn the actor system (`CoordinatorActor`)
//! 4. Start the WebSocket server
//! 5. Wait for shutdown signal, then cancel the actor hierarchy

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use room_controller::actors::CoordinatorActor;
use room_controller::config::Config;
use room_controller::persist::MemorySnapshotStore;
use room_controller::server;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rc_id = %config.rc_id,
        bind_address = %config.bind_address,
        stale_after_seconds = config.stale_after_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        buffer_recovery_seconds = config.buffer_recovery_seconds,
        "Configuration loaded successfully"
    );

    // Initialize actor system
    info!("Initializing actor system...");
    let store = Arc::new(MemorySnapshotStore::new());
    let (coordinator, coordinator_task) =
        CoordinatorActor::spawn(config.coordinator_settings(), store);
    info!("Actor system initialized");

    // Bind listener BEFORE serving to fail fast on bind errors
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind WebSocket server");
        format!("Failed to bind WebSocket server to {addr}: {e}")
    })?;
    info!(addr = %addr, "WebSocket server bound successfully");

    let app = server::router(coordinator.clone());
    let serve_coordinator = coordinator.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        serve_coordinator.cancelled().await;
        info!("WebSocket server shutting down");
    });

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "WebSocket server failed");
        }
    });

    // Wait for shutdown signal
    info!("Room Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    coordinator.cancel();

    // Give the coordinator time to drain its rooms
    if let Err(e) = tokio::time::timeout(Duration::from_secs(10), coordinator_task).await {
        warn!(error = %e, "Coordinator shutdown timed out");
    }
    server_task.abort();

    info!("Room Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
