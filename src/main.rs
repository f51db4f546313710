use anyhow::Result;
use smartsync::mirror::SessionSupervisor;
use smartsync::utils::mirror_log::default_log_dir;
use smartsync::{Config, MirrorLog};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with minimal overhead
    smartsync::utils::logging::init_tracing();

    // Load configuration
    let config = Config::load()?;

    info!("Starting smartsync v{}", smartsync::VERSION);
    info!(
        "Mirroring {} target(s) into {}",
        config.targets.len(),
        config.sync_root.display()
    );

    let log = MirrorLog::with_log_dir(config.logging, default_log_dir());
    let supervisor = SessionSupervisor::new(&config, log);
    supervisor.start_all();

    shutdown_signal().await;

    info!("Shutting down");
    supervisor.stop_all().await;
    info!("All mirror sessions stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
