use replog::{shutdown_signal, ReplicaStore, SecondaryEnvConfig, SecondaryServer};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("secondary failed: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = SecondaryEnvConfig::from_env()?;
    let logger = replog::root_logger("secondary", config.log_level);
    slog::info!(
        logger,
        "Starting secondary on {} (ingress delay {:?})",
        config.bind_addr,
        config.delay
    );

    let store = Arc::new(ReplicaStore::new());

    let (shutdown_handle, shutdown) = shutdown_signal();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        drop(shutdown_handle);
    });

    SecondaryServer::new(logger, store, config.delay)
        .run(config.bind_addr, shutdown)
        .await?;

    Ok(())
}
