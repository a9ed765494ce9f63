use replog::{
    shutdown_signal, HttpSecondaryClient, PrimaryEnvConfig, PrimaryNode, PrimaryOptions, PrimaryServer,
    RetryPolicy, SecondaryId, SecondaryTransport,
};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("primary failed: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = PrimaryEnvConfig::from_env()?;
    let logger = replog::root_logger("primary", config.log_level);
    slog::info!(
        logger,
        "Starting primary on {} with {} secondaries: {:?}",
        config.bind_addr,
        config.secondaries.len(),
        config.secondaries
    );

    let mut secondaries: Vec<(SecondaryId, Arc<dyn SecondaryTransport>)> =
        Vec::with_capacity(config.secondaries.len());
    for url in &config.secondaries {
        let client = HttpSecondaryClient::new(
            url.clone(),
            config.replicate_timeout,
            config.health_timeout,
        )?;
        secondaries.push((SecondaryId::new(url.clone()), Arc::new(client)));
    }

    let node = PrimaryNode::spawn(
        logger.clone(),
        secondaries,
        PrimaryOptions {
            retry: RetryPolicy::default(),
            health_interval: config.health_interval,
            health_grace: config.health_interval * 3,
        },
    );

    let (shutdown_handle, shutdown) = shutdown_signal();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        drop(shutdown_handle);
    });

    PrimaryServer::new(logger, node)
        .run(config.bind_addr, shutdown)
        .await?;

    Ok(())
}
