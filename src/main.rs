//! docker-upstreams daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod config;

use config::Config;
use docker_upstreams::{DockerRuntime, Upstreams};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = Config::load()?;
    info!("Starting docker-upstreams with config: {:?}", cfg);

    let runtime = DockerRuntime::connect(cfg.docker_host.as_deref(), cfg.connect_timeout_secs)
        .await
        .context("Failed to connect to Docker")?;

    let token = CancellationToken::new();
    let upstreams = Arc::new(Upstreams::provision(runtime, cfg.options(), &token).await?);
    info!("Tracking {} enabled container(s)", upstreams.containers().len());

    // Report every snapshot replacement
    let reporter = {
        let token = token.clone();
        let upstreams = Arc::clone(&upstreams);
        let mut generation = upstreams.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = generation.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let current = *generation.borrow_and_update();
                info!(
                    "Snapshot {} tracks {} enabled container(s), {} cached address(es)",
                    current,
                    upstreams.containers().len(),
                    upstreams.cached_addresses()
                );
            }
        })
    };

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    token.cancel();
    upstreams.shutdown().await;
    if let Err(e) = reporter.await {
        error!("Snapshot reporter failed: {}", e);
    }

    info!("Shutdown complete.");
    Ok(())
}
