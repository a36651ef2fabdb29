#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Ledgerwatch node entrypoint (systemd-friendly).
//! Loads the config, starts the monitor, optional self-mining and the HTTP API, and
//! shuts everything down on Ctrl-C.

use anyhow::Context;
use ledgerwatch::{
    api,
    config::NodeConfig,
    core::shutdown,
    monitoring::logging,
    node::{Capabilities, Node},
};
use std::sync::Arc;
use tracing::{error, info};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| env("LEDGERWATCH_CONFIG", "node_config.json"));

    // Config failures are fatal and happen before the subscriber knows the format.
    let cfg = match NodeConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config load failed: {e}");
            std::process::exit(1);
        }
    };
    logging::init(cfg.log_format);

    if let Err(e) = run(cfg, &config_path).await {
        error!(error = %format!("{e:#}"), "node failed");
        std::process::exit(1);
    }
}

async fn run(cfg: NodeConfig, config_path: &str) -> anyhow::Result<()> {
    let (trigger, shutdown) = shutdown::channel();

    let node = Node::build(&cfg, Capabilities::from_config(&cfg), shutdown.clone())
        .await
        .context("node startup")?;
    let node = Arc::new(node);

    info!(
        config = %config_path,
        difficulty = cfg.difficulty,
        peers = node.registry.len(),
        height = node.ledger.len()? - 1,
        "ledgerwatch node starting"
    );

    let monitor_task = node.spawn_monitor(shutdown.clone());
    let mining_task = node.spawn_self_mining(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "http api listening");

    let mut http_shutdown = shutdown.clone();
    let server = axum::serve(listener, api::router(node.clone()))
        .with_graceful_shutdown(async move { http_shutdown.wait().await });

    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => {
                error!(error = %e, "cannot listen for ctrl-c; running until killed");
                std::future::pending::<()>().await;
            }
        }
        trigger.trigger();
    });

    server.await.context("http server")?;
    let _ = monitor_task.await;
    if let Some(t) = mining_task {
        let _ = t.await;
    }
    signal_task.abort();
    info!("ledgerwatch node stopped");
    Ok(())
}
