mod alert;
mod cluster;
mod config;
mod metrics;
mod monitor;
mod notify;
mod probe;
mod protocol;
mod report;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigError};
use monitor::Monitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // A broken rule set or node list is fatal here, before any cycle runs
    let config = load_or_default_config()?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "health".to_string());

    match command.as_str() {
        "health" => {
            let monitor = Monitor::new(config);
            let snapshot = monitor.run_once().await?;
            print!("{}", report::tabular(&snapshot));
        }
        "cluster-state" => {
            let monitor = Monitor::new(config);
            let snapshot = monitor.run_once().await?;
            println!("{}", report::structured_json(&snapshot));
        }
        "test-failover" => {
            let monitor = Monitor::new(config);
            let snapshot = monitor.run_once().await?;
            let mut verdict = report::failover_verdict(&snapshot);
            if let Some(obj) = verdict.as_object_mut() {
                obj.insert(
                    "preferred_candidate".to_string(),
                    serde_json::json!(monitor.promotion_candidate(&snapshot)),
                );
            }
            if snapshot.failover_ready {
                info!("Failover test passed: cluster is ready for failover");
            } else {
                error!("Failover test failed: cluster is not ready for failover");
            }
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        "monitor" => {
            if config.metrics.enabled {
                let addr = config.metrics.listen_addr.clone();
                tokio::spawn(async move {
                    if let Err(e) = metrics::start_metrics_server(&addr).await {
                        error!(error = %e, "Metrics server failed");
                    }
                });
            }

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal, finishing current cycle");
                    signal_token.cancel();
                }
            });

            let mut monitor = Monitor::new(config);
            monitor.run(shutdown).await;
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: argus [health|monitor|cluster-state|test-failover]");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_or_default_config() -> Result<Config, ConfigError> {
    let config_paths = ["config/argus.toml", "argus.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return Ok(config);
            }
            // A missing file falls through to the next candidate; a file
            // that exists but does not parse or validate is fatal
            Err(ConfigError::IoError(_)) => {}
            Err(e) => {
                error!(path = path, error = %e, "Configuration rejected");
                return Err(e);
            }
        }
    }

    info!("Using default configuration");
    Ok(Config::default())
}
