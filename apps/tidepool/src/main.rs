use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tidepool::cli::{self, Cli, Commands};
use tidepool::{Config, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from(cli.serve);

    // RUST_LOG wins; otherwise verbosity picks the default level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    if let Some(Commands::Probe {
        url,
        channel,
        timeout_secs,
    }) = cli.command
    {
        if let Err(e) = cli::run_probe(url, channel, timeout_secs).await {
            error!("Probe error: {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    let server = RelayServer::bind(config.clone()).await?.with_metrics(metrics);
    info!(
        port = server.port(),
        verbose = config.verbose,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "starting tidepool relay"
    );

    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}
