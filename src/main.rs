use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bandwagon_hub::server::{run_server, ServerConfig};

/// The `PORT` environment variable, ignored when absent or unparseable.
fn port_from_env() -> Option<u16> {
    std::env::var("PORT").ok().and_then(|v| v.parse().ok())
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// The port to listen on for WebSocket connections. Falls back to the
    /// PORT environment variable, then 8080.
    #[clap(short, long)]
    pub port: Option<u16>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Outbound frame buffer depth per connected client.
    #[clap(long, default_value_t = 32)]
    pub send_queue_depth: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let config = ServerConfig {
        port: cli_args.port.or_else(port_from_env).unwrap_or(8080),
        metrics_port: cli_args.metrics_port,
        send_queue_depth: cli_args.send_queue_depth,
    };

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    run_server(config).await
}
