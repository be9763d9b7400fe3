use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqslite::broker::{Broker, BrokerConfig};
use sqslite::clock::Clock;
use sqslite::config::Config;
use sqslite::{admin, server, sweeper};

#[derive(Parser)]
#[command(
    name = "sqslite",
    about = "Local in-memory SQS-compatible message broker"
)]
struct Args {
    /// Address to bind (default 0.0.0.0).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (default 9324).
    #[arg(long)]
    port: Option<u16>,
    /// Region used in queue ARNs (default us-east-1).
    #[arg(long)]
    region: Option<String>,
    /// Account id used in queue URLs and ARNs (default 000000000000).
    #[arg(long)]
    account_id: Option<String>,
    /// Sweeper tick period in milliseconds.
    #[arg(long, default_value = "1000")]
    sweep_interval_ms: u64,
    /// YAML configuration file with queues to create at startup.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let file_config = args.config.as_deref().map(Config::load).transpose()?;
    let server_section = file_config
        .as_ref()
        .map(|c| c.server.clone())
        .unwrap_or_default();

    let bind_host = args
        .host
        .or(server_section.host.clone())
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = args.port.or(server_section.port).unwrap_or(9324);
    let broker_config = BrokerConfig {
        host: "localhost".into(),
        port,
        region: args
            .region
            .or(server_section.region)
            .unwrap_or_else(|| "us-east-1".to_string()),
        account_id: args
            .account_id
            .or(server_section.account_id)
            .unwrap_or_else(|| "000000000000".to_string()),
    };

    let broker = Arc::new(Broker::new(broker_config, Clock::system()));
    if let Some(ref config) = file_config {
        broker.import_configuration(config)?;
        info!(queues = config.queues.len(), "configuration imported");
    }

    sweeper::spawn(broker.clone(), Duration::from_millis(args.sweep_interval_ms));

    let app = server::router(broker.clone()).merge(admin::router(broker));
    let listener = tokio::net::TcpListener::bind((bind_host.as_str(), port)).await?;
    info!(host = %bind_host, port, "sqslite listening");
    axum::serve(listener, app).await?;
    Ok(())
}
