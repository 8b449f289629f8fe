//! rangeseal-store binary: reference remote store
//!
//! ```bash
//! rangeseal-store --port 3000 --metrics
//! ```

use std::net::SocketAddr;

use clap::Parser;
use rangeseal_store::ServerBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rangeseal-store")]
#[command(about = "Serve encrypted documents and index entries over HTTP")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    #[arg(long, default_value = "3000")]
    port: u16,

    /// Expose Prometheus metrics at /metrics
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rangeseal_store=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let server = ServerBuilder::new()
        .addr(SocketAddr::new(args.host, args.port))
        .with_metrics(args.metrics)
        .build()?;

    tracing::info!(port = args.port, metrics = args.metrics, "Store ready");
    server.run().await?;

    Ok(())
}
