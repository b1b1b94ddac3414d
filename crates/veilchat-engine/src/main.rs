//! Crypto engine sidecar binary.
//!
//! Spawned by the node with `--port <n>`; binds to loopback only.
//! Logs go to stdout where the supervising node captures and
//! re-emits them.

use clap::Parser;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use veilchat_engine::{CryptoEngineServer, EngineService};

/// CLI arguments for the crypto engine.
#[derive(Parser, Debug)]
#[command(author, version, about = "Veilchat crypto engine sidecar")]
struct Args {
    /// Port to listen on (loopback only).
    #[arg(short, long, default_value_t = 50051)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], args.port));

    tracing::info!(%addr, "crypto engine listening");

    Server::builder()
        .add_service(CryptoEngineServer::new(EngineService))
        .serve(addr)
        .await?;

    Ok(())
}
