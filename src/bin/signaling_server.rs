//! Standalone relay binary
//!
//! Run with:
//!   cargo run --bin signaling-server -- --port 8080

use std::net::SocketAddr;

use clap::Parser;
use tracing::{info, Level};

use callsignal::network::{RelayServer, DEFAULT_HUB_PATH};

/// Reference relay for callsignal clients
#[derive(Parser, Debug)]
#[command(name = "signaling-server")]
#[command(about = "Reference relay for callsignal clients")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Hub path clients connect to
    #[arg(long, default_value = DEFAULT_HUB_PATH)]
    hub_path: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    info!("Relay starting on ws://{}{}", addr, args.hub_path);

    let server = RelayServer::with_hub_path(&args.hub_path);
    let shutdown = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shutdown.shutdown();
        }
    });

    server.run(&addr.to_string()).await?;

    Ok(())
}
