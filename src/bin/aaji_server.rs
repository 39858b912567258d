//! Aaji dashboard gRPC server
//!
//! Serves connection snapshots, recent events and the live feed to dashboards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tonic::transport::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aaji_core::transport::DashboardServiceImpl;
use aaji_core::AajiConfig;

/// Server configuration
struct Args {
    /// Address to bind to
    addr: SocketAddr,
    /// JSON config file; the default channel set is used when absent
    config: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 50061)),
            config: None,
        }
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("error: --port requires a value");
                    std::process::exit(1);
                };
                let port: u16 = value.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid port number: {value}");
                    std::process::exit(1);
                });
                parsed.addr.set_port(port);
                i += 2;
            }
            "--config" | "-c" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                };
                parsed.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--help" | "-h" => {
                println!("aaji-server - Aaji dashboard gRPC server");
                println!();
                println!("USAGE:");
                println!("    aaji-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -p, --port <PORT>         Port to listen on [default: 50061]");
                println!("    -c, --config <FILE>       JSON config file [default: built-in channels]");
                println!("    -h, --help                Print help information");
                println!();
                println!("Log level is controlled by RUST_LOG [default: info].");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "aaji-server starting");

    let config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            AajiConfig::from_path(path).inspect_err(|e| error!("failed to load config: {e}"))?
        }
        None => AajiConfig::with_default_channels(),
    };

    let (registry, feed) = config.build()?;
    let feed = Arc::new(feed);
    let svc = DashboardServiceImpl::new(registry, Arc::clone(&feed)).into_server();

    info!(addr = %args.addr, "serving gRPC; press Ctrl+C to stop");

    Server::builder()
        .add_service(svc)
        .serve_with_shutdown(args.addr, async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    feed.shutdown();
    info!("shut down");
    Ok(())
}
