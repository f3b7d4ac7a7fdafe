//! # BASALT Server Binary
//!
//! Loads configuration, sets up logging (stdout plus a startup-dated log
//! file), binds the sockets, and runs until ctrl-c.
//!
//! ```bash
//! basalt_server --config basalt.toml --port 42069 --seed 69420
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use basalt_core::ServerConfig;
use basalt_server::TerrainServer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Usage: basalt_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>   Config file (default: basalt.toml)");
    println!("  -p, --port <PORT>     TCP port override");
    println!("  -s, --seed <SEED>     World seed override");
    println!("  -h, --help            Show this help");
}

fn init_logging(config: &ServerConfig) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&config.log_dir)?;
    let name = format!("basalt-{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let path = config.log_dir.join(name);
    let file = std::fs::File::create(&path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("basalt.toml");
    let mut port_override: Option<u16> = None;
    let mut seed_override: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port_override = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--seed" | "-s" => {
                if i + 1 < args.len() {
                    seed_override = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("unknown argument: {other}");
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let mut config = ServerConfig::load(&config_path)?;
    if let Some(port) = port_override {
        config.tcp_port = port;
    }
    if let Some(seed) = seed_override {
        config.world_seed = seed;
    }

    let log_path = init_logging(&config)?;
    tracing::info!(config = %config_path.display(), log = %log_path.display(), "starting");

    let server = TerrainServer::bind(config).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            shutdown.trigger();
        }
    });

    server.run().await?;
    Ok(())
}
