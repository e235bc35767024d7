//! memkv - An In-Memory Cache Server Speaking the Memcached Text Protocol
//!
//! This is the main entry point for the memkv server.
//! It sets up logging, the TCP listener and the shared store, then hands each
//! incoming connection to its own task.

use clap::Parser;
use memkv::commands::CommandHandler;
use memkv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_LINE_BYTES};
use memkv::storage::StorageEngine;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "memkv", author, version, about, long_about = None)]
/// In-memory cache server speaking a subset of the memcached text protocol
struct Config {
    /// Interface to listen on
    #[arg(short = 'l', long = "listen", value_name = "HOST", env = "MEMKV_LISTEN", default_value = memkv::DEFAULT_HOST)]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, value_name = "PORT", env = "MEMKV_PORT", default_value_t = memkv::DEFAULT_PORT)]
    port: u16,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "memkv=trace")
    #[arg(long, value_name = "FILTER", env = "MEMKV_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Longest request or data line a client may send before it is dropped
    #[arg(long, value_name = "BYTES", env = "MEMKV_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    max_line_bytes: usize,
}

impl Config {
    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn print_banner(config: &Config) {
    println!(
        r#"
memkv v{} - In-Memory Cache Server (memcached text protocol)
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        memkv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_logging(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    print_banner(&config);
    info!(
        address = %config.bind_address(),
        max_line_bytes = config.max_line_bytes,
        "Listening"
    );

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C, running until killed");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats), config.max_line_bytes) => {}
        _ = shutdown => {}
    }

    let store = storage.stats();
    info!(
        keys = store.keys,
        get_hits = store.get_hits,
        get_misses = store.get_misses,
        stores = store.stores,
        not_stored = store.not_stored,
        cas_mismatches = store.cas_mismatches,
        expired = store.expired,
        "Storage statistics"
    );
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        active = stats.active_connections.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Connection statistics"
    );
    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    max_line_bytes: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler,
                    stats,
                    max_line_bytes,
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_overrides() {
        let config = Config::try_parse_from([
            "memkv",
            "--listen",
            "0.0.0.0",
            "-p",
            "22122",
            "--max-line-bytes",
            "4096",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:22122");
        assert_eq!(config.max_line_bytes, 4096);
    }

    #[test]
    fn test_config_rejects_bad_port() {
        assert!(Config::try_parse_from(["memkv", "--port", "not-a-port"]).is_err());
        assert!(Config::try_parse_from(["memkv", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_config_definition() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
