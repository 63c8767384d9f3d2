//! sortbench: a TCP sort-offload server, three ways.
//!
//! Picks one of the three concurrency architectures from configuration
//! and runs it until the process is killed:
//! - simple: one thread per connection
//! - pooled: per-connection readers + fixed worker pool
//! - multiplexed: readiness-multiplexed event threads + worker pool

use sortbench::config::{Architecture, Config};
use sortbench::{MultiplexedServer, PooledServer, SimpleServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        port = config.port,
        arch = ?config.arch,
        workers = config.workers,
        queue_depth = ?config.queue_depth,
        "Starting sortbench server"
    );

    match config.arch {
        Architecture::Simple => {
            let server = SimpleServer::bind(config.port)?;
            server.start()?;
        }
        Architecture::Pooled => {
            let server = PooledServer::bind(config.port, config.workers, config.queue_depth)?;
            server.start()?;
        }
        Architecture::Multiplexed => {
            let server =
                MultiplexedServer::bind(config.port, config.workers, config.queue_depth)?;
            server.start()?;
        }
    }

    Ok(())
}
