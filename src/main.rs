//! socket-comms: echo server and interactive client
//!
//! `socket-comms server` echoes whatever its clients send.
//! `socket-comms client` forwards lines typed on stdin and prints replies.

use socket_comms::apps::{Echo, Prompt};
use socket_comms::config::{Config, Mode};
use socket_comms::{ClientSocket, EventHandler, ServerSocket};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let level = if config.socket.verbose {
        "debug"
    } else {
        config.socket.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        mode = ?config.mode,
        host = %config.socket.host,
        port = config.socket.port,
        family = config.socket.address_family.name(),
        buffer_size = config.socket.buffer_size,
        encoding = %config.socket.encoding,
        timeout = ?config.socket.poll_timeout(),
        "Starting socket-comms"
    );

    match config.mode {
        Mode::Server => run_server(config),
        Mode::Client => run_client(config),
    }
}

/// Listen and echo until interrupted
fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = ServerSocket::with_handler(config.socket, Echo::new())?;
    server.start()?;
    info!(echoed = server.handler().echoed(), "Server stopped");
    Ok(())
}

/// Connect and forward stdin until end of input or hangup
fn run_client(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ClientSocket::with_handler(config.socket, Prompt::stdio())?;
    client.start()?;
    info!("Client stopped");
    Ok(())
}
