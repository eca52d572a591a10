//! socket-comms: a minimal bidirectional socket layer
//!
//! Both roles share one single-threaded, readiness-driven loop:
//! - `ServerSocket` listens, accepts, and exchanges data with many peers
//! - `ClientSocket` connects to one server
//!
//! Features:
//! - Outbound buffer drained one `buffer_size` chunk per send
//! - Text encoding on append (utf-8, ascii, latin-1)
//! - Orderly shutdown on SIGINT/SIGTERM
//! - Configuration via CLI arguments or TOML file

pub mod apps;
pub mod config;
pub mod encoding;
pub mod error;
pub mod runtime;

pub use config::{AddressFamily, Config, SocketConfig, SocketKind};
pub use encoding::Encoding;
pub use error::{Error, Result};
pub use runtime::{
    Buffer, ClientSocket, EventHandler, Handler, Marker, Payload, Readiness, Received,
    ServerSocket,
};
