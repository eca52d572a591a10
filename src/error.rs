//! Error types shared by the socket layer.

use mio::Token;
use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the connection manager.
///
/// Transient peer failures (reset, broken pipe) never show up here; the
/// endpoint turns them into a closed connection. What remains is either an
/// environment failure or a broken invariant.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying socket or poll failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The descriptor already has a registration in the selector
    #[error("descriptor {fd} is already registered")]
    AlreadyRegistered { fd: i32 },

    /// No registration exists for the token
    #[error("{0:?} is not registered")]
    NotRegistered(Token),

    /// Text could not be represented in the configured encoding
    #[error("cannot encode text as {encoding}: {reason}")]
    Encode {
        encoding: &'static str,
        reason: String,
    },

    /// Requested transport combination is not available
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Host name did not resolve to an address of the configured family
    #[error("could not resolve {host}:{port} for {family}")]
    AddressResolution {
        host: String,
        port: u16,
        family: &'static str,
    },
}
