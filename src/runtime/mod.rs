//! Readiness-based socket runtime.
//!
//! One thread, one selector, non-blocking sockets:
//! - `Buffer`: outbound bytes, drained one `buffer_size` chunk per send
//! - `Selector`: mio poll plus the registration table
//! - `Endpoint`: buffer, selector and the shared read/write primitives
//! - `ClientSocket` / `ServerSocket`: the two roles, driven by `EventHandler`

/// Debug-level diagnostics that only appear when the socket is configured
/// as verbose.
macro_rules! diag {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::debug!($($arg)+);
        }
    };
}

mod buffer;
mod client;
mod connection;
mod endpoint;
mod event_loop;
mod handler;
mod selector;
mod server;
pub mod signal;
mod token;

pub use buffer::{Buffer, Payload};
pub use client::ClientSocket;
pub use connection::{Registration, Source};
pub use endpoint::{Endpoint, ReadOutcome, Stats, WriteOutcome};
pub use event_loop::EventHandler;
pub use handler::{Handler, Received};
pub use selector::Selector;
pub use server::ServerSocket;
pub use token::{Marker, Readiness};
