//! Echo handler for the server role.

use crate::error::Result;
use crate::runtime::{Buffer, Handler, Received};
use mio::Token;
use std::net::SocketAddr;
use tracing::info;

/// Queues every received chunk for sending.
///
/// The server has a single outbound buffer, so an echoed chunk goes to
/// whichever connection becomes writable first. With one client that is
/// always the sender.
#[derive(Debug, Default)]
pub struct Echo {
    echoed: u64,
}

impl Echo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes queued for echo so far.
    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl Handler for Echo {
    fn on_connect(&mut self, token: Token, peer: SocketAddr) -> Result<()> {
        info!(token = token.0, %peer, "Client connected");
        Ok(())
    }

    fn on_receive(&mut self, received: &Received<'_>, outbound: &mut Buffer) -> Result<()> {
        outbound.append(received.bytes)?;
        self.echoed += received.bytes.len() as u64;
        Ok(())
    }

    fn on_close(&mut self, token: Token, peer: SocketAddr) {
        info!(token = token.0, %peer, "Client disconnected");
    }
}
