//! Application hooks invoked by the event loop.

use crate::encoding::Encoding;
use crate::error::Result;
use crate::runtime::buffer::Buffer;
use mio::Token;
use std::borrow::Cow;
use std::net::SocketAddr;

/// One chunk read from an established connection.
#[derive(Debug)]
pub struct Received<'a> {
    pub token: Token,
    pub peer: SocketAddr,
    pub bytes: &'a [u8],
    encoding: Encoding,
}

impl<'a> Received<'a> {
    pub(crate) fn new(token: Token, peer: SocketAddr, bytes: &'a [u8], encoding: Encoding) -> Self {
        Self {
            token,
            peer,
            bytes,
            encoding,
        }
    }

    /// The chunk decoded with the configured encoding.
    pub fn text(&self) -> Cow<'a, str> {
        self.encoding.decode(self.bytes)
    }
}

/// Hooks for application logic layered on top of a client or server.
///
/// Every method has a no-op default, so `()` is a handler that only moves
/// whatever is placed in the outbound buffer directly.
pub trait Handler {
    /// A connection was accepted or established.
    fn on_connect(&mut self, _token: Token, _peer: SocketAddr) -> Result<()> {
        Ok(())
    }

    /// A chunk arrived. `outbound` is the role's write buffer.
    fn on_receive(&mut self, _received: &Received<'_>, _outbound: &mut Buffer) -> Result<()> {
        Ok(())
    }

    /// A connection is writable and about to take the next chunk.
    fn on_writable(&mut self, _token: Token, _outbound: &mut Buffer) -> Result<()> {
        Ok(())
    }

    /// A connection was closed, by the peer or by the liveness sweep.
    fn on_close(&mut self, _token: Token, _peer: SocketAddr) {}

    /// Whether write opportunities are wanted even when nothing is buffered.
    fn wants_write(&self) -> bool {
        false
    }

    /// Whether the application has nothing more to do. The loop stops once
    /// this is true and the outbound buffer is drained.
    fn is_done(&self) -> bool {
        false
    }
}

impl Handler for () {}
