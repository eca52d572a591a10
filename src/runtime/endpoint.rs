//! Role-independent half of a socket: configuration, outbound buffer,
//! selector, and the read/write primitives both roles share.
//!
//! Peer-level transport failures (reset, broken pipe, end of stream) are
//! absorbed here and surface as a closed connection. Everything else is
//! returned to the caller.

use crate::config::{SocketConfig, SocketKind};
use crate::error::{Error, Result};
use crate::runtime::buffer::Buffer;
use crate::runtime::handler::{Handler, Received};
use crate::runtime::selector::Selector;
use crate::runtime::token::{Marker, Readiness};
use bytes::Bytes;
use mio::Token;
use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::{debug, info};

/// Result of a single receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Up to `buffer_size` bytes arrived.
    Data(Bytes),
    /// Nothing to read right now.
    Pending,
    /// The peer closed or reset the connection.
    Closed,
}

/// Result of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Bytes handed to the kernel; any remainder stays buffered.
    Sent(usize),
    /// Nothing was buffered, nothing was sent.
    Idle,
    /// Socket not writable right now; the chunk stays buffered.
    Pending,
    /// The peer is gone.
    Closed,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub accepted: u64,
    pub closed: u64,
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// State shared by client and server roles.
pub struct Endpoint {
    config: SocketConfig,
    buffer: Buffer,
    selector: Selector,
    pub(crate) stats: Stats,
}

impl Endpoint {
    /// Validate the configuration and prepare buffer and selector.
    ///
    /// No socket is opened here; the role decides whether to connect out or
    /// bind and listen.
    pub fn new(config: SocketConfig) -> Result<Self> {
        config.validate()?;
        if config.socket_kind != SocketKind::Stream {
            return Err(Error::Unsupported(format!(
                "socket kind {:?}, only stream sockets are supported",
                config.socket_kind
            )));
        }

        let buffer = Buffer::new(config.buffer_size, config.encoding);
        let selector = Selector::new(config.events_capacity)?;

        Ok(Self {
            config,
            buffer,
            selector,
            stats: Stats::default(),
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut Selector {
        &mut self.selector
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Resolve the configured host and port to an address of the
    /// configured family.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let family = self.config.address_family;
        (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .find(|addr| family.matches(addr))
            .ok_or_else(|| Error::AddressResolution {
                host: self.config.host.clone(),
                port: self.config.port,
                family: family.name(),
            })
    }

    /// Decode received bytes with the configured encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.config.encoding.decode(bytes)
    }

    /// Receive up to `buffer_size` bytes from an established connection.
    pub fn read(&mut self, token: Token) -> Result<ReadOutcome> {
        let buffer_size = self.config.buffer_size;
        let stream = self
            .selector
            .get_mut(token)
            .ok_or(Error::NotRegistered(token))?
            .source
            .as_stream_mut()
            .ok_or_else(|| Error::Unsupported("read on a listening socket".to_string()))?;

        let mut chunk = vec![0u8; buffer_size];
        let result = stream.read(&mut chunk);

        match result {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                chunk.truncate(n);
                self.stats.reads += 1;
                self.stats.bytes_read += n as u64;
                Ok(ReadOutcome::Data(Bytes::from(chunk)))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.selector.clear_ready(token, Readiness::READABLE);
                Ok(ReadOutcome::Pending)
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadOutcome::Pending),
            Err(e) => {
                debug!(token = token.0, error = %e, "Receive failed, treating peer as gone");
                Ok(ReadOutcome::Closed)
            }
        }
    }

    /// Send the next chunk of the outbound buffer.
    ///
    /// An empty buffer sends nothing. Only the bytes the kernel accepted
    /// leave the buffer.
    pub fn write(&mut self, token: Token) -> Result<WriteOutcome> {
        let stream = self
            .selector
            .get_mut(token)
            .ok_or(Error::NotRegistered(token))?
            .source
            .as_stream_mut()
            .ok_or_else(|| Error::Unsupported("write on a listening socket".to_string()))?;

        let Some(chunk) = self.buffer.peek_chunk() else {
            return Ok(WriteOutcome::Idle);
        };
        let result = stream.write(chunk);

        match result {
            Ok(0) => Ok(WriteOutcome::Closed),
            Ok(n) => {
                self.buffer.consume(n);
                self.stats.writes += 1;
                self.stats.bytes_written += n as u64;
                Ok(WriteOutcome::Sent(n))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.selector.clear_ready(token, Readiness::WRITABLE);
                Ok(WriteOutcome::Pending)
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(WriteOutcome::Pending),
            Err(e) => {
                debug!(token = token.0, error = %e, "Send failed, treating peer as gone");
                Ok(WriteOutcome::Closed)
            }
        }
    }

    /// Deregister a connection and close it.
    ///
    /// Closing a token that is no longer registered is an error.
    pub fn close_connection(&mut self, token: Token) -> Result<Marker> {
        let marker = self.selector.close(token)?;
        self.stats.closed += 1;
        diag!(
            self.config.verbose,
            token = token.0,
            peer = ?marker.peer(),
            open = self.selector.len(),
            "Closed connection"
        );
        Ok(marker)
    }

    /// Close a connection and tell the handler about it.
    pub(crate) fn release<H: Handler + ?Sized>(&mut self, handler: &mut H, token: Token) -> Result<()> {
        let marker = self.close_connection(token)?;
        if let Marker::Established { peer } = marker {
            handler.on_close(token, peer);
        }
        Ok(())
    }

    /// Generic dispatch for an established connection: read first, then
    /// write.
    ///
    /// A read that finds the peer gone closes the connection and skips the
    /// write half.
    pub fn read_and_write<H: Handler + ?Sized>(
        &mut self,
        handler: &mut H,
        token: Token,
        readiness: Readiness,
    ) -> Result<()> {
        if readiness.readable {
            match self.read(token)? {
                ReadOutcome::Data(bytes) => {
                    let peer = self
                        .selector
                        .marker(token)
                        .and_then(|marker| marker.peer())
                        .ok_or(Error::NotRegistered(token))?;
                    let received = Received::new(token, peer, &bytes, self.config.encoding);
                    diag!(
                        self.config.verbose,
                        token = token.0,
                        %peer,
                        len = bytes.len(),
                        text = %received.text(),
                        "Received"
                    );
                    handler.on_receive(&received, &mut self.buffer)?;
                }
                ReadOutcome::Pending => {}
                ReadOutcome::Closed => {
                    self.release(handler, token)?;
                    return Ok(());
                }
            }
        }

        if readiness.writable && self.selector.contains(token) {
            handler.on_writable(token, &mut self.buffer)?;
            match self.write(token)? {
                WriteOutcome::Sent(n) => {
                    diag!(self.config.verbose, token = token.0, len = n, "Sent");
                }
                WriteOutcome::Idle | WriteOutcome::Pending => {}
                WriteOutcome::Closed => self.release(handler, token)?,
            }
        }

        Ok(())
    }

    /// Close every remaining registration. Returns how many were closed.
    pub fn shutdown(&mut self) -> usize {
        let closed = self.selector.close_all();
        self.stats.closed += closed as u64;
        if closed > 0 {
            info!(closed, "Released all sockets");
        }
        closed
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if !self.selector.is_empty() {
            self.shutdown();
        }
    }
}
