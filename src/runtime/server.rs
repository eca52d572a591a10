//! Server role: a listening socket plus the peers accepted from it.
//!
//! Readiness on the listener means "accept one connection"; readiness on
//! anything else goes to the shared read/write dispatch. A periodic sweep
//! closes write-registered peers that died without the loop noticing.

use crate::config::SocketConfig;
use crate::error::{Error, Result};
use crate::runtime::connection::Source;
use crate::runtime::endpoint::Endpoint;
use crate::runtime::event_loop::EventHandler;
use crate::runtime::handler::Handler;
use crate::runtime::token::{Marker, Readiness};
use mio::net::TcpListener;
use mio::{Interest, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Socket that accepts clients.
pub struct ServerSocket<H = ()> {
    endpoint: Endpoint,
    handler: H,
    listener: Token,
    local_addr: SocketAddr,
    last_sweep: Instant,
}

impl ServerSocket {
    /// Listen without application hooks.
    pub fn new(config: SocketConfig) -> Result<Self> {
        Self::with_handler(config, ())
    }
}

impl<H: Handler> ServerSocket<H> {
    /// Bind, listen, and register the listener for readability.
    pub fn with_handler(config: SocketConfig, handler: H) -> Result<Self> {
        let mut endpoint = Endpoint::new(config)?;
        let addr = endpoint.resolve()?;
        let listener = create_listener(endpoint.config(), addr)?;
        let local_addr = listener.local_addr()?;

        let token = endpoint.selector_mut().register(
            Source::Listener(listener),
            Interest::READABLE,
            Marker::Listener,
        )?;
        info!(addr = %local_addr, "Listening");

        Ok(Self {
            endpoint,
            handler,
            listener: token,
            local_addr,
            last_sweep: Instant::now(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token of the listening socket.
    pub fn listener_token(&self) -> Token {
        self.listener
    }

    /// Number of accepted connections currently open.
    pub fn connection_count(&self) -> usize {
        let selector = self.endpoint.selector();
        selector.len() - usize::from(selector.contains(self.listener))
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Accept one pending connection and register it for read and write.
    fn accept(&mut self) -> Result<()> {
        let listener = self
            .endpoint
            .selector()
            .get(self.listener)
            .and_then(|registration| registration.source.as_listener())
            .ok_or(Error::NotRegistered(self.listener))?;
        let accepted = listener.accept();

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                let token = self.endpoint.selector_mut().register(
                    Source::Stream(stream),
                    Interest::READABLE | Interest::WRITABLE,
                    Marker::Established { peer },
                )?;
                self.endpoint.stats.accepted += 1;
                diag!(
                    self.endpoint.config().verbose,
                    token = token.0,
                    %peer,
                    open = self.connection_count(),
                    "Accepted connection"
                );
                self.handler.on_connect(token, peer)?;
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.endpoint
                    .selector_mut()
                    .clear_ready(self.listener, Readiness::READABLE);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "Accept failed");
                self.endpoint
                    .selector_mut()
                    .clear_ready(self.listener, Readiness::READABLE);
            }
        }
        Ok(())
    }

    /// Close write-registered peers whose socket reports an error or no
    /// longer has a peer. Returns how many were closed.
    pub fn check_connections(&mut self) -> Result<usize> {
        let selector = self.endpoint.selector();
        let stale: Vec<Token> = selector
            .writers()
            .into_iter()
            .filter(|&token| {
                selector
                    .get(token)
                    .is_some_and(|registration| !registration.is_alive())
            })
            .collect();

        for &token in &stale {
            warn!(
                token = token.0,
                peer = ?self.endpoint.selector().marker(token).and_then(|m| m.peer()),
                "Closing stale connection"
            );
            self.endpoint.release(&mut self.handler, token)?;
        }
        Ok(stale.len())
    }
}

impl<H: Handler> EventHandler for ServerSocket<H> {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    fn handle_event(&mut self, token: Token, readiness: Readiness) -> Result<()> {
        match self.endpoint.selector().marker(token) {
            Some(Marker::Listener) => self.accept(),
            Some(Marker::Established { .. }) => {
                self.endpoint
                    .read_and_write(&mut self.handler, token, readiness)
            }
            None => Err(Error::NotRegistered(token)),
        }
    }

    fn wants_write(&self) -> bool {
        !self.endpoint.buffer().is_empty() || self.handler.wants_write()
    }

    fn is_done(&self) -> bool {
        self.endpoint.buffer().is_empty() && self.handler.is_done()
    }

    fn maintain(&mut self) -> Result<()> {
        if self.last_sweep.elapsed() < self.endpoint.config().sweep_interval {
            return Ok(());
        }
        self.last_sweep = Instant::now();
        self.check_connections()?;
        Ok(())
    }
}

/// Create a non-blocking listening socket bound to `addr`.
fn create_listener(config: &SocketConfig, addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        config.address_family.domain(),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.backlog)?;

    let listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(listener))
}
