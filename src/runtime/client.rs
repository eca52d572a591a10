//! Client role: one outbound connection.
//!
//! The peer exists as soon as construction returns, so there is no accept
//! phase and every readiness event goes straight to read/write dispatch.

use crate::config::SocketConfig;
use crate::error::Result;
use crate::runtime::buffer::Payload;
use crate::runtime::connection::Source;
use crate::runtime::endpoint::Endpoint;
use crate::runtime::event_loop::EventHandler;
use crate::runtime::handler::Handler;
use crate::runtime::token::{Marker, Readiness};
use mio::net::TcpStream;
use mio::{Interest, Token};
use std::net::SocketAddr;
use tracing::info;

/// Socket that connects to a server.
pub struct ClientSocket<H = ()> {
    endpoint: Endpoint,
    handler: H,
    token: Token,
    peer: SocketAddr,
}

impl ClientSocket {
    /// Connect without application hooks.
    pub fn new(config: SocketConfig) -> Result<Self> {
        Self::with_handler(config, ())
    }
}

impl<H: Handler> ClientSocket<H> {
    /// Connect to the configured address and register for read and write.
    pub fn with_handler(config: SocketConfig, mut handler: H) -> Result<Self> {
        let mut endpoint = Endpoint::new(config)?;
        let addr = endpoint.resolve()?;
        let stream = connect(endpoint.config(), addr)?;
        let peer = stream.peer_addr()?;

        let token = endpoint.selector_mut().register(
            Source::Stream(stream),
            Interest::READABLE | Interest::WRITABLE,
            Marker::Established { peer },
        )?;
        info!(%peer, "Connected");
        handler.on_connect(token, peer)?;

        Ok(Self {
            endpoint,
            handler,
            token,
            peer,
        })
    }

    /// Queue text or bytes for the server.
    pub fn send(&mut self, payload: impl Into<Payload>) -> Result<()> {
        self.endpoint.buffer_mut().append(payload)
    }

    /// Token of the connection while it is open.
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection is still registered.
    pub fn is_connected(&self) -> bool {
        self.endpoint.selector().contains(self.token)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<H: Handler> EventHandler for ClientSocket<H> {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    fn handle_event(&mut self, token: Token, readiness: Readiness) -> Result<()> {
        self.endpoint
            .read_and_write(&mut self.handler, token, readiness)
    }

    fn wants_write(&self) -> bool {
        !self.endpoint.buffer().is_empty() || self.handler.wants_write()
    }

    fn is_done(&self) -> bool {
        self.endpoint.buffer().is_empty() && self.handler.is_done()
    }
}

/// Open a stream socket for the configured family and connect it.
///
/// The configured timeout bounds the connect unless blocking mode is on.
fn connect(config: &SocketConfig, addr: SocketAddr) -> Result<TcpStream> {
    let socket = socket2::Socket::new(
        config.address_family.domain(),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    let connect_timeout = config
        .timeout
        .filter(|timeout| !config.blocking && !timeout.is_zero());
    match connect_timeout {
        Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
        None => socket.connect(&addr.into())?,
    }

    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    let stream: std::net::TcpStream = socket.into();
    Ok(TcpStream::from_std(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::{Read, Write};
    use std::time::Duration;

    fn config_for(addr: SocketAddr, buffer_size: usize) -> SocketConfig {
        let mut config = SocketConfig::new(addr.ip().to_string(), addr.port());
        config.buffer_size = buffer_size;
        config.timeout = Some(Duration::from_millis(200));
        config
    }

    #[test]
    fn test_connect_registers_single_peer() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = ClientSocket::new(config_for(addr, 8)).unwrap();

        assert_eq!(client.peer_addr(), addr);
        assert!(client.is_connected());
        assert_eq!(client.endpoint().selector().len(), 1);
        assert_eq!(client.endpoint().selector().writers(), vec![client.token()]);
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port with nobody listening
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        assert!(matches!(
            ClientSocket::new(config_for(addr, 8)),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_turns_send_buffer_in_chunks() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = ClientSocket::new(config_for(addr, 4)).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        client.send("hello world!").unwrap();

        for _ in 0..10 {
            client.turn().unwrap();
            if client.endpoint().buffer().is_empty() {
                break;
            }
        }
        assert!(client.endpoint().buffer().is_empty());
        assert_eq!(client.endpoint().stats().writes, 3);

        let mut received = [0u8; 12];
        server_side.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"hello world!");
    }

    #[test]
    fn test_start_returns_when_server_hangs_up() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = ClientSocket::new(config_for(addr, 8)).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        server_side.write_all(b"bye").unwrap();
        drop(server_side);

        client.start().unwrap();

        assert!(!client.is_connected());
        assert_eq!(client.endpoint().stats().bytes_read, 3);
    }

    #[test]
    fn test_idle_turn_without_timeout_waits_for_traffic() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = config_for(addr, 8);
        config.timeout = None;
        assert_eq!(config.poll_timeout(), None);

        let mut client = ClientSocket::new(config).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();

        let worker = std::thread::spawn(move || {
            let mut turns = 0;
            while client.endpoint().stats().bytes_read == 0 {
                client.turn().unwrap();
                turns += 1;
            }
            turns
        });

        std::thread::sleep(Duration::from_millis(200));
        server_side.write_all(b"x").unwrap();
        let turns = worker.join().unwrap();

        // the initial writable edge, then one wait that ends with the data
        assert!(turns <= 3, "idle loop spun {turns} times");
    }

    #[test]
    fn test_idle_turn_waits_for_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = config_for(addr, 8);
        config.timeout = Some(Duration::from_millis(50));
        let mut client = ClientSocket::new(config).unwrap();
        let _server_side = listener.accept().unwrap();

        client.turn().unwrap();
        let started = std::time::Instant::now();
        assert_eq!(client.turn().unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
