//! Connection records owned by the selector.
//!
//! A registration owns its socket. Dropping the record closes the socket,
//! so the selector only drops a record after deregistering it.

use crate::runtime::token::Marker;
use mio::event::Source as EventSource;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Socket handle held by a registration.
#[derive(Debug)]
pub enum Source {
    Listener(TcpListener),
    Stream(TcpStream),
}

impl Source {
    pub fn as_stream(&self) -> Option<&TcpStream> {
        match self {
            Source::Stream(stream) => Some(stream),
            Source::Listener(_) => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut TcpStream> {
        match self {
            Source::Stream(stream) => Some(stream),
            Source::Listener(_) => None,
        }
    }

    pub fn as_listener(&self) -> Option<&TcpListener> {
        match self {
            Source::Listener(listener) => Some(listener),
            Source::Stream(_) => None,
        }
    }
}

impl AsRawFd for Source {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Source::Listener(listener) => listener.as_raw_fd(),
            Source::Stream(stream) => stream.as_raw_fd(),
        }
    }
}

impl EventSource for Source {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Source::Listener(listener) => listener.register(registry, token, interests),
            Source::Stream(stream) => stream.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Source::Listener(listener) => listener.reregister(registry, token, interests),
            Source::Stream(stream) => stream.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Source::Listener(listener) => listener.deregister(registry),
            Source::Stream(stream) => stream.deregister(registry),
        }
    }
}

/// A socket, what it is registered for, and what readiness on it means.
#[derive(Debug)]
pub struct Registration {
    pub source: Source,
    pub interest: Interest,
    pub marker: Marker,
}

impl Registration {
    pub fn new(source: Source, interest: Interest, marker: Marker) -> Self {
        Self {
            source,
            interest,
            marker,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }

    pub fn is_writer(&self) -> bool {
        self.interest.is_writable()
    }

    /// Whether an established stream still looks connected.
    ///
    /// A pending socket error or a missing peer means the other side went
    /// away without the loop noticing through a read. Listeners are always
    /// considered alive.
    pub fn is_alive(&self) -> bool {
        match &self.source {
            Source::Listener(_) => true,
            Source::Stream(stream) => {
                matches!(stream.take_error(), Ok(None)) && stream.peer_addr().is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_connected_stream_is_alive() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        let (_accepted, _) = listener.accept().unwrap();

        let peer: SocketAddr = addr;
        let registration = Registration::new(
            Source::Stream(TcpStream::from_std(client)),
            Interest::READABLE | Interest::WRITABLE,
            Marker::Established { peer },
        );

        assert!(registration.is_writer());
        assert!(registration.is_alive());
        assert!(registration.source.as_stream().is_some());
        assert!(registration.source.as_listener().is_none());
    }

    #[test]
    fn test_listener_registration() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let fd = listener.as_raw_fd();

        let registration = Registration::new(
            Source::Listener(TcpListener::from_std(listener)),
            Interest::READABLE,
            Marker::Listener,
        );

        assert_eq!(registration.fd(), fd);
        assert!(!registration.is_writer());
        assert!(registration.is_alive());
    }
}
