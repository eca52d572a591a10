//! Readiness multiplexer over `mio::Poll`.
//!
//! The selector owns every registered socket in a slab keyed by token. That
//! table is the single source of truth for which connections exist: a
//! socket enters it on register and is closed right after it leaves it.
//!
//! ## Level-triggered reporting
//!
//! mio notifies on readiness *edges*, while the event loop drains at most one
//! chunk per readiness report. The selector therefore remembers which
//! directions fired for each registration and keeps reporting them on every
//! `select` until the endpoint sees `WouldBlock` in that direction and calls
//! [`Selector::clear_ready`]. Cached write readiness is only re-reported when
//! the caller has something to write, otherwise an idle connection would turn
//! every wait into a busy poll.

use crate::error::{Error, Result};
use crate::runtime::connection::{Registration, Source};
use crate::runtime::token::{Marker, Readiness};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;
use tracing::{trace, warn};

struct Slot {
    registration: Registration,
    /// Directions that fired and have not been drained yet.
    ready: Readiness,
}

impl Slot {
    fn pending(&self, want_write: bool) -> Readiness {
        Readiness {
            readable: self.ready.readable,
            writable: self.ready.writable && want_write,
        }
    }
}

/// Registration table plus the poll instance it is registered with.
pub struct Selector {
    poll: Poll,
    events: Events,
    slots: Slab<Slot>,
    fds: HashSet<RawFd>,
}

impl Selector {
    /// Create a selector that collects up to `events_capacity` events per wait.
    pub fn new(events_capacity: usize) -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
            slots: Slab::new(),
            fds: HashSet::new(),
        })
    }

    /// Register a socket and take ownership of it.
    ///
    /// Fails if the descriptor already has a registration.
    pub fn register(&mut self, source: Source, interest: Interest, marker: Marker) -> Result<Token> {
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&source);
        if self.fds.contains(&fd) {
            // The descriptor belongs to the existing registration; dropping
            // this handle would close it underneath that registration.
            std::mem::forget(source);
            return Err(Error::AlreadyRegistered { fd });
        }

        let entry = self.slots.vacant_entry();
        let token = Token(entry.key());
        let mut registration = Registration::new(source, interest, marker);
        self.poll
            .registry()
            .register(&mut registration.source, token, interest)?;

        entry.insert(Slot {
            registration,
            ready: Readiness::default(),
        });
        self.fds.insert(fd);

        trace!(token = token.0, fd, ?marker, "Registered");
        Ok(token)
    }

    /// Remove a registration and hand the socket back to the caller.
    ///
    /// Fails if the token is not registered.
    pub fn deregister(&mut self, token: Token) -> Result<Registration> {
        let mut slot = self
            .slots
            .try_remove(token.0)
            .ok_or(Error::NotRegistered(token))?;
        self.fds.remove(&slot.registration.fd());

        self.poll
            .registry()
            .deregister(&mut slot.registration.source)?;

        trace!(token = token.0, "Deregistered");
        Ok(slot.registration)
    }

    /// Deregister, then close the socket.
    ///
    /// Returns the marker the registration carried.
    pub fn close(&mut self, token: Token) -> Result<Marker> {
        let registration = self.deregister(token)?;
        let marker = registration.marker;
        drop(registration);
        Ok(marker)
    }

    /// Close every registration. Returns how many were closed.
    ///
    /// Keeps going when a single deregistration fails.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for token in self.tokens() {
            match self.close(token) {
                Ok(_) => closed += 1,
                Err(e) => warn!(token = token.0, error = %e, "Failed to close registration"),
            }
        }
        closed
    }

    /// Wait for readiness and report what fired.
    ///
    /// Events come in the order mio returned them, followed by registrations
    /// with undrained cached readiness in ascending token order. When such
    /// cached readiness exists the wait does not block. An interrupted wait
    /// yields an empty batch.
    pub fn select(
        &mut self,
        timeout: Option<Duration>,
        want_write: bool,
    ) -> Result<Vec<(Token, Readiness)>> {
        let has_pending = self
            .slots
            .iter()
            .any(|(_, slot)| !slot.pending(want_write).is_empty());
        let timeout = if has_pending {
            Some(Duration::ZERO)
        } else {
            timeout
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let mut fired: Vec<(Token, Readiness)> = Vec::new();
        let mut index: HashMap<Token, usize> = HashMap::new();

        for event in self.events.iter() {
            let token = event.token();
            let Some(slot) = self.slots.get_mut(token.0) else {
                continue;
            };
            let readiness = Readiness::from_event(event).within(slot.registration.interest);
            slot.ready = slot.ready.merge(readiness);

            let reported = readiness.merge(slot.pending(want_write));
            if reported.is_empty() {
                continue;
            }
            match index.get(&token) {
                Some(&pos) => fired[pos].1 = fired[pos].1.merge(reported),
                None => {
                    index.insert(token, fired.len());
                    fired.push((token, reported));
                }
            }
        }

        for (key, slot) in self.slots.iter() {
            let token = Token(key);
            let pending = slot.pending(want_write);
            if !pending.is_empty() && !index.contains_key(&token) {
                fired.push((token, pending));
            }
        }

        Ok(fired)
    }

    /// Mark directions as drained so they are no longer re-reported.
    pub fn clear_ready(&mut self, token: Token, drained: Readiness) {
        if let Some(slot) = self.slots.get_mut(token.0) {
            slot.ready.readable &= !drained.readable;
            slot.ready.writable &= !drained.writable;
        }
    }

    /// Tokens of every live registration.
    pub fn tokens(&self) -> Vec<Token> {
        self.slots.iter().map(|(key, _)| Token(key)).collect()
    }

    /// Tokens of registrations with write interest.
    pub fn writers(&self) -> Vec<Token> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.registration.is_writer())
            .map(|(key, _)| Token(key))
            .collect()
    }

    pub fn get(&self, token: Token) -> Option<&Registration> {
        self.slots.get(token.0).map(|slot| &slot.registration)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Registration> {
        self.slots.get_mut(token.0).map(|slot| &mut slot.registration)
    }

    pub fn marker(&self, token: Token) -> Option<Marker> {
        self.get(token).map(|registration| registration.marker)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.slots.contains(token.0)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use std::io::Write;
    use std::net::SocketAddr;
    use std::os::unix::io::{AsRawFd, FromRawFd};

    const WAIT: Option<Duration> = Some(Duration::from_millis(500));

    fn stream_pair() -> (TcpStream, std::net::TcpStream, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (accepted, peer) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (TcpStream::from_std(accepted), client, peer)
    }

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        (TcpListener::from_std(listener), addr)
    }

    #[test]
    fn test_register_and_close() {
        let mut selector = Selector::new(16).unwrap();
        let (stream, _client, peer) = stream_pair();

        let token = selector
            .register(
                Source::Stream(stream),
                Interest::READABLE | Interest::WRITABLE,
                Marker::Established { peer },
            )
            .unwrap();

        assert_eq!(selector.len(), 1);
        assert_eq!(selector.tokens(), vec![token]);
        assert_eq!(selector.writers(), vec![token]);
        assert_eq!(selector.marker(token), Some(Marker::Established { peer }));

        assert_eq!(selector.close(token).unwrap(), Marker::Established { peer });
        assert!(selector.is_empty());
        assert!(selector.writers().is_empty());

        // closing twice is an invariant violation
        assert!(matches!(
            selector.close(token),
            Err(Error::NotRegistered(t)) if t == token
        ));
    }

    #[test]
    fn test_deregister_unknown_token_fails() {
        let mut selector = Selector::new(16).unwrap();
        assert!(matches!(
            selector.deregister(Token(42)),
            Err(Error::NotRegistered(Token(42)))
        ));
    }

    #[test]
    fn test_double_registration_fails() {
        let mut selector = Selector::new(16).unwrap();
        let (listener, _) = listener();
        let fd = listener.as_raw_fd();
        selector
            .register(Source::Listener(listener), Interest::READABLE, Marker::Listener)
            .unwrap();

        // A second handle for the same descriptor
        let duplicate = unsafe { TcpListener::from_raw_fd(fd) };
        let result = selector.register(Source::Listener(duplicate), Interest::READABLE, Marker::Listener);

        assert!(matches!(result, Err(Error::AlreadyRegistered { fd: f }) if f == fd));
        assert_eq!(selector.len(), 1);
    }

    #[test]
    fn test_writers_excludes_listener() {
        let mut selector = Selector::new(16).unwrap();
        let (listener, _) = listener();
        let (stream, _client, peer) = stream_pair();

        let listener_token = selector
            .register(Source::Listener(listener), Interest::READABLE, Marker::Listener)
            .unwrap();
        let stream_token = selector
            .register(
                Source::Stream(stream),
                Interest::READABLE | Interest::WRITABLE,
                Marker::Established { peer },
            )
            .unwrap();

        assert_eq!(selector.tokens().len(), 2);
        assert!(selector.tokens().contains(&listener_token));
        assert_eq!(selector.writers(), vec![stream_token]);
    }

    #[test]
    fn test_listener_readiness_reported() {
        let mut selector = Selector::new(16).unwrap();
        let (listener, addr) = listener();
        let token = selector
            .register(Source::Listener(listener), Interest::READABLE, Marker::Listener)
            .unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();
        let fired = selector.select(WAIT, false).unwrap();

        assert_eq!(fired, vec![(token, Readiness::READABLE)]);
    }

    #[test]
    fn test_cached_readiness_until_drained() {
        let mut selector = Selector::new(16).unwrap();
        let (stream, mut client, peer) = stream_pair();
        let token = selector
            .register(
                Source::Stream(stream),
                Interest::READABLE | Interest::WRITABLE,
                Marker::Established { peer },
            )
            .unwrap();

        client.write_all(b"ping").unwrap();

        // Wait until both directions have been seen once
        let mut seen = Readiness::default();
        for _ in 0..10 {
            for (t, readiness) in selector.select(WAIT, true).unwrap() {
                assert_eq!(t, token);
                seen = seen.merge(readiness);
            }
            if seen == Readiness::BOTH {
                break;
            }
        }
        assert_eq!(seen, Readiness::BOTH);

        // Not drained yet, so it is reported again without new edges
        let fired = selector.select(WAIT, true).unwrap();
        assert_eq!(fired, vec![(token, Readiness::BOTH)]);

        // Without anything to write only readability is re-reported
        let fired = selector.select(WAIT, false).unwrap();
        assert_eq!(fired, vec![(token, Readiness::READABLE)]);

        selector.clear_ready(token, Readiness::READABLE);
        let fired = selector.select(Some(Duration::from_millis(50)), false).unwrap();
        assert!(fired.is_empty());

        let fired = selector.select(WAIT, true).unwrap();
        assert_eq!(fired, vec![(token, Readiness::WRITABLE)]);
    }
}
