//! Registration markers and readiness masks.
//!
//! Every registration carries a [`Marker`] telling the event handler whether
//! readiness on it means "a peer is waiting to be accepted" or "an
//! established peer can be read from / written to".

use mio::event::Event;
use mio::Interest;
use std::net::SocketAddr;

/// Tag attached to each registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Listening socket; readiness means a connection can be accepted.
    Listener,
    /// Connected peer eligible for read/write dispatch.
    Established {
        /// Remote address, kept for diagnostics.
        peer: SocketAddr,
    },
}

impl Marker {
    pub fn is_listener(&self) -> bool {
        matches!(self, Marker::Listener)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            Marker::Listener => None,
            Marker::Established { peer } => Some(*peer),
        }
    }
}

/// Which directions fired for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub const READABLE: Readiness = Readiness {
        readable: true,
        writable: false,
    };

    pub const WRITABLE: Readiness = Readiness {
        readable: false,
        writable: true,
    };

    pub const BOTH: Readiness = Readiness {
        readable: true,
        writable: true,
    };

    /// Readiness reported by a mio event.
    ///
    /// Hang-ups and socket errors are folded into readability so the next
    /// read observes the end of stream or the error itself.
    pub fn from_event(event: &Event) -> Self {
        Self {
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_write_closed(),
        }
    }

    /// Restrict to the directions covered by `interest`.
    pub fn within(self, interest: Interest) -> Self {
        Self {
            readable: self.readable && interest.is_readable(),
            writable: self.writable && interest.is_writable(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }

    /// Union of two masks.
    pub fn merge(self, other: Readiness) -> Self {
        Self {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
        }
    }
}
