//! The readiness-driven event loop shared by both roles.
//!
//! Each iteration waits once on the selector and hands every fired
//! registration, in reported order, to the role's `handle_event`. The only
//! place the thread can block is that wait.

use crate::error::Result;
use crate::runtime::endpoint::Endpoint;
use crate::runtime::signal;
use crate::runtime::token::Readiness;
use mio::Token;
use tracing::info;

/// Role-specific event handling on top of an [`Endpoint`].
pub trait EventHandler {
    fn endpoint(&self) -> &Endpoint;

    fn endpoint_mut(&mut self) -> &mut Endpoint;

    /// React to readiness on one registration.
    fn handle_event(&mut self, token: Token, readiness: Readiness) -> Result<()>;

    /// Whether cached write readiness should be reported.
    fn wants_write(&self) -> bool {
        !self.endpoint().buffer().is_empty()
    }

    /// Whether the loop may stop even though sockets are still registered.
    fn is_done(&self) -> bool {
        false
    }

    /// Housekeeping after each batch.
    fn maintain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run a single iteration and return how many events were handled.
    ///
    /// Returns immediately, without waiting, when nothing is registered.
    fn turn(&mut self) -> Result<usize> {
        if self.endpoint().selector().is_empty() {
            return Ok(0);
        }

        let timeout = self.endpoint().config().poll_timeout();
        let want_write = self.wants_write();
        let fired = self
            .endpoint_mut()
            .selector_mut()
            .select(timeout, want_write)?;

        let mut handled = 0;
        for (token, readiness) in fired {
            // closed by an earlier event in this batch
            if !self.endpoint().selector().contains(token) {
                continue;
            }
            self.handle_event(token, readiness)?;
            handled += 1;
        }

        self.maintain()?;
        Ok(handled)
    }

    /// Run the loop until interrupted or until an unrecoverable error.
    ///
    /// Unlike a plain serve-forever loop, it also returns early in two
    /// cases. The first is when nothing is left registered, because the
    /// next wait could never wake. The second is when the role reports
    /// [`EventHandler::is_done`]. A server keeps its listener registered,
    /// so neither case applies to it unless the listener is closed.
    ///
    /// Every remaining socket is deregistered and closed on the way out,
    /// whichever way the loop ended.
    fn start(&mut self) -> Result<()> {
        signal::install()?;
        signal::reset();
        info!(
            registrations = self.endpoint().selector().len(),
            "Event loop started"
        );

        let outcome = loop {
            if signal::requested() {
                info!("Interrupted, shutting down");
                break Ok(());
            }
            if self.endpoint().selector().is_empty() {
                info!("No registrations left");
                break Ok(());
            }
            if self.is_done() {
                info!("Nothing left to do");
                break Ok(());
            }
            if let Err(e) = self.turn() {
                break Err(e);
            }
        };

        self.endpoint_mut().shutdown();
        let stats = self.endpoint().stats();
        info!(
            accepted = stats.accepted,
            closed = stats.closed,
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            "Event loop stopped"
        );
        outcome
    }
}
