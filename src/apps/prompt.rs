//! Interactive handler for the client role.
//!
//! Input is read one line at a time, only when the connection is writable
//! and the previous line has been fully sent. The read itself blocks; that
//! is the point where the user is being asked.
//!
//! The server echoes, so every byte sent is expected back. After end of
//! input the handler keeps the loop running until those replies arrived.

use crate::error::{Error, Result};
use crate::runtime::{Buffer, Handler, Received};
use mio::Token;
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

/// Forwards input to the server and writes replies to the output.
pub struct Prompt<R, W> {
    input: R,
    output: W,
    eof: bool,
    /// Bytes sent that have not come back yet.
    outstanding: usize,
}

impl Prompt<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            eof: false,
            outstanding: 0,
        }
    }

    /// Whether the input has been exhausted.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Bytes sent whose echo has not been received.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    fn queue(&mut self, line: &[u8], outbound: &mut Buffer) -> Result<()> {
        let text = String::from_utf8_lossy(line);
        let before = outbound.len();
        match outbound.append(&*text) {
            Ok(()) => {
                self.outstanding += outbound.len() - before;
                Ok(())
            }
            Err(Error::Encode { encoding, reason }) => {
                warn!(encoding, %reason, "Dropping input that cannot be encoded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl<R: BufRead, W: Write> Handler for Prompt<R, W> {
    fn on_receive(&mut self, received: &Received<'_>, _outbound: &mut Buffer) -> Result<()> {
        self.outstanding = self.outstanding.saturating_sub(received.bytes.len());
        self.output.write_all(received.text().as_bytes())?;
        self.output.flush()?;
        Ok(())
    }

    fn on_writable(&mut self, _token: Token, outbound: &mut Buffer) -> Result<()> {
        if self.eof || !outbound.is_empty() {
            return Ok(());
        }

        // Lines end at b'\n', which never falls inside a multi-byte
        // character, so each line decodes on its own.
        let mut line = Vec::new();
        match self.input.read_until(b'\n', &mut line) {
            Ok(0) => {
                info!(outstanding = self.outstanding, "End of input");
                self.eof = true;
                Ok(())
            }
            Ok(_) => self.queue(&line, outbound),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn on_close(&mut self, token: Token, _peer: std::net::SocketAddr) {
        debug!(token = token.0, outstanding = self.outstanding, "Server closed");
    }

    fn wants_write(&self) -> bool {
        !self.eof
    }

    fn is_done(&self) -> bool {
        self.eof && self.outstanding == 0
    }
}

impl<R, W> std::fmt::Debug for Prompt<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("eof", &self.eof)
            .field("outstanding", &self.outstanding)
            .finish()
    }
}
