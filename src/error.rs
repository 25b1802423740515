//! Error types surfaced by the client.
//!
//! Graceful terminations (operator EOF, peer disconnect, interrupt) are not
//! errors; they are reported as a session `Outcome`. Only the failures below
//! reach the top level.

use std::io;

/// The initial connection attempt failed.
///
/// Refused, unreachable, timed out and unresolvable all collapse into this
/// one kind; the caller reports it and exits.
#[derive(Debug)]
pub struct ConnectError {
    pub host: String,
    pub port: u16,
    pub source: io::Error,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Could not connect to {}:{}: {}",
            self.host, self.port, self.source
        )
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Unexpected I/O failure while the session loop is running.
#[derive(Debug)]
pub enum SessionError {
    /// Reading operator input failed.
    Input(io::Error),
    /// Writing a request to the peer failed.
    Send(io::Error),
    /// Writing the prompt or a response to the local display failed.
    Display(io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Input(e) => write!(f, "failed to read input: {}", e),
            SessionError::Send(e) => write!(f, "failed to send request: {}", e),
            SessionError::Display(e) => write!(f, "failed to write output: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Input(e) | SessionError::Send(e) | SessionError::Display(e) => Some(e),
        }
    }
}
