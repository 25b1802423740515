//! Interactive session loop.
//!
//! Drives one connection through the prompt/send/receive cycle:
//!
//! ```text
//! AwaitingInput -> Sending -> AwaitingReply -> Displaying -> AwaitingInput
//! ```
//!
//! and ends in exactly one `Outcome`, or a `SessionError` for unexpected
//! I/O failures. The connection is closed before `run` returns either way.

use bytes::Bytes;
use std::io::{BufRead, Write};
use tracing::{debug, info, trace};

use crate::connection::Connection;
use crate::error::SessionError;
use crate::interrupt::Interrupt;
use crate::protocol::{self, Reply};

/// Shown before each read of operator input.
pub const PROMPT: &str = "> ";

/// Prefix for each displayed response.
pub const RESPONSE_LABEL: &str = "Server Echo: ";

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Operator input reached end of stream.
    ClosedByOperator,
    /// The peer ended the stream.
    ClosedByPeer,
    /// The operator interrupted the client.
    Interrupted,
}

/// Current step of the session.
#[derive(Debug)]
enum State {
    AwaitingInput,
    /// Encoded request waiting to be written.
    Sending(Bytes),
    AwaitingReply,
    /// Decoded frame waiting to be shown.
    Displaying(String),
    Closed(Outcome),
}

/// A session over one connection.
pub struct Session<I, O> {
    connection: Connection,
    input: I,
    output: O,
    interrupt: Interrupt,
    exchanges: u64,
}

impl<I: BufRead, O: Write> Session<I, O> {
    pub fn new(connection: Connection, input: I, output: O, interrupt: Interrupt) -> Self {
        Self {
            connection,
            input,
            output,
            interrupt,
            exchanges: 0,
        }
    }

    /// Run until a terminal state is reached.
    pub fn run(&mut self) -> Result<Outcome, SessionError> {
        let mut state = State::AwaitingInput;

        loop {
            state = match self.step(state) {
                Ok(State::Closed(outcome)) => {
                    self.connection.close();
                    info!(?outcome, exchanges = self.exchanges, "Session ended");
                    return Ok(outcome);
                }
                Ok(next) => next,
                Err(e) => {
                    self.connection.close();
                    debug!(error = %e, exchanges = self.exchanges, "Session failed");
                    return Err(e);
                }
            };
        }
    }

    /// Advance the state machine by one transition.
    fn step(&mut self, state: State) -> Result<State, SessionError> {
        if self.interrupt.requested() {
            return Ok(State::Closed(Outcome::Interrupted));
        }
        trace!(?state, "Step");

        match state {
            State::AwaitingInput => {
                self.output
                    .write_all(PROMPT.as_bytes())
                    .and_then(|()| self.output.flush())
                    .map_err(SessionError::Display)?;

                match protocol::read_operator_line(&mut self.input, &self.interrupt) {
                    Ok(Some(line)) => Ok(State::Sending(protocol::encode_request(&line))),
                    Ok(None) => Ok(State::Closed(Outcome::ClosedByOperator)),
                    Err(e) if self.interrupt.is_cause(&e) => {
                        Ok(State::Closed(Outcome::Interrupted))
                    }
                    Err(e) => Err(SessionError::Input(e)),
                }
            }
            State::Sending(request) => match self.connection.send(&request) {
                Ok(()) => Ok(State::AwaitingReply),
                Err(e) if self.interrupt.is_cause(&e) => Ok(State::Closed(Outcome::Interrupted)),
                Err(e) => Err(SessionError::Send(e)),
            },
            State::AwaitingReply => match self.connection.read_frame(&self.interrupt) {
                Ok(Reply::Frame(frame)) => Ok(State::Displaying(frame)),
                Ok(Reply::Closed) => Ok(State::Closed(Outcome::ClosedByPeer)),
                // read_frame only fails on operator interrupt
                Err(_) => Ok(State::Closed(Outcome::Interrupted)),
            },
            State::Displaying(frame) => {
                writeln!(self.output, "{RESPONSE_LABEL}{frame}")
                    .and_then(|()| self.output.flush())
                    .map_err(SessionError::Display)?;
                self.exchanges += 1;
                Ok(State::AwaitingInput)
            }
            State::Closed(outcome) => Ok(State::Closed(outcome)),
        }
    }

    /// Number of completed request/response exchanges.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[cfg(test)]
    fn output(&self) -> &O {
        &self.output
    }
}
