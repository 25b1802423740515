//! line-echo-client: an interactive client for newline-delimited TCP servers
//!
//! Each line typed by the operator is sent to the server as one `\n`-terminated
//! frame, and the server's one-frame reply is displayed before the next prompt.
//!
//! Features:
//! - Newline framing that tolerates replies split across any number of reads
//! - Graceful shutdown on end of input, peer disconnect, or Ctrl-C
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod error;
mod interrupt;
mod protocol;
mod session;

use config::Config;
use error::{ConnectError, SessionError};
use interrupt::Interrupt;
use session::{Outcome, Session};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging on stderr, away from the interactive surface
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        nodelay = config.nodelay,
        "Starting line-echo-client"
    );

    let interrupt = Interrupt::process();
    if let Err(e) = interrupt::install() {
        warn!(error = %e, "Failed to install interrupt handler");
    }

    run(&config, interrupt)
}

/// Connect, run one session, and report how it ended.
fn run(config: &Config, interrupt: Interrupt) -> ExitCode {
    println!("Connecting to {}:{}...", config.host, config.port);

    let connection = match connection::open(&config.host, config.port) {
        Ok(connection) => connection,
        Err(_) if interrupt.requested() => {
            return ExitCode::from(report(&Ok(Outcome::Interrupted), &mut io::stdout()));
        }
        Err(e) => return ExitCode::from(report_connect_failure(&e, &mut io::stdout())),
    };

    if let Err(e) = connection.set_nodelay(config.nodelay) {
        warn!(error = %e, "Failed to set TCP_NODELAY");
    }
    println!("Connected! Type a message and press Enter.");

    let result = {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut session = Session::new(connection, stdin.lock(), stdout.lock(), interrupt);
        let result = session.run();
        info!(
            peer = %session.connection().peer_addr(),
            exchanges = session.exchanges(),
            "Disconnected"
        );
        result
    };

    ExitCode::from(report(&result, &mut io::stdout()))
}

/// Print the failed connect attempt and a hint for the operator.
fn report_connect_failure(err: &ConnectError, out: &mut impl Write) -> u8 {
    // Nothing useful can be done if stdout itself is gone.
    let _ = writeln!(out, "Error: {err}.");
    let _ = writeln!(
        out,
        "Make sure the echo server is running on {}:{}.",
        err.host, err.port
    );
    EXIT_FAILURE
}

/// Print the one message that describes how the session ended.
///
/// Returns the process exit status.
fn report(result: &Result<Outcome, SessionError>, out: &mut impl Write) -> u8 {
    let (message, code) = match result {
        Ok(Outcome::ClosedByOperator) => ("\nExiting...".to_string(), EXIT_SUCCESS),
        Ok(Outcome::ClosedByPeer) => ("\nServer disconnected.".to_string(), EXIT_SUCCESS),
        Ok(Outcome::Interrupted) => ("\nClient stopped.".to_string(), EXIT_SUCCESS),
        Err(e) => (format!("An error occurred: {e}"), EXIT_FAILURE),
    };
    let _ = writeln!(out, "{message}");
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(result: Result<Outcome, SessionError>) -> (String, u8) {
        let mut out = Vec::new();
        let code = report(&result, &mut out);
        (String::from_utf8(out).unwrap(), code)
    }

    #[test]
    fn test_report_operator_eof() {
        let (text, code) = reported(Ok(Outcome::ClosedByOperator));
        assert_eq!(text, "\nExiting...\n");
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[test]
    fn test_report_peer_disconnect() {
        let (text, code) = reported(Ok(Outcome::ClosedByPeer));
        assert_eq!(text, "\nServer disconnected.\n");
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[test]
    fn test_report_interrupt() {
        let (text, code) = reported(Ok(Outcome::Interrupted));
        assert_eq!(text, "\nClient stopped.\n");
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[test]
    fn test_report_unexpected_error() {
        let err = SessionError::Send(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let (text, code) = reported(Err(err));
        assert_eq!(text, "An error occurred: failed to send request: pipe closed\n");
        assert_eq!(code, EXIT_FAILURE);
    }

    #[test]
    fn test_report_connect_failure() {
        let err = ConnectError {
            host: "127.0.0.1".to_string(),
            port: 8000,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        };
        let mut out = Vec::new();
        let code = report_connect_failure(&err, &mut out);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Error: Could not connect to 127.0.0.1:8000: connection refused.",
                "Make sure the echo server is running on 127.0.0.1:8000.",
            ]
        );
        assert_eq!(code, EXIT_FAILURE);
    }
}
