//! Connection manager.
//!
//! Opens the single blocking TCP connection a session runs over and owns it
//! until the session ends. Closing is idempotent and also happens on drop,
//! so every exit path releases the socket.

use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::error::ConnectError;
use crate::interrupt::Interrupt;
use crate::protocol::{self, Reply};

/// Read buffer size for peer responses.
const READ_BUFFER_SIZE: usize = 4096;

/// An open connection to the remote endpoint.
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    open: bool,
}

/// Connect to `host:port`.
///
/// Every resolved address is tried in order. If none accepts, the last
/// failure is reported as a `ConnectError`.
pub fn open(host: &str, port: u16) -> Result<Connection, ConnectError> {
    let connect_error = |source| ConnectError {
        host: host.to_string(),
        port,
        source,
    };

    let addrs = (host, port).to_socket_addrs().map_err(connect_error)?;

    let mut last_error = None;
    for addr in addrs {
        match connect_addr(addr) {
            Ok(stream) => {
                debug!(peer = %addr, "Connected");
                return Ok(Connection::new(stream, addr));
            }
            Err(e) => {
                debug!(addr = %addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(connect_error(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    })))
}

/// Create a blocking client socket and connect it to `addr`.
fn connect_addr(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.connect(&addr.into())?;

    Ok(socket.into())
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, stream),
            peer,
            open: true,
        }
    }

    /// Address of the remote endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.reader.get_ref().set_nodelay(nodelay)
    }

    /// Write one encoded request in full.
    pub fn send(&mut self, request: &[u8]) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            ));
        }

        let stream = self.reader.get_mut();
        stream.write_all(request)?;
        stream.flush()?;
        trace!(bytes = request.len(), "Sent request");
        Ok(())
    }

    /// Read the next response frame.
    ///
    /// A closed connection reads as `Reply::Closed`.
    pub fn read_frame(&mut self, interrupt: &Interrupt) -> io::Result<Reply> {
        if !self.is_open() {
            return Ok(Reply::Closed);
        }
        protocol::read_frame(&mut self.reader, interrupt)
    }

    /// Shut the connection down. Safe to call any number of times.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        if let Err(e) = self.reader.get_ref().shutdown(Shutdown::Both) {
            // The peer may already have gone away.
            trace!(error = %e, "Shutdown failed");
        }
        debug!(peer = %self.peer, "Connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read};
    use std::net::TcpListener;
    use std::thread;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_open_and_exchange() {
        let (listener, port) = listener();
        let peer = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).unwrap();
            (&stream).write_all(&line).unwrap();
            line
        });

        let mut conn = open("127.0.0.1", port).unwrap();
        assert!(conn.is_open());
        assert_eq!(conn.peer_addr().port(), port);
        conn.set_nodelay(true).unwrap();

        let interrupt = Interrupt::detached();
        conn.send(b"ping\n").unwrap();
        assert_eq!(
            conn.read_frame(&interrupt).unwrap(),
            Reply::Frame("ping".to_string())
        );
        assert_eq!(peer.join().unwrap(), b"ping\n");
    }

    #[test]
    fn test_connect_refused() {
        let (listener, port) = listener();
        drop(listener);

        let err = open("127.0.0.1", port).unwrap_err();
        assert_eq!(err.host, "127.0.0.1");
        assert_eq!(err.port, port);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (listener, port) = listener();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let mut conn = open("127.0.0.1", port).unwrap();
        conn.close();
        conn.close();
        assert!(!conn.is_open());

        let err = conn.send(b"late\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(
            conn.read_frame(&Interrupt::detached()).unwrap(),
            Reply::Closed
        );

        drop(conn);
        assert!(peer.join().unwrap().is_empty());
    }

    #[test]
    fn test_drop_closes() {
        let (listener, port) = listener();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            stream.read(&mut buf).unwrap()
        });

        let conn = open("127.0.0.1", port).unwrap();
        drop(conn);
        assert_eq!(peer.join().unwrap(), 0);
    }

    #[test]
    fn test_peer_closes_mid_frame() {
        let (listener, port) = listener();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"abc").unwrap();
        });

        let mut conn = open("127.0.0.1", port).unwrap();
        peer.join().unwrap();
        assert_eq!(
            conn.read_frame(&Interrupt::detached()).unwrap(),
            Reply::Closed
        );
    }
}
