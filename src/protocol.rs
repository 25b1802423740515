//! Newline-delimited framing.
//!
//! Every message in both directions is a run of bytes terminated by a single
//! `\n`. There is no length prefix and no escaping; a `\n` inside application
//! text is always a frame boundary.
//!
//! ```text
//! Request:  hello\n
//! Response: hello\n
//! ```
//!
//! The same scanner frames both the peer's replies and the operator's input
//! lines; they differ only in what happens at end of stream.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, BufRead};
use tracing::{debug, trace};

use crate::interrupt::Interrupt;

/// Frame delimiter.
pub const DELIMITER: u8 = b'\n';

/// Result of scanning a stream for one delimiter.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan {
    /// Bytes up to and including the delimiter.
    Delimited(BytesMut),
    /// End of stream. Holds whatever arrived after the last delimiter.
    Eof(BytesMut),
}

/// One response from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A complete frame, decoded and with trailing whitespace stripped.
    Frame(String),
    /// The peer ended the stream before a delimiter arrived.
    Closed,
}

/// Accumulate bytes from `reader` until a delimiter or end of stream.
///
/// Bytes past the delimiter stay in the reader's buffer for the next call.
/// `EINTR` is retried unless the operator interrupt is set, in which case
/// the scan is abandoned with an `Interrupted` error.
pub fn scan<R: BufRead + ?Sized>(reader: &mut R, interrupt: &Interrupt) -> io::Result<Scan> {
    let mut buf = BytesMut::new();

    loop {
        // A signal landing between this check and the read below does not
        // interrupt that read; the next signal or incoming data unblocks it.
        if interrupt.requested() {
            return Err(Interrupt::error());
        }

        let (found, used) = {
            let available = match reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted && !interrupt.requested() => {
                    continue
                }
                Err(e) => return Err(e),
            };

            if available.is_empty() {
                return Ok(Scan::Eof(buf));
            }

            match available.iter().position(|&b| b == DELIMITER) {
                Some(pos) => {
                    buf.extend_from_slice(&available[..=pos]);
                    (true, pos + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (false, available.len())
                }
            }
        };

        reader.consume(used);
        trace!(bytes = used, buffered = buf.len(), "Scanned chunk");

        if found {
            return Ok(Scan::Delimited(buf));
        }
    }
}

/// Read one response frame from the peer.
///
/// End of stream, with or without a trailing partial fragment, is reported
/// as `Reply::Closed` and the fragment is dropped. Read errors are treated
/// the same way. The only error returned is an operator interrupt.
pub fn read_frame<R: BufRead + ?Sized>(reader: &mut R, interrupt: &Interrupt) -> io::Result<Reply> {
    match scan(reader, interrupt) {
        Ok(Scan::Delimited(bytes)) => Ok(Reply::Frame(decode_frame(&bytes))),
        Ok(Scan::Eof(partial)) => {
            if !partial.is_empty() {
                debug!(discarded = partial.len(), "Peer closed mid-frame");
            }
            Ok(Reply::Closed)
        }
        Err(e) if interrupt.is_cause(&e) => Err(e),
        Err(e) => {
            debug!(error = %e, "Read failed, treating stream as closed");
            Ok(Reply::Closed)
        }
    }
}

/// Read one line of operator input.
///
/// Returns `None` once the input is exhausted. A final line without a
/// trailing newline is still returned; end of input is reported by the
/// following call.
pub fn read_operator_line<R: BufRead + ?Sized>(
    reader: &mut R,
    interrupt: &Interrupt,
) -> io::Result<Option<String>> {
    match scan(reader, interrupt)? {
        Scan::Delimited(bytes) => Ok(Some(decode_line(&bytes))),
        Scan::Eof(partial) if partial.is_empty() => Ok(None),
        Scan::Eof(partial) => Ok(Some(decode_line(&partial))),
    }
}

/// Encode operator text as a request frame.
pub fn encode_request(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(DELIMITER);
    buf.freeze()
}

/// Decode a peer frame, replacing invalid UTF-8 and stripping trailing
/// whitespace (delimiter and any `\r` included).
pub fn decode_frame(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Decode an operator line, removing only the line terminator.
fn decode_line(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
