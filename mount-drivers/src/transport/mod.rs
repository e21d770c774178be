//! Byte transports and request/reply framing.
//!
//! A [`Transport`] only moves bytes: it writes a command and reads until a
//! terminator byte or a fixed count. Serial and TCP backends implement it
//! identically, as do the scripted [`MockTransport`] and the protocol
//! simulators, so nothing above this layer knows what carries the bytes.
//!
//! [`Link`] sits on top and runs one [`Request`] at a time: it logs the
//! write, reads the reply shape the request declares, and checks
//! single-byte acknowledgements.

mod mock;
mod serial;
mod tcp;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::codec::{Reply, Request};
use crate::error::{printable, DecodeError, MountError, MountResult};

/// Default per-read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Where a reply ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Read up to and including this byte.
    Byte(u8),
    /// Read exactly this many bytes.
    Count(usize),
}

/// Blocking byte transport to a mount.
pub trait Transport {
    /// Write all bytes, returning how many were written.
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize>;

    /// Read until `terminator`, giving up after `timeout`.
    ///
    /// Returns [`MountError::TransportTimeout`] if nothing arrived and a
    /// malformed-decode error if the reply was cut short.
    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>>;

    /// Drop any unread input before a new command.
    fn flush_input(&mut self) -> MountResult<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        (**self).write(bytes)
    }

    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        (**self).read_until(terminator, timeout)
    }

    fn flush_input(&mut self) -> MountResult<()> {
        (**self).flush_input()
    }
}

/// Read a framed reply byte by byte from a blocking reader.
///
/// The reader's own timeout bounds each `read` call; `timeout` bounds the
/// whole reply, so a read that times out is retried until the deadline.
pub(crate) fn read_framed<R: Read + ?Sized>(
    reader: &mut R,
    terminator: Terminator,
    timeout: Duration,
) -> MountResult<Vec<u8>> {
    let mut buf = [0u8; 1];
    let mut bytes = Vec::new();
    let deadline = Instant::now() + timeout;

    if terminator == Terminator::Count(0) {
        return Ok(bytes);
    }

    loop {
        if Instant::now() >= deadline {
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => {
                bytes.push(buf[0]);
                let done = match terminator {
                    Terminator::Byte(end) => buf[0] == end,
                    Terminator::Count(n) => bytes.len() >= n,
                };
                if done {
                    return Ok(bytes);
                }
            }
            // A quiet line only ends the reply once the whole deadline passes
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => return Err(e.into()),
        }
    }

    if bytes.is_empty() {
        Err(MountError::TransportTimeout)
    } else {
        Err(DecodeError::malformed("truncated reply", &bytes).into())
    }
}

/// A transport plus the timeout used for every reply.
pub struct Link<T> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one request and read the reply it declares.
    ///
    /// The returned bytes include the terminator. [`Reply::Ack`] replies are
    /// checked against the expected byte.
    pub fn exchange(&mut self, request: &Request) -> MountResult<Vec<u8>> {
        self.transport.flush_input()?;
        debug!("Mount send: {:?}", printable(&request.bytes));
        self.transport.write(&request.bytes)?;

        let reply = match request.reply {
            Reply::None => return Ok(Vec::new()),
            Reply::Ack(_) => self.transport.read_until(Terminator::Count(1), self.timeout)?,
            Reply::Terminated(end) => self.transport.read_until(Terminator::Byte(end), self.timeout)?,
            Reply::Count(n) => self.transport.read_until(Terminator::Count(n), self.timeout)?,
        };
        trace!("Mount recv: {:?}", printable(&reply));

        if let Reply::Ack(expected) = request.reply {
            if reply.first() != Some(&expected) {
                return Err(DecodeError::Malformed(format!(
                    "expected {:?} acknowledging {:?}, got {:?}",
                    char::from(expected),
                    printable(&request.bytes),
                    printable(&reply)
                ))
                .into());
            }
        }
        Ok(reply)
    }

    /// Run requests in order, stopping at the first failure.
    pub fn execute(&mut self, requests: &[Request]) -> MountResult<Vec<Vec<u8>>> {
        requests.iter().map(|request| self.exchange(request)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_framed_stops_at_terminator() {
        let mut reader = Cursor::new(b"0#extra".to_vec());
        let reply = read_framed(&mut reader, Terminator::Byte(b'#'), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(reply, b"0#");
    }

    #[test]
    fn test_read_framed_counts_bytes() {
        let mut reader = Cursor::new(vec![2u8, b'#', 9]);
        let reply = read_framed(&mut reader, Terminator::Count(2), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(reply, vec![2, b'#']);
    }

    /// Times out a fixed number of reads before handing over its bytes.
    struct SlowReader {
        quiet_reads: usize,
        inner: Cursor<Vec<u8>>,
        calls: usize,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.calls += 1;
            if self.quiet_reads > 0 {
                self.quiet_reads -= 1;
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data yet"));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_read_framed_waits_past_byte_timeouts() {
        let mut reader = SlowReader {
            quiet_reads: 3,
            inner: Cursor::new(b"0#".to_vec()),
            calls: 0,
        };
        let reply = read_framed(&mut reader, Terminator::Byte(b'#'), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(reply, b"0#");
        assert_eq!(reader.calls, 5);
    }

    #[test]
    fn test_read_framed_gives_up_at_deadline() {
        let mut reader = SlowReader {
            quiet_reads: usize::MAX,
            inner: Cursor::new(Vec::new()),
            calls: 0,
        };
        let err = read_framed(
            &mut reader,
            Terminator::Byte(b'#'),
            Duration::from_millis(20),
        )
        .unwrap_err();
        assert!(matches!(err, MountError::TransportTimeout));
        assert!(reader.calls > 1);
    }

    #[test]
    fn test_read_framed_empty_is_timeout() {
        let mut reader = Cursor::new(Vec::new());
        let err = read_framed(&mut reader, Terminator::Byte(b'#'), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, MountError::TransportTimeout));
    }

    #[test]
    fn test_read_framed_partial_is_malformed() {
        let mut reader = Cursor::new(b"12AB".to_vec());
        let err = read_framed(&mut reader, Terminator::Count(18), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, MountError::Decode(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_exchange_checks_ack() {
        let mock = MockTransport::new();
        mock.queue_reply(b"0");
        let mut link = Link::new(mock.clone(), DEFAULT_TIMEOUT);

        let err = link
            .exchange(&Request::ascii(":MS#", Reply::Ack(b'1')))
            .unwrap_err();
        assert!(matches!(err, MountError::Decode(_)));
        assert_eq!(mock.writes(), vec![b":MS#".to_vec()]);
    }

    #[test]
    fn test_execute_stops_at_first_failure() {
        let mock = MockTransport::new();
        mock.queue_reply(b"#");
        mock.queue_timeout();
        mock.queue_reply(b"#");
        let mut link = Link::new(mock.clone(), DEFAULT_TIMEOUT);

        let requests = vec![
            Request::ascii("T\0", Reply::Ack(b'#')),
            Request::ascii("M", Reply::Ack(b'#')),
            Request::ascii("M", Reply::Ack(b'#')),
        ];
        let err = link.execute(&requests).unwrap_err();
        assert!(matches!(err, MountError::TransportTimeout));
        assert_eq!(mock.writes().len(), 2);
        assert_eq!(mock.pending_replies(), 1);
    }

    #[test]
    fn test_no_reply_request_reads_nothing() {
        let mock = MockTransport::new();
        let mut link = Link::new(mock.clone(), DEFAULT_TIMEOUT);
        let reply = link.exchange(&Request::ascii(":mn#", Reply::None)).unwrap();
        assert!(reply.is_empty());
    }
}
