//! TCP transport, for WiFi hand controllers and serial-to-network bridges.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::{read_framed, Terminator, Transport, DEFAULT_TIMEOUT};
use crate::error::{MountError, MountResult};

/// Mount reachable over a TCP socket.
///
/// # Example
///
/// ```no_run
/// use mount_drivers::transport::{TcpTransport, Transport, Terminator};
/// use std::time::Duration;
///
/// let mut transport = TcpTransport::connect("192.168.4.1:11880")?;
/// transport.write(b"Ka")?;
/// let echo = transport.read_until(Terminator::Byte(b'#'), Duration::from_secs(2))?;
/// assert_eq!(echo, b"a#");
/// # Ok::<(), mount_drivers::MountError>(())
/// ```
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> MountResult<Self> {
        let stream = TcpStream::connect(&addr)
            .map_err(|e| MountError::Connection(format!("Failed to connect: {e}")))?;

        stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_nodelay(true)?;

        debug!("Connected to mount via TCP");
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(bytes.len())
    }

    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        self.stream.set_read_timeout(Some(timeout))?;
        read_framed(&mut self.stream, terminator, timeout)
    }
}
