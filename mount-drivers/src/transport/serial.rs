//! Serial port transport.

use std::io::Write;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use super::{read_framed, Terminator, Transport};
use crate::error::{MountError, MountResult};

/// Per-byte read timeout handed to the OS driver.
const BYTE_TIMEOUT: Duration = Duration::from_millis(50);

/// Mount on a serial line, 8N1 without flow control.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud`.
    ///
    /// Synscan hand controllers run at 9600, iOptron mounts at 115200.
    pub fn open(path: &str, baud: u32) -> MountResult<Self> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(BYTE_TIMEOUT)
            .open()
            .map_err(|e| MountError::Connection(format!("Failed to open {path}: {e}")))?;

        debug!("Opened serial port {path} at {baud} baud");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(bytes.len())
    }

    fn read_until(&mut self, terminator: Terminator, timeout: Duration) -> MountResult<Vec<u8>> {
        read_framed(&mut self.port, terminator, timeout)
    }

    fn flush_input(&mut self) -> MountResult<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| MountError::Io(e.into()))
    }
}
