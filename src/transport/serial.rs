//! Serial-port channel backed by the `serialport` crate.
//!
//! Only compiled with the `instrument_serial` feature.

use super::{not_connected, Channel};
use crate::error::AppResult;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default per-read timeout of the underlying port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A physical serial port (8N1, no flow control).
pub struct SerialChannel {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Open `port_name` at `baud_rate`. Reads return empty after `read_timeout`.
    ///
    /// # Errors
    ///
    /// [`crate::DaqError::Serial`] if the port cannot be opened.
    pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        debug!(port = port_name, baud_rate, "serial port opened");
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port: Some(port),
        })
    }

    /// Baud rate the port was opened with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| not_connected(&self.port_name))
    }
}

impl Channel for SerialChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        let mut buf = vec![0u8; max];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let port = self.port()?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}
