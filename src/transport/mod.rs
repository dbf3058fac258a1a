//! Byte channels and the line-buffered transport built on top of them.
//!
//! A [`Channel`] is the only hardware-facing dependency: something that can write bytes,
//! read whatever bytes have arrived (possibly none before its timeout), hint how many bytes
//! are waiting, and be closed. Three implementations ship with the crate:
//!
//! - [`serial::SerialChannel`] wraps a real port from the `serialport` crate.
//! - [`crate::simulation::EchoChannel`] answers every command from an in-memory responder.
//! - [`mock::MockChannel`] replays scripted chunks and records writes, for tests.
//!
//! [`LineTransport`] owns one channel, reassembles terminator-delimited frames from
//! whatever chunking the channel delivers, and implements blocking send-and-await.

use std::io;

pub mod line;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;

pub use line::{LineBuffer, LineTransport, ReplyWait, MAX_READ_CHUNK};
pub use mock::MockChannel;
#[cfg(feature = "instrument_serial")]
pub use serial::SerialChannel;

/// A byte-stream channel such as a serial port.
///
/// Implementations are used from a single thread at a time but must be `Send` so a device
/// can be moved onto its own worker thread.
pub trait Channel: Send {
    /// Write every byte of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read at most `max` bytes. An empty result means nothing arrived before the
    /// channel's read timeout.
    fn read(&mut self, max: usize) -> io::Result<Vec<u8>>;

    /// Number of bytes ready to be read without blocking. Zero when unknown.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Release the underlying handle. Further I/O fails with `NotConnected`.
    fn close(&mut self) -> io::Result<()>;

    /// Whether the channel is still open.
    fn is_open(&self) -> bool;

    /// Human-readable identifier, e.g. the port path.
    fn describe(&self) -> String;
}

/// Type-erased channel selected at construction time.
pub type DynChannel = Box<dyn Channel>;

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
        (**self).read(max)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

pub(crate) fn not_connected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("{what} is closed"))
}
