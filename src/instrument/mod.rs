//! Device command layers for the serial-attached instruments.
//!
//! - [`inject_man::InjectMan`]: Eppendorf InjectMan micromanipulator (numeric `Cnnn` codes).
//! - [`voltage_control::VoltageControl`]: Arduino voltage controller (`!SI` / `?SS` / `!VO`).
//!
//! Both are opened from their configuration section. With `simulated = true` the serial port
//! is replaced by an [`EchoChannel`](crate::simulation::EchoChannel) and everything above the
//! channel runs unchanged.

pub mod inject_man;
pub mod voltage_control;

pub use inject_man::InjectMan;
pub use voltage_control::VoltageControl;

use crate::config::{ConnectionConfig, LineEnding};
use crate::error::AppResult;
use crate::simulation::{EchoChannel, Responder};
use crate::transport::{DynChannel, LineTransport};
use std::time::Duration;
use tracing::{info_span, warn};

/// Lines discarded after opening a hardware port.
const OPEN_DRAIN_LINES: usize = 100;

/// Wire defaults of one device type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeviceProfile {
    pub name: &'static str,
    pub baud_rate: u32,
    pub command_terminator: LineEnding,
    pub reply_delimiter: LineEnding,
    pub settle: Duration,
}

/// Open the transport for a device, either on its serial port or on an echo channel.
///
/// Hardware ports are given `settle` (or the configured `settle_ms`) to reset, then any
/// boot chatter is drained.
pub(crate) fn open_transport<R>(
    profile: &DeviceProfile,
    conn: &ConnectionConfig,
    simulated: bool,
    responder: R,
) -> AppResult<LineTransport>
where
    R: Responder + 'static,
{
    let command_terminator = conn
        .command_terminator
        .unwrap_or(profile.command_terminator)
        .as_byte();
    let reply_delimiter = conn
        .reply_delimiter
        .unwrap_or(profile.reply_delimiter)
        .as_byte();

    if simulated {
        warn!(device = profile.name, "running simulated; no serial port is opened");
        let channel: DynChannel = Box::new(EchoChannel::new(
            responder,
            command_terminator,
            reply_delimiter,
        ));
        let span = info_span!("device", name = profile.name, port = "simulated");
        return Ok(LineTransport::new(channel, conn.reply_wait)
            .with_command_terminator(command_terminator)
            .with_reply_delimiter(reply_delimiter)
            .with_span(span));
    }

    open_serial(profile, conn, command_terminator, reply_delimiter)
}

#[cfg(feature = "instrument_serial")]
fn open_serial(
    profile: &DeviceProfile,
    conn: &ConnectionConfig,
    command_terminator: u8,
    reply_delimiter: u8,
) -> AppResult<LineTransport> {
    use crate::transport::SerialChannel;

    let baud_rate = conn.baud_rate.unwrap_or(profile.baud_rate);
    let channel = SerialChannel::open(&conn.port, baud_rate, conn.read_timeout())?;
    tracing::info!(device = profile.name, port = %conn.port, baud_rate, "serial port opened");

    let settle = conn
        .settle_ms
        .map(Duration::from_millis)
        .unwrap_or(profile.settle);
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }

    let span = info_span!("device", name = profile.name, port = %conn.port);
    let channel: DynChannel = Box::new(channel);
    let mut transport = LineTransport::new(channel, conn.reply_wait)
        .with_command_terminator(command_terminator)
        .with_reply_delimiter(reply_delimiter)
        .with_span(span);
    transport.drain(OPEN_DRAIN_LINES)?;
    Ok(transport)
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial(
    _profile: &DeviceProfile,
    _conn: &ConnectionConfig,
    _command_terminator: u8,
    _reply_delimiter: u8,
) -> AppResult<LineTransport> {
    Err(crate::error::DaqError::SerialFeatureDisabled)
}
