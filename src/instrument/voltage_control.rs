//! Arduino voltage controller driver
//!
//! The controller drives the magnetic tweezers' coil channels. Commands are mnemonic, sent
//! with a `\r` terminator; the sketch answers with `println`, so replies end in `\n`.
//!
//! | Command | Meaning | Reply |
//! |---------|---------|-------|
//! | `!SI <ch> <v>` | set the level of channel `ch` | echo, third token is the applied level |
//! | `?SS <ch>` | sense the level of channel `ch` | `?SS <v>` |
//! | `!VO <v0> <v1> ...` | write all outputs at once | none |
//!
//! The port is opened at 19200 baud by default. Opening resets the board, which is why the
//! connection waits before the first command.

use super::{open_transport, DeviceProfile};
use crate::codec::{encode_mnemonic, positional_field};
use crate::config::{LineEnding, VoltageControlConfig};
use crate::error::AppResult;
use crate::simulation::{EchoChannel, VoltageControlEcho};
use crate::transport::{Channel, DynChannel, LineTransport, ReplyWait};
use crate::validation::validate_range;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info_span;

/// Default baud rate of the sketch.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

const PROFILE: DeviceProfile = DeviceProfile {
    name: "voltage_control",
    baud_rate: DEFAULT_BAUD_RATE,
    command_terminator: LineEnding::Cr,
    reply_delimiter: LineEnding::Lf,
    settle: Duration::from_secs(3),
};

/// Channel count and value range accepted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageLimits {
    /// Number of output channels; valid indices are `0..channels`.
    pub channels: u32,
    /// Smallest accepted level.
    pub voltage_min: i64,
    /// Largest accepted level.
    pub voltage_max: i64,
}

impl Default for VoltageLimits {
    fn default() -> Self {
        Self {
            channels: 8,
            voltage_min: -9999,
            voltage_max: 99999,
        }
    }
}

/// Arduino voltage controller.
pub struct VoltageControl<C: Channel = DynChannel> {
    transport: LineTransport<C>,
    limits: VoltageLimits,
}

impl VoltageControl {
    /// Open the controller described by `config`.
    pub fn open(config: &VoltageControlConfig) -> AppResult<Self> {
        let transport = open_transport(
            &PROFILE,
            &config.connection,
            config.simulated,
            VoltageControlEcho::default(),
        )?;
        Ok(Self::new(transport, config.limits))
    }

    /// Simulated controller with default limits.
    pub fn simulated() -> Self {
        let channel: DynChannel = Box::new(EchoChannel::new(
            VoltageControlEcho::default(),
            PROFILE.command_terminator.as_byte(),
            PROFILE.reply_delimiter.as_byte(),
        ));
        let transport = LineTransport::new(channel, ReplyWait::Forever)
            .with_command_terminator(PROFILE.command_terminator.as_byte())
            .with_reply_delimiter(PROFILE.reply_delimiter.as_byte())
            .with_span(info_span!("device", name = PROFILE.name, port = "simulated"));
        Self::new(transport, VoltageLimits::default())
    }
}

impl<C: Channel> VoltageControl<C> {
    /// Build a driver over an already configured transport.
    pub fn new(transport: LineTransport<C>, limits: VoltageLimits) -> Self {
        Self { transport, limits }
    }

    /// Channel and value limits.
    pub fn limits(&self) -> VoltageLimits {
        self.limits
    }

    /// Set the level of `channel`, returning the level the controller applied.
    pub fn set_voltage(&mut self, channel: i64, level: i64) -> AppResult<i64> {
        self.check_channel(channel)?;
        validate_range(&[level], self.limits.voltage_min, self.limits.voltage_max)?;

        let reply = self.request(&encode_mnemonic('!', "SI", &[channel, level]))?;
        positional_field(&reply, 2)
    }

    /// Read back the level of `channel`.
    pub fn sense_voltage(&mut self, channel: i64) -> AppResult<i64> {
        self.check_channel(channel)?;

        let reply = self.request(&encode_mnemonic('?', "SS", &[channel]))?;
        positional_field(&reply, 1)
    }

    /// Write every output at once without waiting for a reply.
    pub fn set_outputs(&mut self, levels: &[i64]) -> AppResult<()> {
        validate_range(levels, self.limits.voltage_min, self.limits.voltage_max)?;
        self.transport
            .send(&encode_mnemonic('!', "VO", levels), false)?;
        Ok(())
    }

    /// Send raw text, optionally waiting for the reply.
    pub fn send_raw(&mut self, text: &str, wait_for_reply: bool) -> AppResult<Option<String>> {
        self.transport.send(text, wait_for_reply)
    }

    /// Close the serial connection.
    pub fn close(self) -> AppResult<()> {
        self.transport.close()
    }

    fn check_channel(&self, channel: i64) -> AppResult<()> {
        validate_range(&[channel], 0, i64::from(self.limits.channels) - 1)?;
        Ok(())
    }

    fn request(&mut self, text: &str) -> AppResult<String> {
        Ok(self.transport.send(text, true)?.unwrap_or_default())
    }
}
