//! In-memory channels that stand in for the physical devices.
//!
//! An [`EchoChannel`] frames everything written to it on the command terminator, hands each
//! command to a [`Responder`], and queues the response (plus the reply delimiter) for reading.
//! Running a device against it exercises exactly the same transport and codec paths as real
//! hardware, so simulated mode never bypasses the protocol.

use crate::transport::{not_connected, Channel, LineBuffer};
use std::collections::{HashMap, VecDeque};
use std::io;
use tracing::trace;

/// Reply the simulated InjectMan gives to a position query.
pub const CANNED_POSITION_REPLY: &str = "A010 595 0 778 0";

/// Produces the reply to one command frame.
pub trait Responder: Send {
    /// `command` has its terminator stripped; the returned text must not contain one.
    /// `None` means the device stays silent.
    fn respond(&mut self, command: &str) -> Option<String>;
}

/// Channel that answers every command immediately.
pub struct EchoChannel<R: Responder> {
    responder: R,
    inbound: LineBuffer,
    outbound: VecDeque<u8>,
    reply_delimiter: u8,
    open: bool,
}

impl<R: Responder> EchoChannel<R> {
    /// Echo channel splitting commands on `command_terminator` and ending replies with
    /// `reply_delimiter`.
    pub fn new(responder: R, command_terminator: u8, reply_delimiter: u8) -> Self {
        Self {
            responder,
            inbound: LineBuffer::new(command_terminator),
            outbound: VecDeque::new(),
            reply_delimiter,
            open: true,
        }
    }

    /// The responder, for inspecting simulated state.
    pub fn responder(&self) -> &R {
        &self.responder
    }
}

impl<R: Responder> Channel for EchoChannel<R> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(not_connected("echo channel"));
        }
        self.inbound.extend(data);
        while let Some(frame) = self.inbound.take_frame() {
            let text = String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned();
            let Some(reply) = self.responder.respond(&text) else {
                trace!(command = %text, "simulated device stays silent");
                continue;
            };
            trace!(command = %text, reply = %reply, "simulated reply");
            self.outbound.extend(reply.as_bytes());
            self.outbound.push_back(self.reply_delimiter);
        }
        Ok(())
    }

    fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
        if !self.open {
            return Err(not_connected("echo channel"));
        }
        let n = max.min(self.outbound.len());
        Ok(self.outbound.drain(..n).collect())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if !self.open {
            return Err(not_connected("echo channel"));
        }
        Ok(self.outbound.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        self.outbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

/// Simulated InjectMan controller.
///
/// A command starting with `c`/`C` is acknowledged as `A` followed by the rest of the
/// command; a position query (`C010`) gets [`CANNED_POSITION_REPLY`]. Anything else is
/// answered with `ERR:` and the command.
#[derive(Debug, Default, Clone, Copy)]
pub struct InjectManEcho;

impl Responder for InjectManEcho {
    fn respond(&mut self, command: &str) -> Option<String> {
        let reply = match command.strip_prefix(|c: char| c.eq_ignore_ascii_case(&'c')) {
            Some("010") => CANNED_POSITION_REPLY.to_string(),
            Some(rest) => format!("A{rest}"),
            None => format!("ERR:{command}"),
        };
        Some(reply)
    }
}

/// Simulated Arduino voltage controller.
///
/// `!SI <ch> <v>` stores the level and echoes the command; `?SS <ch>` reports the stored
/// level (0 if never set). `!VO` output writes get no reply.
#[derive(Debug, Default, Clone)]
pub struct VoltageControlEcho {
    levels: HashMap<i64, i64>,
}

impl VoltageControlEcho {
    /// Last level set on `channel`.
    pub fn level(&self, channel: i64) -> Option<i64> {
        self.levels.get(&channel).copied()
    }
}

impl Responder for VoltageControlEcho {
    fn respond(&mut self, command: &str) -> Option<String> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let ints = |i: usize| tokens.get(i).and_then(|t| t.parse::<i64>().ok());
        let reply = match tokens.first().copied() {
            Some("!SI") => match (ints(1), ints(2)) {
                (Some(ch), Some(v)) => {
                    self.levels.insert(ch, v);
                    command.to_string()
                }
                _ => format!("ERR:{command}"),
            },
            Some("?SS") => match ints(1) {
                Some(ch) => format!("?SS {}", self.levels.get(&ch).copied().unwrap_or(0)),
                None => format!("ERR:{command}"),
            },
            Some("!VO") => return None,
            _ => format!("ERR:{command}"),
        };
        Some(reply)
    }
}
