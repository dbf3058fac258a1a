//! Eppendorf InjectMan micromanipulator driver
//!
//! ## Configuration
//!
//! ```toml
//! [inject_man]
//! simulated = false
//! default_speed = 1000       # µm/s, used when a move names no speed
//!
//! [inject_man.limits]
//! position_max = 25000       # |position| bound per axis, µm
//! speed_max = 7500           # |speed| bound per axis, µm/s
//!
//! [inject_man.calibration]   # tilted third axis
//! d1 = 11917
//! d3 = 15557
//! z = 10000
//!
//! [inject_man.connection]
//! port = "/dev/ttyUSB0"
//! baud_rate = 19200
//! reply_wait = "forever"
//! ```
//!
//! ## Protocol Reference
//!
//! Commands are `C` + three-digit code + space-separated integer parameters, terminated by
//! `\n`. Every command is acknowledged with `A` + the same code, optionally followed by
//! integer fields.
//!
//! | Code | Command | Parameters |
//! |------|---------|------------|
//! | 1  | query program version | |
//! | 3  | reset motor control (coordinates become 0,0,0) | |
//! | 4  | switch to remote control | |
//! | 5  | switch to manual (joystick) control | |
//! | 7  | go to position, reply when all motors stopped | px py pz vx vy vz |
//! | 8  | stop | |
//! | 10 | query position and limit switches | |
//! | 12 | go to position, reply when command accepted | px py pz vx vy vz |
//! | 14 | short (100 ms) acoustic signals | count |
//! | 15 | long (1 s) acoustic signals | count |
//!
//! Positions and speeds are micrometers and micrometers per second in the motor frame. Moves
//! only execute while remote control is active. The reply to a move carries a leading status
//! field that is 0 on success.

use super::{open_transport, DeviceProfile};
use crate::codec::{self, Command};
use crate::config::{InjectManConfig, LineEnding};
use crate::error::{AppResult, DaqError};
use crate::kinematics::{Geometry, MotorPosition, Position};
use crate::simulation::{EchoChannel, InjectManEcho};
use crate::transport::{Channel, DynChannel, LineTransport, ReplyWait};
use crate::validation::validate_range;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info_span};

/// Command codes understood by the controller.
pub mod codes {
    /// Query program version
    pub const QUERY_VERSION: u32 = 1;
    /// Reset motor control
    pub const RESET_MOTOR_CONTROL: u32 = 3;
    /// Switch to remote control
    pub const REMOTE_CONTROL: u32 = 4;
    /// Switch to manual control
    pub const MANUAL_CONTROL: u32 = 5;
    /// Go to position (blocking)
    pub const GOTO_POSITION: u32 = 7;
    /// Stop all motors
    pub const STOP: u32 = 8;
    /// Query position
    pub const QUERY_POSITION: u32 = 10;
    /// Go to position (non-blocking)
    pub const GOTO_POSITION_NB: u32 = 12;
    /// Short acoustic signals
    pub const SHORT_ACOUSTIC_SIGNALS: u32 = 14;
    /// Long acoustic signals
    pub const LONG_ACOUSTIC_SIGNALS: u32 = 15;
}

/// Factory baud rate of the controller.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default speed for moves that do not name one, in µm/s.
pub const DEFAULT_SPEED: f64 = 1000.0;

/// Largest acoustic signal count.
pub const MAX_SIGNAL_COUNT: i64 = 999;

const PROFILE: DeviceProfile = DeviceProfile {
    name: "inject_man",
    baud_rate: DEFAULT_BAUD_RATE,
    command_terminator: LineEnding::Lf,
    reply_delimiter: LineEnding::Lf,
    settle: Duration::from_secs(3),
};

/// Per-axis motion limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectManLimits {
    /// Largest absolute position, µm.
    pub position_max: f64,
    /// Largest absolute speed, µm/s.
    pub speed_max: f64,
}

impl Default for InjectManLimits {
    fn default() -> Self {
        Self {
            position_max: 25e3,
            speed_max: 7500.0,
        }
    }
}

bitflags! {
    /// Limit switches reported by a position query, one bit each.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LimitSwitches: u8 {
        const LEFT = 1;
        const RIGHT = 2;
        const BACK = 4;
        const FRONT = 8;
        const UP = 16;
        const DOWN = 32;
    }
}

/// Parsed reply to a position query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    /// Motor-frame position `[d1, d2, d3]` in µm.
    pub position: [i64; 3],
    /// Fields after the position, normally one limit-switch bit set.
    pub limit_switches: Vec<i64>,
}

impl PositionReport {
    /// Parse `A010 <d1> <d2> <d3> [<switches> ...]`.
    ///
    /// # Errors
    ///
    /// [`DaqError::MalformedReply`] if the marker is wrong, a field is not an integer, or
    /// fewer than three position fields are present.
    pub fn parse(reply: &str) -> AppResult<Self> {
        let decoded = codec::decode(reply)?;
        match decoded.fields.as_slice() {
            [d1, d2, d3, rest @ ..] => Ok(Self {
                position: [*d1, *d2, *d3],
                limit_switches: rest.to_vec(),
            }),
            _ => Err(DaqError::malformed(reply, "expected three position fields")),
        }
    }

    /// Position as a motor-frame value.
    pub fn motor_position(&self) -> MotorPosition {
        let [d1, d2, d3] = self.position;
        MotorPosition::new(d1 as f64, d2 as f64, d3 as f64)
    }

    /// Decoded limit switches; bits outside the six known switches are ignored.
    pub fn switches(&self) -> LimitSwitches {
        self.limit_switches
            .first()
            .map(|&bits| LimitSwitches::from_bits_truncate((bits & 0xff) as u8))
            .unwrap_or_else(LimitSwitches::empty)
    }
}

/// InjectMan micromanipulator.
///
/// Every operation validates its parameters before anything is written, encodes the command,
/// and blocks until the controller acknowledges it. Nothing about the manipulator state is
/// cached; positions are queried on demand.
pub struct InjectMan<C: Channel = DynChannel> {
    transport: LineTransport<C>,
    limits: InjectManLimits,
    geometry: Geometry,
    default_speed: f64,
}

impl InjectMan {
    /// Open the controller described by `config`.
    ///
    /// # Errors
    ///
    /// - [`DaqError::Configuration`] if the calibration is degenerate.
    /// - [`DaqError::Serial`] if the port cannot be opened.
    pub fn open(config: &InjectManConfig) -> AppResult<Self> {
        let geometry = Geometry::from_calibration(&config.calibration)?;
        let transport = open_transport(
            &PROFILE,
            &config.connection,
            config.simulated,
            InjectManEcho,
        )?;
        Ok(Self::new(
            transport,
            config.limits,
            geometry,
            config.default_speed,
        ))
    }

    /// Simulated controller with default limits and calibration.
    pub fn simulated() -> Self {
        let channel: DynChannel = Box::new(EchoChannel::new(InjectManEcho, b'\n', b'\n'));
        let transport = LineTransport::new(channel, ReplyWait::Forever)
            .with_span(info_span!("device", name = PROFILE.name, port = "simulated"));
        Self::new(
            transport,
            InjectManLimits::default(),
            Geometry::default(),
            DEFAULT_SPEED,
        )
    }
}

impl<C: Channel> InjectMan<C> {
    /// Build a driver over an already configured transport.
    pub fn new(
        transport: LineTransport<C>,
        limits: InjectManLimits,
        geometry: Geometry,
        default_speed: f64,
    ) -> Self {
        Self {
            transport,
            limits,
            geometry,
            default_speed,
        }
    }

    /// Motion limits.
    pub fn limits(&self) -> InjectManLimits {
        self.limits
    }

    /// Axis geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Speed used when a move names none.
    pub fn default_speed(&self) -> f64 {
        self.default_speed
    }

    /// Send a command and return the raw reply.
    ///
    /// Accepts a [`Command`], a bare code (`1u32`) or literal text (`"C010"`). Literal text is
    /// sent unchanged.
    pub fn call(&mut self, command: impl Into<Command>) -> AppResult<String> {
        let text = command.into().render()?;
        let reply = self.transport.send(&text, true)?;
        Ok(reply.unwrap_or_default())
    }

    /// Query the controller's program version.
    pub fn query_version(&mut self) -> AppResult<String> {
        self.call(codes::QUERY_VERSION)
    }

    /// Stop all motors and set the current coordinates to 0,0,0.
    pub fn reset_motor_control(&mut self) -> AppResult<String> {
        self.call(codes::RESET_MOTOR_CONTROL)
    }

    /// Enable remote control. Required before any move.
    pub fn switch_to_remote_control(&mut self) -> AppResult<String> {
        self.call(codes::REMOTE_CONTROL)
    }

    /// Hand control back to the joystick and keypad.
    pub fn switch_to_manual_control(&mut self) -> AppResult<String> {
        self.call(codes::MANUAL_CONTROL)
    }

    /// Stop the current movement; replies once all motors are at a standstill.
    pub fn stop(&mut self) -> AppResult<String> {
        self.call(codes::STOP)
    }

    /// Move to a motor-frame position and reply once all motors have stopped.
    ///
    /// A speed of 0 leaves that axis where it is.
    pub fn goto_position(&mut self, position: [f64; 3], speed: [f64; 3]) -> AppResult<String> {
        self.goto(codes::GOTO_POSITION, position, speed)
    }

    /// Like [`goto_position`](Self::goto_position) but replies as soon as the command has
    /// been accepted.
    pub fn goto_position_nb(&mut self, position: [f64; 3], speed: [f64; 3]) -> AppResult<String> {
        self.goto(codes::GOTO_POSITION_NB, position, speed)
    }

    fn goto(&mut self, code: u32, position: [f64; 3], speed: [f64; 3]) -> AppResult<String> {
        let p = self.limits.position_max;
        let v = self.limits.speed_max;
        validate_range(&position, -p, p)?;
        validate_range(&speed, -v, v)?;

        let params = position.iter().chain(speed.iter()).map(|x| x.round() as i64);
        self.call(Command::with_params(code, params))
    }

    /// Query the motor-frame position and limit switches.
    pub fn query_position(&mut self) -> AppResult<PositionReport> {
        let reply = self.call(codes::QUERY_POSITION)?;
        PositionReport::parse(&reply)
    }

    /// Query the position and convert it to the workspace frame.
    pub fn current_position(&mut self) -> AppResult<Position> {
        let report = self.query_position()?;
        Ok(self.geometry.motor_to_position(report.motor_position()))
    }

    /// Issue `n` short acoustic signals, `n` in `[0, 999]`.
    pub fn trigger_short_acoustic_signals(&mut self, n: i64) -> AppResult<String> {
        validate_range(&[n], 0, MAX_SIGNAL_COUNT)?;
        self.call(Command::with_params(codes::SHORT_ACOUSTIC_SIGNALS, [n]))
    }

    /// Issue `n` long acoustic signals, `n` in `[0, 999]`.
    pub fn trigger_long_acoustic_signals(&mut self, n: i64) -> AppResult<String> {
        validate_range(&[n], 0, MAX_SIGNAL_COUNT)?;
        self.call(Command::with_params(codes::LONG_ACOUSTIC_SIGNALS, [n]))
    }

    /// Move to a workspace position.
    ///
    /// `speed` (default [`default_speed`](Self::default_speed)) is applied to all three motor
    /// axes. With `blocking` the call returns once the motors have stopped.
    pub fn move_to(
        &mut self,
        target: Position,
        speed: Option<f64>,
        blocking: bool,
    ) -> AppResult<String> {
        let motor = self.geometry.position_to_motor(target);
        let speed = speed.unwrap_or(self.default_speed);
        debug!(?target, ?motor, speed, blocking, "move_to");

        let code = if blocking {
            codes::GOTO_POSITION
        } else {
            codes::GOTO_POSITION_NB
        };
        self.goto(code, motor.to_array(), [speed; 3])
    }

    /// Move relative to the position reported right now.
    pub fn move_by(
        &mut self,
        delta: Position,
        speed: Option<f64>,
        blocking: bool,
    ) -> AppResult<String> {
        let current = self.current_position()?;
        self.move_to(current + delta, speed, blocking)
    }

    /// Close the serial connection.
    pub fn close(self) -> AppResult<()> {
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::simulation::CANNED_POSITION_REPLY;
    use crate::transport::MockChannel;
    use approx::assert_relative_eq;

    fn mock_device() -> (MockChannel, InjectMan<MockChannel>) {
        let channel = MockChannel::new();
        let transport = LineTransport::new(channel.clone(), ReplyWait::BoundedMs(100));
        let device = InjectMan::new(
            transport,
            InjectManLimits::default(),
            Geometry::default(),
            DEFAULT_SPEED,
        );
        (channel, device)
    }

    #[test]
    fn wrappers_send_their_codes() {
        let (channel, mut im) = mock_device();
        for reply in ["A001 42", "A003", "A004", "A005", "A008"] {
            channel.push_chunk(format!("{reply}\n").as_bytes());
        }
        assert_eq!(im.query_version().unwrap(), "A001 42");
        im.reset_motor_control().unwrap();
        im.switch_to_remote_control().unwrap();
        im.switch_to_manual_control().unwrap();
        im.stop().unwrap();

        assert_eq!(
            channel.written_text(),
            vec!["C001\n", "C003\n", "C004\n", "C005\n", "C008\n"]
        );
    }

    #[test]
    fn literal_commands_pass_through() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A010 1 2 3 0\n");
        im.call("C010").unwrap();
        assert_eq!(channel.written_text(), vec!["C010\n"]);
    }

    #[test]
    fn goto_encodes_positions_then_speeds() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A012\n");
        im.goto_position_nb([10.0, -20.4, 30.6], [100.0, 0.0, 7500.0])
            .unwrap();
        assert_eq!(channel.written_text(), vec!["C012 10 -20 31 100 0 7500\n"]);
    }

    #[test]
    fn invalid_move_writes_nothing() {
        let (channel, mut im) = mock_device();

        let err = im
            .goto_position([0.0, 25_001.0, 0.0], [100.0; 3])
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(im.goto_position([0.0; 3], [0.0, 0.0, -7501.0]).is_err());
        assert!(im.trigger_short_acoustic_signals(1000).is_err());
        assert!(im.trigger_long_acoustic_signals(-1).is_err());

        assert!(channel.written().is_empty());
    }

    #[test]
    fn out_of_range_code_writes_nothing() {
        let (channel, mut im) = mock_device();

        for code in [0u32, 1000] {
            let err = im.call(code).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Configuration);
        }

        assert!(channel.written().is_empty());
    }

    #[test]
    fn acoustic_signals() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A014\nA015\n");
        im.trigger_short_acoustic_signals(3).unwrap();
        im.trigger_long_acoustic_signals(0).unwrap();
        assert_eq!(channel.written_text(), vec!["C014 3\n", "C015 0\n"]);
    }

    #[test]
    fn parses_position_report() {
        let report = PositionReport::parse(CANNED_POSITION_REPLY).unwrap();
        assert_eq!(report.position, [595, 0, 778]);
        assert_eq!(report.limit_switches, vec![0]);
        assert!(report.switches().is_empty());

        let report = PositionReport::parse("A010 0 0 0 17").unwrap();
        assert_eq!(report.switches(), LimitSwitches::LEFT | LimitSwitches::UP);

        let report = PositionReport::parse("a010 1 2 3").unwrap();
        assert!(report.limit_switches.is_empty());
    }

    #[test]
    fn malformed_position_reply_keeps_raw_text() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"E010 1 2 3\n");
        match im.query_position().unwrap_err() {
            DaqError::MalformedReply { reply, .. } => assert_eq!(reply, "E010 1 2 3"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(PositionReport::parse("A010 1 2").is_err());
    }

    #[test]
    fn current_position_uses_workspace_frame() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(format!("{CANNED_POSITION_REPLY}\n").as_bytes());
        let p = im.current_position().unwrap();
        let g = Geometry::default();
        assert_relative_eq!(p.x, 595.0 - 778.0 * g.sin_theta());
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, 778.0 * g.cos_theta());
    }

    #[test]
    fn move_to_converts_and_replicates_speed() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A007 0\n");

        let reply = im
            .move_to(Position::new(0.0, 0.0, 4700.0), Some(7000.0), true)
            .unwrap();
        assert_eq!(codec::decode(&reply).unwrap().status(), Some(0));

        let sin = 11917.0 / 15557.0;
        let cos = 10000.0 / 15557.0;
        let d3 = 4700.0_f64 / cos;
        let d1 = 0.0 + d3 * sin;
        let expected = format!(
            "C007 {} 0 {} 7000 7000 7000\n",
            d1.round() as i64,
            d3.round() as i64
        );
        assert_eq!(channel.written_text(), vec![expected]);
    }

    #[test]
    fn move_to_defaults_speed_and_non_blocking() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A012\n");
        im.move_to(Position::new(100.0, 200.0, 0.0), None, false)
            .unwrap();
        assert_eq!(
            channel.written_text(),
            vec!["C012 100 200 0 1000 1000 1000\n"]
        );
    }

    #[test]
    fn move_outside_workspace_is_rejected_before_io() {
        let (channel, mut im) = mock_device();
        assert!(im
            .move_to(Position::new(0.0, 0.0, 20_000.0), None, true)
            .is_err());
        assert!(im
            .move_to(Position::new(0.0, 0.0, 0.0), Some(9000.0), true)
            .is_err());
        assert!(channel.written().is_empty());
    }

    #[test]
    fn move_by_queries_then_moves() {
        let (channel, mut im) = mock_device();
        channel.push_chunk(b"A010 1000 500 0 0\n");
        channel.push_chunk(b"A007 0\n");

        im.move_by(Position::new(10.0, -20.0, 0.0), Some(500.0), true)
            .unwrap();
        assert_eq!(
            channel.written_text(),
            vec!["C010\n", "C007 1010 480 0 500 500 500\n"]
        );
    }

    #[test]
    fn simulated_device_answers_position_query() {
        let mut im = InjectMan::simulated();
        for _ in 0..3 {
            assert_eq!(im.call("C010").unwrap(), CANNED_POSITION_REPLY);
        }
        assert_eq!(im.query_position().unwrap().position, [595, 0, 778]);
        assert_eq!(im.call(7u32).unwrap(), "A007");
        im.close().unwrap();
    }

    #[test]
    fn open_rejects_degenerate_calibration() {
        let mut config = InjectManConfig::simulated();
        config.calibration.d3 = 0.0;
        assert!(InjectMan::open(&config).is_err());
    }
}
