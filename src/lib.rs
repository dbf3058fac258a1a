//! # Tweezers DAQ
//!
//! Serial control of the two instruments on the magnetic tweezers bench: the Eppendorf
//! InjectMan micromanipulator that positions the tweezer tip, and the Arduino voltage
//! controller that drives the coils. Both speak a line-oriented ASCII protocol over a serial
//! port; this crate provides the framed transport, the command codec, typed device APIs, and
//! the coordinate transform of the manipulator's tilted axis.
//!
//! ## Crate Structure
//!
//! - **`transport`**: the [`Channel`](transport::Channel) abstraction over a byte stream
//!   (serial port, echo stub, or test mock) and the [`LineTransport`](transport::LineTransport)
//!   that reassembles frames and implements blocking send-and-await.
//! - **`codec`**: encodes `Cnnn` commands and decodes `A`-acknowledged replies.
//! - **`instrument`**: the [`InjectMan`] and [`VoltageControl`] device layers.
//! - **`kinematics`**: motor-frame to workspace-frame transform.
//! - **`simulation`**: in-memory echo devices for running without hardware.
//! - **`validation`**: inclusive range checks run before any byte is written.
//! - **`config`**: TOML plus environment configuration loaded with `figment`.
//! - **`logging`**: `tracing-subscriber` setup for binaries.
//! - **`error`**: the crate-wide [`DaqError`].
//!
//! ## Example
//!
//! ```
//! use tweezers_daq::{kinematics::Position, InjectMan};
//!
//! let mut im = InjectMan::simulated();
//! let report = im.query_position()?;
//! assert_eq!(report.position, [595, 0, 778]);
//!
//! im.move_to(Position::new(0.0, 0.0, 4700.0), Some(7000.0), true)?;
//! im.close()?;
//! # Ok::<(), tweezers_daq::DaqError>(())
//! ```
//!
//! Everything is synchronous. A device owns its port exclusively; to drive several devices
//! concurrently, give each its own thread.

pub mod codec;
pub mod config;
pub mod error;
pub mod instrument;
pub mod kinematics;
pub mod logging;
pub mod simulation;
pub mod transport;
pub mod validation;

pub use error::{AppResult, DaqError, ErrorCategory};
pub use instrument::{InjectMan, VoltageControl};
