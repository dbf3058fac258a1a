//! CLI entry point for tweezers-daq
//!
//! Runs one operation against the instruments described in the configuration file, e.g.
//!
//! ```bash
//! tweezers-daq --config tweezers.toml position
//! tweezers-daq move 0 0 4700 --speed 7000
//! tweezers-daq --simulated beep 3
//! tweezers-daq voltage set 2 1500
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tweezers_daq::config::{InjectManConfig, Settings, VoltageControlConfig};
use tweezers_daq::kinematics::Position;
use tweezers_daq::{logging, InjectMan, VoltageControl};

#[derive(Parser)]
#[command(name = "tweezers-daq")]
#[command(about = "Control the InjectMan and the coil voltage controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "tweezers.toml")]
    config: PathBuf,

    /// Use the in-memory echo devices instead of serial ports
    #[arg(long)]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    InjectMan(InjectManCommands),
    /// Voltage controller operations
    Voltage {
        #[command(subcommand)]
        command: VoltageCommands,
    },
}

#[derive(Subcommand)]
enum InjectManCommands {
    /// Query the InjectMan program version
    Version,
    /// Query the InjectMan position (motor and workspace frame)
    Position,
    /// Move to a workspace position in micrometers
    #[command(allow_negative_numbers = true)]
    Move {
        x: f64,
        y: f64,
        z: f64,
        /// Speed in µm/s on all axes
        #[arg(long)]
        speed: Option<f64>,
        /// Return as soon as the controller accepts the move
        #[arg(long)]
        no_wait: bool,
    },
    /// Move relative to the current position
    #[command(allow_negative_numbers = true)]
    MoveBy {
        dx: f64,
        dy: f64,
        dz: f64,
        /// Speed in µm/s on all axes
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Stop all motors
    Stop,
    /// Enable remote control
    Remote,
    /// Return to joystick control
    Manual,
    /// Short acoustic signals
    Beep {
        /// Number of signals
        count: i64,
        /// Use long signals
        #[arg(long)]
        long: bool,
    },
    /// Send a literal command to the InjectMan
    Raw { command: String },
}

#[derive(Subcommand)]
enum VoltageCommands {
    /// Set a channel level
    Set { channel: i64, level: i64 },
    /// Read a channel level
    Sense { channel: i64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if cli.simulated {
        settings
            .inject_man
            .get_or_insert_with(InjectManConfig::simulated)
            .simulated = true;
        settings
            .voltage_control
            .get_or_insert_with(VoltageControlConfig::simulated)
            .simulated = true;
    }
    settings.validate().context("Invalid configuration")?;
    logging::init_from_settings(&settings)?;
    info!(application = %settings.application.name, "starting");

    match cli.command {
        Commands::InjectMan(command) => run_inject_man(&settings, command),
        Commands::Voltage { command } => run_voltage(&settings, command),
    }
}

fn run_inject_man(settings: &Settings, command: InjectManCommands) -> Result<()> {
    let Some(config) = &settings.inject_man else {
        bail!("No [inject_man] section in the configuration");
    };
    let mut im = InjectMan::open(config).context("Failed to open the InjectMan")?;

    match command {
        InjectManCommands::Version => println!("{}", im.query_version()?),
        InjectManCommands::Position => {
            let report = im.query_position()?;
            let p = im
                .geometry()
                .motor_to_position(report.motor_position());
            println!("motor     {:?}", report.position);
            println!("workspace x={:.1} y={:.1} z={:.1}", p.x, p.y, p.z);
            println!("switches  {:?}", report.switches());
        }
        InjectManCommands::Move {
            x,
            y,
            z,
            speed,
            no_wait,
        } => println!(
            "{}",
            im.move_to(Position::new(x, y, z), speed, !no_wait)?
        ),
        InjectManCommands::MoveBy { dx, dy, dz, speed } => {
            println!("{}", im.move_by(Position::new(dx, dy, dz), speed, true)?)
        }
        InjectManCommands::Stop => println!("{}", im.stop()?),
        InjectManCommands::Remote => println!("{}", im.switch_to_remote_control()?),
        InjectManCommands::Manual => println!("{}", im.switch_to_manual_control()?),
        InjectManCommands::Beep { count, long } => {
            let reply = if long {
                im.trigger_long_acoustic_signals(count)?
            } else {
                im.trigger_short_acoustic_signals(count)?
            };
            println!("{reply}");
        }
        InjectManCommands::Raw { command } => println!("{}", im.call(command)?),
    }

    im.close()?;
    Ok(())
}

fn run_voltage(settings: &Settings, command: VoltageCommands) -> Result<()> {
    let Some(config) = &settings.voltage_control else {
        bail!("No [voltage_control] section in the configuration");
    };
    let mut vc = VoltageControl::open(config).context("Failed to open the voltage controller")?;

    match command {
        VoltageCommands::Set { channel, level } => {
            println!("{}", vc.set_voltage(channel, level)?)
        }
        VoltageCommands::Sense { channel } => println!("{}", vc.sense_voltage(channel)?),
    }

    vc.close()?;
    Ok(())
}
