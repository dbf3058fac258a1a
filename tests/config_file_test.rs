//! Integration tests for loading settings from disk and opening devices from them.

use std::io::Write;
use tempfile::NamedTempFile;
use tweezers_daq::config::{LineEnding, Settings};
use tweezers_daq::logging::{self, OutputFormat, TracingConfig};
use tweezers_daq::transport::ReplyWait;
use tweezers_daq::{InjectMan, VoltageControl};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_simulated_bench_from_file() {
    let file = write_config(
        r#"
        [application]
        name = "bench"
        log_level = "warn"
        log_format = "compact"

        [inject_man]
        simulated = true
        default_speed = 250

        [inject_man.connection]
        reply_wait = { bounded_ms = 500 }

        [voltage_control]
        simulated = true
        channels = 2

        [voltage_control.connection]
        reply_wait = "forever"
        "#,
    );

    let settings = Settings::load_from(file.path()).unwrap();
    settings.validate().unwrap();
    logging::init_from_settings(&settings).unwrap();

    let im_config = settings.inject_man.as_ref().unwrap();
    assert_eq!(im_config.connection.reply_wait, ReplyWait::BoundedMs(500));
    let mut im = InjectMan::open(im_config).unwrap();
    assert_eq!(im.default_speed(), 250.0);
    assert_eq!(im.query_position().unwrap().position, [595, 0, 778]);
    im.close().unwrap();

    let mut vc = VoltageControl::open(settings.voltage_control.as_ref().unwrap()).unwrap();
    assert_eq!(vc.limits().channels, 2);
    assert_eq!(vc.set_voltage(1, 10).unwrap(), 10);
    assert!(vc.set_voltage(2, 10).is_err());
    vc.close().unwrap();
}

#[test]
fn test_terminator_overrides_are_parsed() {
    let file = write_config(
        r#"
        [voltage_control.connection]
        port = "/dev/ttyACM0"
        baud_rate = 115200
        command_terminator = "lf"
        reply_delimiter = "cr"
        settle_ms = 0
        reply_wait = "forever"
        "#,
    );

    let settings = Settings::load_from(file.path()).unwrap();
    let conn = &settings.voltage_control.unwrap().connection;
    assert_eq!(conn.baud_rate, Some(115200));
    assert_eq!(conn.command_terminator, Some(LineEnding::Lf));
    assert_eq!(conn.reply_delimiter, Some(LineEnding::Cr));
    assert_eq!(conn.settle_ms, Some(0));
}

#[test]
fn test_unknown_line_ending_is_rejected() {
    let file = write_config(
        r#"
        [inject_man.connection]
        port = "/dev/ttyUSB0"
        command_terminator = "crlf"
        reply_wait = "forever"
        "#,
    );
    assert!(Settings::load_from(file.path()).is_err());
}

#[test]
fn test_logging_init_is_idempotent() {
    let config = TracingConfig::new(tracing::Level::WARN)
        .with_format(OutputFormat::Compact)
        .with_ansi(false);
    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());
}
