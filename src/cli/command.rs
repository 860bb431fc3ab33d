use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::listen::ListenArgs;
use crate::cli::open::OpenArgs;
use crate::cli::profile_cmd::ProfileArgs;
use crate::cli::setup::SetupArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeBackendConfig, NotificationPayloads, ScanFixture};
use crate::protocol::BLIND_LOCAL_NAME;

/// Command-line options for the blind-controller BLE tool.
#[derive(Debug, Parser)]
#[command(name = "blindctl", about = "Control a DSD TECH BLE window-blind module.")]
pub struct Args {
    /// Log verbosity override; falls back to `RUST_LOG` or `warn`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Advertised local name the scan matches exactly.
    #[arg(long, global = true, default_value = BLIND_LOCAL_NAME)]
    device_name: String,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake notification payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    /// Fails the Nth fake characteristic write (1-based) with a transport error.
    #[arg(long, global = true, requires = "fake")]
    fake_write_failure: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use blindctl::{Args, Command, ListenArgs};
    ///
    /// let inspect = Args::new(Command::Inspect);
    /// let listen = Args::new(Command::Listen(ListenArgs::new(Some(10))));
    /// let _ = (inspect, listen);
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            device_name: BLIND_LOCAL_NAME.to_string(),
            fake: false,
            fake_scan: None,
            fake_notifications: None,
            fake_discovery_delay: None,
            fake_write_failure: None,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            notifications,
            discovery_delay,
            write_failure,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_notifications = notifications;
        self.fake_discovery_delay = Some(discovery_delay);
        self.fake_write_failure = write_failure;
        self
    }

    /// Overrides the advertised local name the scan matches.
    #[must_use]
    pub fn with_device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = device_name.into();
        self
    }

    /// Returns the requested log verbosity, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Returns the advertised local name the scan matches.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            log_level: _,
            output: _,
            device_name: _,
            fake,
            fake_scan,
            fake_notifications,
            fake_discovery_delay,
            fake_write_failure,
            command,
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                notifications: fake_notifications,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                write_failure: fake_write_failure,
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Requested log verbosity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Requested output rendering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and colour.
    Pretty,
    /// Machine-readable JSON lines.
    Json,
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    discovery_delay: Duration,
    write_failure: Option<usize>,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            notifications,
            discovery_delay,
            write_failure,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .maybe_notifications(notifications)
            .discovery_delay(discovery_delay)
            .maybe_write_failure(write_failure)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan until the blind module is found, connect, and print GATT details.
    Inspect,
    /// Scan until the blind module is found, connect, then print raw notifications.
    Listen(ListenArgs),
    /// Perform the readiness handshake and push the operating configuration.
    Setup(SetupArgs),
    /// Perform the handshake and configuration, then move the blind to a percentage.
    Open(OpenArgs),
    /// Show or edit the persisted configuration profile without connecting.
    Profile(ProfileArgs),
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["blindctl", "--fake", "inspect"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[rstest]
    #[case::notifications("--fake-notifications", "52")]
    #[case::write_failure("--fake-write-failure", "3")]
    fn fake_fixture_flags_require_fake_mode(#[case] flag: &str, #[case] value: &str) {
        let result = Args::try_parse_from(["blindctl", flag, value, "inspect"]);

        let error = result.expect_err("fake fixture flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "inspect",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake_args) = cli
            .into_command_and_fake_args()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Inspect);
        assert_matches!(fake_args, Some(_));
    }

    #[test]
    fn device_name_defaults_to_the_blind_module_name() {
        let cli = Args::try_parse_from(["blindctl", "inspect"])
            .expect("bare inspect invocation should parse");
        assert_eq!("DSD TECH", cli.device_name());
    }

    #[test]
    fn open_parses_percentage_argument() {
        let cli = Args::try_parse_from(["blindctl", "open", "65"])
            .expect("open with a percentage should parse");
        assert_matches!(cli.command, Command::Open(args) if args.percent() == 65);
    }

    #[test]
    fn open_accepts_out_of_range_values_for_later_clamping() {
        let cli = Args::try_parse_from(["blindctl", "open", "--", "-20"])
            .expect("negative percentages parse and are clamped at send time");
        assert_matches!(cli.command, Command::Open(args) if args.percent() == -20);
    }

    #[test]
    fn log_level_maps_to_filters() {
        assert_eq!(LevelFilter::DEBUG, LogLevel::Debug.as_level_filter());
        assert_eq!(LevelFilter::OFF, LogLevel::Off.as_level_filter());
    }
}
