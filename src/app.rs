use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::hw::{
    DeviceSession, HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::protocol::BLIND_LOCAL_NAME;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
///
/// # Errors
///
/// Returns an error when no adapter is available or the platform refuses
/// bluetooth access.
pub async fn real_hardware_client() -> Result<Box<dyn HardwareClient>> {
    Ok(Box::new(build_real_hardware_client().await?))
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    Box::new(build_fake_hardware_client(fake_args.into_backend_config()))
}

/// Session-level app helper for acquiring a blind-controller connection.
pub struct SessionHandler {
    hardware_client: Box<dyn HardwareClient>,
    device_name: String,
}

impl SessionHandler {
    /// Creates a session handler using the default blind-module name.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let handler = blindctl::SessionHandler::new(blindctl::real_hardware_client().await?);
    /// let _ = handler;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn new(hardware_client: Box<dyn HardwareClient>) -> Self {
        Self {
            hardware_client,
            device_name: BLIND_LOCAL_NAME.to_string(),
        }
    }

    /// Overrides the advertised local name matched when scanning.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let handler = blindctl::SessionHandler::new(blindctl::real_hardware_client().await?)
    ///     .with_device_name("DSD TECH");
    /// let _ = handler;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn with_device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = device_name.into();
        self
    }

    /// Connects to the first peripheral advertising the configured name.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or connection fails.
    #[instrument(skip(self), level = "info", fields(device_name = %self.device_name))]
    pub async fn connect_first(self) -> Result<DeviceSession> {
        let span = tracing::Span::current();
        span.pb_set_message("Scanning for the blind module and connecting");

        let device_name = self.device_name;
        let hardware_client = self.hardware_client;
        match hardware_client
            .connect_first_device(device_name.as_str())
            .await
        {
            Ok(session) => {
                let finish_message = format!("{} Connected", "✓".green());
                span.pb_set_finish_message(&finish_message);
                Ok(session)
            }
            Err(error) => {
                let finish_message = format!("{} Connection failed", "✗".red());
                span.pb_set_finish_message(&finish_message);
                Err(error.into())
            }
        }
    }
}

/// Runs the CLI command with an injected hardware client.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = blindctl::Args::try_parse_from([
///     "blindctl",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|DSD TECH|-43",
///     "inspect",
/// ])?;
/// let device_name = args.device_name().to_string();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blindctl::fake_hardware_client(fake_args),
///     None => blindctl::real_hardware_client().await?,
/// };
/// let mut out = Vec::new();
/// blindctl::run(
///     command,
///     &mut out,
///     hardware_client,
///     blindctl::OutputFormat::Json,
///     &device_name,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    output_format: OutputFormat,
    device_name: &str,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, hardware_client, None, output_format, device_name).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
    device_name: &str,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        hardware_client,
        log_level,
        output_format,
        device_name,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl blindctl::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = blindctl::Args::try_parse_from([
///     "blindctl",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|DSD TECH|-43",
///     "inspect",
/// ])?;
/// let log_level = args.log_level();
/// let device_name = args.device_name().to_string();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blindctl::fake_hardware_client(fake_args),
///     None => blindctl::real_hardware_client().await?,
/// };
/// let mut out = Vec::new();
/// blindctl::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     hardware_client,
///     log_level,
///     blindctl::OutputFormat::Json,
///     &device_name,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client),
    level = "info",
    fields(command = %command_name(&command), ?log_level, device_name)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
    device_name: &str,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "blindctl",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Inspect => {
            crate::cli::inspect::run(hardware_client, device_name, out, terminal_client, output_format)
                .await
        }
        Command::Listen(args) => {
            crate::cli::listen::run(
                hardware_client,
                device_name,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Setup(args) => {
            crate::cli::setup::run(
                hardware_client,
                device_name,
                args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Open(args) => {
            crate::cli::open::run(
                hardware_client,
                device_name,
                args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Profile(args) => {
            crate::cli::profile_cmd::run(args, out, terminal_client, output_format)
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Inspect => "inspect",
        Command::Listen(_args) => "listen",
        Command::Setup(_args) => "setup",
        Command::Open(_args) => "open",
        Command::Profile(_args) => "profile",
    }
}
