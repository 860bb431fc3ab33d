use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::trace;

use crate::cli::OutputFormat;
use crate::error::ProtocolError;
use crate::flow::{OpenOutcome, SessionFlow, SessionState};
use crate::hw::{FoundDevice, HardwareClient};
use crate::profile::ConfigurationProfile;
use crate::terminal::TerminalClient;

use super::profile_cmd::ProfileFieldArgs;
use super::ui::Painter;
use super::{DEFAULT_READY_TIMEOUT, local_wall_clock};

/// Arguments for the `open` command.
#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Target opening percentage; values outside `0..=100` are clamped.
    #[arg(allow_hyphen_values = true)]
    percent: i64,
    #[command(flatten)]
    fields: ProfileFieldArgs,
    /// Report manual control in the readiness reply.
    #[arg(long)]
    manual_control: bool,
    /// How long to wait for the firmware's ready token (e.g. `10s`).
    #[arg(long, value_parser = parse_duration)]
    ready_timeout: Option<Duration>,
    /// Profile file location; defaults to the platform configuration directory.
    #[arg(long)]
    profile_path: Option<PathBuf>,
}

impl OpenArgs {
    /// Creates open arguments for a target percentage.
    #[must_use]
    pub fn new(percent: i64) -> Self {
        Self {
            percent,
            fields: ProfileFieldArgs::default(),
            manual_control: false,
            ready_timeout: None,
            profile_path: None,
        }
    }

    /// Returns the requested opening percentage.
    #[must_use]
    pub fn percent(&self) -> i64 {
        self.percent
    }

    /// Reports manual control in the readiness reply.
    #[must_use]
    pub fn with_manual_control(mut self) -> Self {
        self.manual_control = true;
        self
    }

    /// Overrides the ready-token wait window.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Overrides the profile file location.
    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }
}

#[derive(Serialize)]
struct OpenResult<'a> {
    device: &'a FoundDevice,
    state: SessionState,
    ready_frame: &'a str,
    startup_frame: &'a str,
    open_frame: &'a str,
    requested_percent: i64,
    applied_percent: u8,
}

/// Executes the `open` command.
///
/// The firmware only honours `Open` on an operational session, so this walks
/// the full sequence: ready handshake, startup configuration, then the move.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    device_name: &str,
    args: OpenArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let store = super::profile_store(args.profile_path.as_deref())?;
    let profile = store.load()?.with_overrides(&args.fields.into_overrides());
    let ready_timeout = args.ready_timeout.unwrap_or(DEFAULT_READY_TIMEOUT);

    let session = crate::SessionHandler::new(client)
        .with_device_name(device_name)
        .connect_first()
        .await?;
    let mut flow = SessionFlow::new(session).with_manual_control(args.manual_control);
    let device = flow.device().clone();

    let command_result = drive(&mut flow, ready_timeout, &profile, args.percent).await;
    let state = flow.state();
    let close_result = flow.disconnect().await;
    if let Err(error) = close_result {
        if command_result.is_ok() {
            return Err(error.into());
        }
        trace!(%error, "ignoring disconnect failure after a failed command");
    }
    let sequence = command_result?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{} {}",
                painter.heading("Ready handshake sent:"),
                painter.value(sequence.ready_frame)
            )?;
            writeln!(
                out,
                "{} {}",
                painter.heading("Startup configuration sent:"),
                painter.value(sequence.startup_frame)
            )?;
            writeln!(
                out,
                "{} {}",
                painter.heading("Open command sent:"),
                painter.value(sequence.outcome.envelope().frame())
            )?;
            let applied = sequence.outcome.applied();
            if i64::from(applied) == sequence.outcome.requested() {
                writeln!(
                    out,
                    "{} {}",
                    painter.heading("Blind moving to:"),
                    painter.success(format!("{applied}%"))
                )?;
            } else {
                writeln!(
                    out,
                    "{} {}",
                    painter.heading("Blind moving to:"),
                    painter.warning(format!(
                        "{applied}% (requested {} was clamped)",
                        sequence.outcome.requested()
                    ))
                )?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &OpenResult {
                    device: &device,
                    state,
                    ready_frame: &sequence.ready_frame,
                    startup_frame: &sequence.startup_frame,
                    open_frame: sequence.outcome.envelope().frame(),
                    requested_percent: sequence.outcome.requested(),
                    applied_percent: sequence.outcome.applied(),
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}

struct OpenSequence {
    ready_frame: String,
    startup_frame: String,
    outcome: OpenOutcome,
}

async fn drive(
    flow: &mut SessionFlow,
    ready_timeout: Duration,
    profile: &ConfigurationProfile,
    percent: i64,
) -> Result<OpenSequence, ProtocolError> {
    let ready = flow
        .await_device_ready(ready_timeout, local_wall_clock())
        .await?;
    let startup = flow.submit_startup(profile).await?;
    let outcome = flow.submit_open(percent).await?;
    Ok(OpenSequence {
        ready_frame: ready.frame().to_string(),
        startup_frame: startup.frame().to_string(),
        outcome,
    })
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
