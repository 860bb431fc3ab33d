use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::trace;

use crate::cli::OutputFormat;
use crate::codec::CommandEnvelope;
use crate::error::ProtocolError;
use crate::flow::{SessionFlow, SessionState};
use crate::hw::{FoundDevice, HardwareClient};
use crate::profile::ConfigurationProfile;
use crate::terminal::TerminalClient;

use super::profile_cmd::ProfileFieldArgs;
use super::ui::Painter;
use super::{DEFAULT_READY_TIMEOUT, local_wall_clock};

/// Arguments for the `setup` command.
#[derive(Debug, Args)]
pub struct SetupArgs {
    #[command(flatten)]
    fields: ProfileFieldArgs,
    /// Persist the effective profile after the device accepts it.
    #[arg(long)]
    save: bool,
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

impl SetupArgs {
    /// Creates setup arguments with defaults and no field overrides.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: ProfileFieldArgs::default(),
            save: false,
            manual_control: false,
            ready_timeout: None,
            profile_path: None,
        }
    }

    /// Enables persisting the effective profile.
    #[must_use]
    pub fn with_save(mut self) -> Self {
        self.save = true;
        self
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

impl Default for SetupArgs {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct SetupResult<'a> {
    device: &'a FoundDevice,
    state: SessionState,
    ready_frame: &'a str,
    startup_frame: &'a str,
    profile: &'a ConfigurationProfile,
    saved_to: Option<String>,
}

/// Executes the `setup` command.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    device_name: &str,
    args: SetupArgs,
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

    let command_result = configure(&mut flow, ready_timeout, &profile).await;
    let state = flow.state();
    let close_result = flow.disconnect().await;
    if let Err(error) = close_result {
        if command_result.is_ok() {
            return Err(error.into());
        }
        trace!(%error, "ignoring disconnect failure after a failed command");
    }
    let (ready, startup) = command_result?;

    let saved_to = if args.save {
        store.save(&profile)?;
        Some(store.path().display().to_string())
    } else {
        None
    };

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{} {}",
                painter.heading("Ready handshake sent:"),
                painter.value(ready.frame())
            )?;
            writeln!(
                out,
                "{} {}",
                painter.heading("Startup configuration sent:"),
                painter.value(startup.frame())
            )?;
            writeln!(
                out,
                "{} {}",
                painter.heading("Session state:"),
                painter.success(state.to_string())
            )?;
            if let Some(path) = &saved_to {
                writeln!(out, "{}", painter.muted(format!("(profile saved to {path})")))?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &SetupResult {
                    device: &device,
                    state,
                    ready_frame: ready.frame(),
                    startup_frame: startup.frame(),
                    profile: &profile,
                    saved_to,
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}

async fn configure(
    flow: &mut SessionFlow,
    ready_timeout: Duration,
    profile: &ConfigurationProfile,
) -> Result<(CommandEnvelope, CommandEnvelope), ProtocolError> {
    let ready = flow
        .await_device_ready(ready_timeout, local_wall_clock())
        .await?;
    let startup = flow.submit_startup(profile).await?;
    Ok((ready, startup))
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
