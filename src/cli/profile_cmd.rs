use std::io;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::profile::{ClockTime, ConfigurationProfile, ProfileOverrides};
use crate::terminal::TerminalClient;

use super::ui::{Painter, ProfileView};

/// Optional per-field overrides for the operating configuration.
#[derive(Debug, Default, Args)]
pub struct ProfileFieldArgs {
    /// Temperature below which the blind closes, in degrees Celsius.
    #[arg(long)]
    lower_temperature: Option<u8>,
    /// Temperature above which the blind opens, in degrees Celsius.
    #[arg(long)]
    upper_temperature: Option<u8>,
    /// Ambient light percentage at which the blind opens.
    #[arg(long)]
    light_level: Option<u8>,
    /// Obstruction distance threshold.
    #[arg(long)]
    distance: Option<u8>,
    /// Scheduled daily opening time as `HH:MM`.
    #[arg(long)]
    open_time: Option<ClockTime>,
    /// Scheduled daily closing time as `HH:MM`.
    #[arg(long)]
    close_time: Option<ClockTime>,
}

impl ProfileFieldArgs {
    pub(crate) fn into_overrides(self) -> ProfileOverrides {
        let Self {
            lower_temperature,
            upper_temperature,
            light_level,
            distance,
            open_time,
            close_time,
        } = self;

        ProfileOverrides {
            lower_temperature,
            upper_temperature,
            light_level,
            distance,
            open_time,
            close_time,
        }
    }
}

/// Arguments for the `profile` command.
#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Profile file location; defaults to the platform configuration directory.
    #[arg(long, global = true)]
    profile_path: Option<PathBuf>,
    #[command(subcommand)]
    action: ProfileAction,
}

impl ProfileArgs {
    /// Creates profile arguments directly without CLI parsing.
    #[must_use]
    pub fn new(action: ProfileAction) -> Self {
        Self {
            profile_path: None,
            action,
        }
    }

    /// Overrides the profile file location.
    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }
}

/// Profile edits that never touch the device.
#[derive(Debug, Subcommand)]
pub enum ProfileAction {
    /// Print the persisted profile, or the defaults when none was saved.
    Show,
    /// Persist new values for the given fields, keeping the rest.
    Set(ProfileSetArgs),
    /// Persist the firmware default profile.
    Reset,
}

/// Arguments for `profile set`.
#[derive(Debug, Args)]
pub struct ProfileSetArgs {
    #[command(flatten)]
    fields: ProfileFieldArgs,
}

#[derive(Serialize)]
struct ProfileRecord<'a> {
    path: String,
    profile: &'a ConfigurationProfile,
}

/// Executes the `profile` command.
pub(crate) fn run<W>(
    args: ProfileArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let store = super::profile_store(args.profile_path.as_deref())?;

    let profile = match args.action {
        ProfileAction::Show => store.load()?,
        ProfileAction::Set(set_args) => {
            let overrides = set_args.fields.into_overrides();
            if overrides.is_empty() {
                bail!("profile set requires at least one field flag");
            }
            let profile = store.load()?.with_overrides(&overrides);
            store.save(&profile)?;
            profile
        }
        ProfileAction::Reset => {
            let profile = ConfigurationProfile::default();
            store.save(&profile)?;
            profile
        }
    };

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{}",
                ProfileView::new(&profile, store.path(), &painter)
            )?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &ProfileRecord {
                    path: store.path().display().to_string(),
                    profile: &profile,
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::terminal::TerminalClient;

    use super::*;

    struct NoTerminal;

    impl TerminalClient for NoTerminal {
        fn stdout_is_terminal(&self) -> bool {
            false
        }

        fn stderr_is_terminal(&self) -> bool {
            false
        }
    }

    fn temp_profile_path(tag: &str) -> PathBuf {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "blindctl-{tag}-{}-{timestamp}.json",
            std::process::id()
        ))
    }

    #[test]
    fn set_without_field_flags_is_rejected() {
        let args = ProfileArgs::new(ProfileAction::Set(ProfileSetArgs {
            fields: ProfileFieldArgs::default(),
        }))
        .with_profile_path(temp_profile_path("set-empty"));

        let mut out = Vec::new();
        let result = run(args, &mut out, &NoTerminal, OutputFormat::Pretty);
        assert!(result.is_err());
    }

    #[test]
    fn set_persists_overridden_fields() -> Result<()> {
        let path = temp_profile_path("set");
        let args = ProfileArgs::new(ProfileAction::Set(ProfileSetArgs {
            fields: ProfileFieldArgs {
                upper_temperature: Some(60),
                ..ProfileFieldArgs::default()
            },
        }))
        .with_profile_path(&path);

        let mut out = Vec::new();
        run(args, &mut out, &NoTerminal, OutputFormat::Json)?;

        let saved = crate::profile::ProfileStore::at_path(&path).load()?;
        assert_eq!(60, saved.upper_temperature());
        assert_eq!(25, saved.lower_temperature());
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn reset_restores_firmware_defaults() -> Result<()> {
        let path = temp_profile_path("reset");
        let store = crate::profile::ProfileStore::at_path(&path);
        store.save(
            &ConfigurationProfile::builder()
                .lower_temperature(1)
                .build(),
        )?;

        let args =
            ProfileArgs::new(ProfileAction::Reset).with_profile_path(&path);
        let mut out = Vec::new();
        run(args, &mut out, &NoTerminal, OutputFormat::Json)?;

        assert_eq!(ConfigurationProfile::default(), store.load()?);
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn show_renders_defaults_when_nothing_was_saved() -> Result<()> {
        let args = ProfileArgs::new(ProfileAction::Show)
            .with_profile_path(temp_profile_path("show"));
        let mut out = Vec::new();
        run(args, &mut out, &NoTerminal, OutputFormat::Pretty)?;

        let rendered = String::from_utf8(out)?;
        assert!(rendered.contains("Configuration profile:"));
        assert!(rendered.contains("11:25"));
        Ok(())
    }
}
