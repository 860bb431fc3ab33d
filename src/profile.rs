use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bon::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::debug;

/// Errors returned while parsing or persisting configuration profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("clock times must use the `HH:MM` 24-hour form, got `{value}`")]
    InvalidClockTime { value: String },
    #[error("no platform configuration directory is available")]
    NoConfigDirectory,
    #[error("failed to read or write profile file `{path}`")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("profile file `{path}` is not valid JSON")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A local wall-clock time of day, rendered as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, SerializeDisplay, DeserializeFromStr)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Creates a clock time, validating the 24-hour range.
    ///
    /// # Errors
    ///
    /// Returns an error when `hour` is not below 24 or `minute` not below 60.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ProfileError> {
        if hour >= 24 || minute >= 60 {
            return Err(ProfileError::InvalidClockTime {
                value: format!("{hour}:{minute}"),
            });
        }
        Ok(Self { hour, minute })
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ProfileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ProfileError::InvalidClockTime {
            value: value.to_string(),
        };

        let (raw_hour, raw_minute) = value.split_once(':').ok_or_else(invalid)?;
        let hour = raw_hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = raw_minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

/// User-entered operating parameters consumed when a `Startup` command is built.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationProfile {
    /// Temperature below which the blind closes, in degrees Celsius.
    #[builder(default = 25)]
    lower_temperature: u8,
    /// Temperature above which the blind opens, in degrees Celsius.
    #[builder(default = 50)]
    upper_temperature: u8,
    /// Ambient light percentage at which the blind opens.
    #[builder(default = 50)]
    light_level: u8,
    /// Obstruction distance threshold.
    #[builder(default = 50)]
    distance: u8,
    /// Scheduled daily opening time.
    #[builder(default = ClockTime { hour: 0, minute: 0 })]
    open_time: ClockTime,
    /// Scheduled daily closing time.
    #[builder(default = ClockTime { hour: 11, minute: 25 })]
    close_time: ClockTime,
}

impl ConfigurationProfile {
    /// Returns the lower temperature threshold.
    #[must_use]
    pub fn lower_temperature(&self) -> u8 {
        self.lower_temperature
    }

    /// Returns the upper temperature threshold.
    #[must_use]
    pub fn upper_temperature(&self) -> u8 {
        self.upper_temperature
    }

    /// Returns the light-level threshold.
    #[must_use]
    pub fn light_level(&self) -> u8 {
        self.light_level
    }

    /// Returns the distance threshold.
    #[must_use]
    pub fn distance(&self) -> u8 {
        self.distance
    }

    /// Returns the scheduled opening time.
    #[must_use]
    pub fn open_time(&self) -> ClockTime {
        self.open_time
    }

    /// Returns the scheduled closing time.
    #[must_use]
    pub fn close_time(&self) -> ClockTime {
        self.close_time
    }

    /// Applies field overrides on top of this profile.
    #[must_use]
    pub(crate) fn with_overrides(mut self, overrides: &ProfileOverrides) -> Self {
        if let Some(value) = overrides.lower_temperature {
            self.lower_temperature = value;
        }
        if let Some(value) = overrides.upper_temperature {
            self.upper_temperature = value;
        }
        if let Some(value) = overrides.light_level {
            self.light_level = value;
        }
        if let Some(value) = overrides.distance {
            self.distance = value;
        }
        if let Some(value) = overrides.open_time {
            self.open_time = value;
        }
        if let Some(value) = overrides.close_time {
            self.close_time = value;
        }
        self
    }
}

impl Default for ConfigurationProfile {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Optional per-field profile overrides collected from the CLI.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProfileOverrides {
    pub(crate) lower_temperature: Option<u8>,
    pub(crate) upper_temperature: Option<u8>,
    pub(crate) light_level: Option<u8>,
    pub(crate) distance: Option<u8>,
    pub(crate) open_time: Option<ClockTime>,
    pub(crate) close_time: Option<ClockTime>,
}

impl ProfileOverrides {
    /// Returns whether any field is overridden.
    pub(crate) fn is_empty(&self) -> bool {
        self.lower_temperature.is_none()
            && self.upper_temperature.is_none()
            && self.light_level.is_none()
            && self.distance.is_none()
            && self.open_time.is_none()
            && self.close_time.is_none()
    }
}

/// JSON-backed persistence for the configuration profile.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Creates a store over an explicit file path.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store over the platform default configuration path.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform exposes no configuration directory.
    pub fn default_location() -> Result<Self, ProfileError> {
        let dirs =
            ProjectDirs::from("", "", "blindctl").ok_or(ProfileError::NoConfigDirectory)?;
        Ok(Self {
            path: dirs.config_dir().join("profile.json"),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted profile, or the defaults when none was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<ConfigurationProfile, ProfileError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted profile, using defaults");
            return Ok(ConfigurationProfile::default());
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|source| ProfileError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ProfileError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Persists a profile, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the file or its directory cannot be written.
    pub fn save(&self, profile: &ConfigurationProfile) -> Result<(), ProfileError> {
        let io_error = |source| ProfileError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let rendered = serde_json::to_string_pretty(profile).map_err(|source| {
            ProfileError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, rendered).map_err(io_error)
    }
}
