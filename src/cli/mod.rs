use std::path::Path;
use std::time::Duration;

use time::{OffsetDateTime, Time};

use crate::profile::{ProfileError, ProfileStore};

pub(crate) mod command;
pub(crate) mod inspect;
pub(crate) mod listen;
pub(crate) mod open;
pub(crate) mod profile_cmd;
pub(crate) mod setup;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::listen::ListenArgs;
pub use self::open::OpenArgs;
pub use self::profile_cmd::{ProfileAction, ProfileArgs, ProfileSetArgs};
pub use self::setup::SetupArgs;

pub(crate) const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn profile_store(path: Option<&Path>) -> Result<ProfileStore, ProfileError> {
    match path {
        Some(path) => Ok(ProfileStore::at_path(path)),
        None => ProfileStore::default_location(),
    }
}

/// Local wall clock stamped into the readiness reply. Falls back to UTC when
/// the local offset cannot be determined.
pub(crate) fn local_wall_clock() -> Time {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .time()
}
