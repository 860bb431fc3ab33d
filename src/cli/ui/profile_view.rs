use std::fmt::{self, Display, Formatter};
use std::path::Path;

use crate::profile::ConfigurationProfile;

use super::painter::Painter;
use super::table::Table;

/// Renders the persisted configuration profile.
pub(crate) struct ProfileView<'a> {
    profile: &'a ConfigurationProfile,
    path: &'a Path,
    painter: &'a Painter,
}

impl<'a> ProfileView<'a> {
    pub(crate) fn new(
        profile: &'a ConfigurationProfile,
        path: &'a Path,
        painter: &'a Painter,
    ) -> Self {
        Self {
            profile,
            path,
            painter,
        }
    }
}

impl Display for ProfileView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let table = Table::key_value(
            self.painter,
            vec![
                (
                    "lower_temperature",
                    self.profile.lower_temperature().to_string(),
                ),
                (
                    "upper_temperature",
                    self.profile.upper_temperature().to_string(),
                ),
                ("light_level", self.profile.light_level().to_string()),
                ("distance", self.profile.distance().to_string()),
                ("open_time", self.profile.open_time().to_string()),
                ("close_time", self.profile.close_time().to_string()),
            ],
        );

        write!(f, "{}", self.painter.heading("Configuration profile:"))?;
        write!(f, "\n{table}")?;
        writeln!(f)?;
        write!(
            f,
            "\n{}",
            self.painter.muted(format!("({})", self.path.display()))
        )
    }
}
