use strum_macros::Display;
use time::Time;

use crate::profile::ConfigurationProfile;
use crate::protocol::FRAME_SENTINEL;

/// The three command families understood by the blind firmware.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum CommandKind {
    /// Readiness handshake reply carrying the wall clock.
    #[strum(to_string = "ready")]
    Ready,
    /// One-shot operating configuration.
    #[strum(to_string = "startup")]
    Startup,
    /// Move the blind to a target open percentage.
    #[strum(to_string = "open")]
    Open,
}

/// A single encoded outbound instruction.
///
/// Frames are plain ASCII, so the encoded payload is kept as a `String` and
/// handed to the transport as bytes at write time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandEnvelope {
    kind: CommandKind,
    frame: String,
}

impl CommandEnvelope {
    /// Returns the command family this envelope carries.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Returns the encoded ASCII frame, sentinel included.
    #[must_use]
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Returns the frame as the byte payload written to the characteristic.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.frame.as_bytes()
    }
}

/// Encodes application intents into the firmware's ASCII wire format.
pub struct CommandCodec;

impl CommandCodec {
    /// Encodes the `Ready` handshake reply.
    ///
    /// `clock` is the local 24-hour wall clock at send time and
    /// `manual_control` echoes whether manual control mode is active.
    ///
    /// ```
    /// use time::Time;
    ///
    /// let clock = Time::from_hms(9, 5, 0).expect("valid wall clock");
    /// let envelope = blindctl::CommandCodec::encode_ready(clock, false);
    /// assert_eq!("R: 09:05 false :E", envelope.frame());
    /// ```
    #[must_use]
    pub fn encode_ready(clock: Time, manual_control: bool) -> CommandEnvelope {
        CommandEnvelope {
            kind: CommandKind::Ready,
            frame: format!(
                "R: {:02}:{:02} {manual_control} {FRAME_SENTINEL}",
                clock.hour(),
                clock.minute(),
            ),
        }
    }

    /// Encodes the `Startup` configuration command from a profile.
    ///
    /// Fields are space-separated in the fixed order the firmware parses:
    /// lower temperature, upper temperature, light level, distance, open
    /// time, close time.
    #[must_use]
    pub fn encode_startup(profile: &ConfigurationProfile) -> CommandEnvelope {
        CommandEnvelope {
            kind: CommandKind::Startup,
            frame: format!(
                "Startup: {} {} {} {} {} {}{FRAME_SENTINEL}",
                profile.lower_temperature(),
                profile.upper_temperature(),
                profile.light_level(),
                profile.distance(),
                profile.open_time(),
                profile.close_time(),
            ),
        }
    }

    /// Encodes the `Open` command with the percentage clamped to `[0,100]`.
    ///
    /// ```
    /// let envelope = blindctl::CommandCodec::encode_open(150);
    /// assert_eq!("O: 100 :E", envelope.frame());
    /// ```
    #[must_use]
    pub fn encode_open(percent: i64) -> CommandEnvelope {
        CommandEnvelope {
            kind: CommandKind::Open,
            frame: format!("O: {} {FRAME_SENTINEL}", Self::clamp_percent(percent)),
        }
    }

    /// Clamps an open percentage into the `[0,100]` range the firmware accepts.
    #[must_use]
    pub fn clamp_percent(percent: i64) -> u8 {
        percent.clamp(0, 100) as u8
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use time::Time;

    use crate::profile::{ClockTime, ConfigurationProfile};

    use super::*;

    #[rstest]
    #[case(-5, 0)]
    #[case(0, 0)]
    #[case(42, 42)]
    #[case(100, 100)]
    #[case(150, 100)]
    #[case(i64::MIN, 0)]
    #[case(i64::MAX, 100)]
    fn clamp_percent_stays_in_range(#[case] input: i64, #[case] expected: u8) {
        assert_eq!(expected, CommandCodec::clamp_percent(input));
    }

    #[rstest]
    #[case(-5)]
    #[case(50)]
    #[case(150)]
    fn clamp_percent_is_idempotent(#[case] input: i64) {
        let once = CommandCodec::clamp_percent(input);
        assert_eq!(once, CommandCodec::clamp_percent(i64::from(once)));
    }

    #[rstest]
    #[case(9, 5, false, "R: 09:05 false :E")]
    #[case(23, 59, true, "R: 23:59 true :E")]
    #[case(0, 0, false, "R: 00:00 false :E")]
    fn ready_frame_carries_clock_and_manual_flag(
        #[case] hour: u8,
        #[case] minute: u8,
        #[case] manual: bool,
        #[case] expected: &str,
    ) {
        let clock = Time::from_hms(hour, minute, 0).expect("test wall clock should be valid");
        let envelope = CommandCodec::encode_ready(clock, manual);
        assert_eq!(CommandKind::Ready, envelope.kind());
        assert_eq!(expected, envelope.frame());
    }

    #[test]
    fn startup_frame_matches_firmware_field_order() {
        let profile = ConfigurationProfile::builder()
            .lower_temperature(25)
            .upper_temperature(50)
            .light_level(50)
            .distance(50)
            .open_time(ClockTime::new(0, 0).expect("valid time"))
            .close_time(ClockTime::new(11, 25).expect("valid time"))
            .build();

        let envelope = CommandCodec::encode_startup(&profile);
        assert_eq!("Startup: 25 50 50 50 00:00 11:25:E", envelope.frame());
    }

    #[rstest]
    #[case(150, "O: 100 :E")]
    #[case(-5, "O: 0 :E")]
    #[case(65, "O: 65 :E")]
    fn open_frame_clamps_before_encoding(#[case] percent: i64, #[case] expected: &str) {
        let envelope = CommandCodec::encode_open(percent);
        assert_eq!(expected, envelope.frame());
    }

    #[test]
    fn payload_is_ascii_bytes_of_the_frame() {
        let envelope = CommandCodec::encode_open(0);
        assert_eq!(b"O: 0 :E".as_slice(), envelope.payload());
    }
}
