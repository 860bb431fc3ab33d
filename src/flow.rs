use std::time::Duration;

use serde_with::SerializeDisplay;
use strum_macros::Display;
use thiserror::Error;
use time::Time;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::codec::{CommandCodec, CommandEnvelope, CommandKind};
use crate::error::{InteractionError, ProtocolError};
use crate::hw::{DeviceSession, FoundDevice, WriteMode};
use crate::notification::{AckToken, NotificationHandler};
use crate::profile::ConfigurationProfile;
use crate::protocol::EndpointId;

/// Lifecycle phase of one connection to the blind controller.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, SerializeDisplay)]
pub enum SessionState {
    /// No connection established.
    #[strum(to_string = "idle")]
    Idle,
    /// Connected and subscribed, waiting for the firmware's ready token.
    #[strum(to_string = "awaiting_ready")]
    AwaitingReady,
    /// Ready handshake completed, configuration not yet sent.
    #[strum(to_string = "configuring")]
    Configuring,
    /// Configuration accepted, open commands allowed.
    #[strum(to_string = "operational")]
    Operational,
}

/// Errors raised when a command is attempted in the wrong session phase.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SessionStateError {
    #[error("cannot send `{kind}` while the session is {state}")]
    CommandNotPermitted {
        kind: CommandKind,
        state: SessionState,
    },
}

/// What to do with a decoded acknowledgement token.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckDisposition {
    /// Reply with the `Ready` handshake frame.
    SendReady,
    /// Drop the token; the handshake already happened on this connection.
    Ignored,
}

/// Pure state machine tracking the command lifecycle of one session.
///
/// All transport concerns live in [`SessionFlow`]; this type only answers
/// which transitions and commands are legal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionTracker {
    state: SessionState,
    ready_sent: bool,
}

impl SessionTracker {
    /// Creates a tracker in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            ready_sent: false,
        }
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Records that a connection and subscription were established.
    pub fn on_connected(&mut self) {
        self.state = SessionState::AwaitingReady;
    }

    /// Classifies an inbound acknowledgement token.
    ///
    /// The `Ready` reply is sent at most once per connection; repeated ready
    /// tokens from the firmware are dropped, as are tokens arriving in any
    /// phase other than [`SessionState::AwaitingReady`].
    pub fn on_ack(&mut self, token: AckToken) -> AckDisposition {
        match token {
            AckToken::DeviceReady => {
                if self.state == SessionState::AwaitingReady && !self.ready_sent {
                    self.ready_sent = true;
                    AckDisposition::SendReady
                } else {
                    AckDisposition::Ignored
                }
            }
        }
    }

    /// Records that the `Ready` reply reached the device.
    pub fn on_ready_sent(&mut self) {
        self.state = SessionState::Configuring;
    }

    /// Checks whether `kind` may be sent in the current phase.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending command and phase.
    pub fn authorize(&self, kind: CommandKind) -> Result<(), SessionStateError> {
        let allowed = match kind {
            CommandKind::Ready => self.state == SessionState::AwaitingReady,
            CommandKind::Startup => self.state == SessionState::Configuring,
            CommandKind::Open => self.state == SessionState::Operational,
        };
        if allowed {
            Ok(())
        } else {
            Err(SessionStateError::CommandNotPermitted {
                kind,
                state: self.state,
            })
        }
    }

    /// Records a successfully written command.
    pub fn on_command_sent(&mut self, kind: CommandKind) {
        match kind {
            CommandKind::Ready => self.state = SessionState::Configuring,
            CommandKind::Startup => self.state = SessionState::Operational,
            CommandKind::Open => {}
        }
    }

    /// Records a failed characteristic write.
    ///
    /// The session drops back to idle but `ready_sent` is kept: the firmware
    /// only accepts one handshake per power cycle, so a retry on the same
    /// connection must not repeat it.
    pub fn on_write_failure(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Records a disconnect, from any phase.
    pub fn on_disconnected(&mut self) {
        self.state = SessionState::Idle;
        self.ready_sent = false;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of submitting an `Open` command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OpenOutcome {
    envelope: CommandEnvelope,
    requested: i64,
    applied: u8,
}

impl OpenOutcome {
    /// Returns the encoded frame that was written.
    #[must_use]
    pub fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }

    /// Returns the percentage as requested by the caller.
    #[must_use]
    pub fn requested(&self) -> i64 {
        self.requested
    }

    /// Returns the clamped percentage actually sent.
    #[must_use]
    pub fn applied(&self) -> u8 {
        self.applied
    }
}

/// Drives the command lifecycle over an established device session.
pub struct SessionFlow {
    session: DeviceSession,
    tracker: SessionTracker,
    manual_control: bool,
}

impl SessionFlow {
    /// Wraps a freshly connected session; the tracker starts awaiting the
    /// firmware's ready token.
    #[must_use]
    pub fn new(session: DeviceSession) -> Self {
        let mut tracker = SessionTracker::new();
        tracker.on_connected();
        Self {
            session,
            tracker,
            manual_control: false,
        }
    }

    /// Sets the manual-control flag echoed in the `Ready` handshake.
    #[must_use]
    pub fn with_manual_control(mut self, manual_control: bool) -> Self {
        self.manual_control = manual_control;
        self
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    /// Returns the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        self.session.device()
    }

    /// Waits for the firmware's ready token and answers the handshake.
    ///
    /// Unrecognised notification payloads are skipped. `clock` is the wall
    /// clock stamped into the reply.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::ReadyTimeout`] when no ready token arrives
    /// within `timeout`, or a write error when the reply cannot be sent.
    #[instrument(skip_all, fields(timeout = ?timeout))]
    pub async fn await_device_ready(
        &mut self,
        timeout: Duration,
        clock: Time,
    ) -> Result<CommandEnvelope, ProtocolError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(InteractionError::ReadyTimeout { waited: timeout }.into());
            }

            let Some(payload) = self
                .session
                .next_notification(EndpointId::UartCharacteristic, remaining)
                .await?
            else {
                continue;
            };

            let Some(token) = NotificationHandler::decode(&payload) else {
                debug!(payload_len = payload.len(), "skipping non-acknowledgement payload");
                continue;
            };

            match self.tracker.on_ack(token) {
                AckDisposition::Ignored => {
                    debug!(?token, "acknowledgement ignored in current phase");
                }
                AckDisposition::SendReady => {
                    let envelope = CommandCodec::encode_ready(clock, self.manual_control);
                    self.write(&envelope).await?;
                    self.tracker.on_ready_sent();
                    info!(frame = envelope.frame(), "ready handshake completed");
                    return Ok(envelope);
                }
            }
        }
    }

    /// Sends the one-shot `Startup` configuration command.
    ///
    /// The firmware sends no acknowledgement for it; a successful write is
    /// treated as delivery and the session becomes operational.
    ///
    /// # Errors
    ///
    /// Returns a state error outside the configuring phase, or a write error.
    #[instrument(skip_all)]
    pub async fn submit_startup(
        &mut self,
        profile: &ConfigurationProfile,
    ) -> Result<CommandEnvelope, ProtocolError> {
        self.tracker.authorize(CommandKind::Startup)?;
        let envelope = CommandCodec::encode_startup(profile);
        self.write(&envelope).await?;
        self.tracker.on_command_sent(CommandKind::Startup);
        info!(frame = envelope.frame(), "startup configuration sent");
        Ok(envelope)
    }

    /// Sends an `Open` command, clamping the percentage into `[0,100]`.
    ///
    /// # Errors
    ///
    /// Returns a state error outside the operational phase, or a write error.
    #[instrument(skip_all, fields(percent))]
    pub async fn submit_open(&mut self, percent: i64) -> Result<OpenOutcome, ProtocolError> {
        self.tracker.authorize(CommandKind::Open)?;
        let applied = CommandCodec::clamp_percent(percent);
        if i64::from(applied) != percent {
            warn!(requested = percent, applied, "open percentage clamped");
        }
        let envelope = CommandCodec::encode_open(percent);
        self.write(&envelope).await?;
        self.tracker.on_command_sent(CommandKind::Open);
        info!(frame = envelope.frame(), "open command sent");
        Ok(OpenOutcome {
            envelope,
            requested: percent,
            applied,
        })
    }

    /// Tears down the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport disconnect fails.
    pub async fn disconnect(mut self) -> Result<(), ProtocolError> {
        self.tracker.on_disconnected();
        self.session.close().await?;
        Ok(())
    }

    async fn write(&mut self, envelope: &CommandEnvelope) -> Result<(), InteractionError> {
        let written = self
            .session
            .write_endpoint(
                EndpointId::UartCharacteristic,
                envelope.payload(),
                WriteMode::WithResponse,
            )
            .await;
        if let Err(error) = written {
            self.tracker.on_write_failure();
            warn!(kind = %envelope.kind(), "command write failed, session reset to idle");
            return Err(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn tracker_in(state: SessionState) -> SessionTracker {
        let mut tracker = SessionTracker::new();
        match state {
            SessionState::Idle => {}
            SessionState::AwaitingReady => tracker.on_connected(),
            SessionState::Configuring => {
                tracker.on_connected();
                let _ = tracker.on_ack(AckToken::DeviceReady);
                tracker.on_ready_sent();
            }
            SessionState::Operational => {
                tracker.on_connected();
                let _ = tracker.on_ack(AckToken::DeviceReady);
                tracker.on_ready_sent();
                tracker.on_command_sent(CommandKind::Startup);
            }
        }
        tracker
    }

    #[test]
    fn happy_path_walks_all_phases() {
        let mut tracker = SessionTracker::new();
        assert_eq!(SessionState::Idle, tracker.state());

        tracker.on_connected();
        assert_eq!(SessionState::AwaitingReady, tracker.state());

        assert_eq!(
            AckDisposition::SendReady,
            tracker.on_ack(AckToken::DeviceReady)
        );
        tracker.on_ready_sent();
        assert_eq!(SessionState::Configuring, tracker.state());

        tracker.on_command_sent(CommandKind::Startup);
        assert_eq!(SessionState::Operational, tracker.state());

        tracker.on_command_sent(CommandKind::Open);
        assert_eq!(SessionState::Operational, tracker.state());
    }

    #[test]
    fn ready_reply_happens_at_most_once_per_connection() {
        let mut tracker = tracker_in(SessionState::AwaitingReady);
        assert_eq!(
            AckDisposition::SendReady,
            tracker.on_ack(AckToken::DeviceReady)
        );
        assert_eq!(
            AckDisposition::Ignored,
            tracker.on_ack(AckToken::DeviceReady)
        );
    }

    #[rstest]
    #[case(SessionState::Configuring)]
    #[case(SessionState::Operational)]
    fn late_ready_tokens_are_ignored(#[case] state: SessionState) {
        let mut tracker = tracker_in(state);
        assert_eq!(
            AckDisposition::Ignored,
            tracker.on_ack(AckToken::DeviceReady)
        );
    }

    #[rstest]
    #[case(CommandKind::Startup, SessionState::Idle)]
    #[case(CommandKind::Startup, SessionState::AwaitingReady)]
    #[case(CommandKind::Startup, SessionState::Operational)]
    #[case(CommandKind::Open, SessionState::Idle)]
    #[case(CommandKind::Open, SessionState::AwaitingReady)]
    #[case(CommandKind::Open, SessionState::Configuring)]
    fn commands_are_rejected_outside_their_phase(
        #[case] kind: CommandKind,
        #[case] state: SessionState,
    ) {
        let tracker = tracker_in(state);
        assert_matches!(
            tracker.authorize(kind),
            Err(SessionStateError::CommandNotPermitted { .. })
        );
    }

    #[rstest]
    #[case(CommandKind::Startup, SessionState::Configuring)]
    #[case(CommandKind::Open, SessionState::Operational)]
    fn commands_are_permitted_in_their_phase(
        #[case] kind: CommandKind,
        #[case] state: SessionState,
    ) {
        let tracker = tracker_in(state);
        assert_matches!(tracker.authorize(kind), Ok(()));
    }

    #[test]
    fn write_failure_resets_phase_but_keeps_handshake_guard() {
        let mut tracker = tracker_in(SessionState::Configuring);
        tracker.on_write_failure();
        assert_eq!(SessionState::Idle, tracker.state());

        // Reconnecting on the same power cycle must not repeat the handshake.
        tracker.on_connected();
        assert_eq!(
            AckDisposition::Ignored,
            tracker.on_ack(AckToken::DeviceReady)
        );
    }

    #[rstest]
    #[case(SessionState::AwaitingReady)]
    #[case(SessionState::Configuring)]
    #[case(SessionState::Operational)]
    fn disconnect_resets_everything(#[case] state: SessionState) {
        let mut tracker = tracker_in(state);
        tracker.on_disconnected();
        assert_eq!(SessionState::Idle, tracker.state());

        tracker.on_connected();
        assert_eq!(
            AckDisposition::SendReady,
            tracker.on_ack(AckToken::DeviceReady)
        );
    }
}
