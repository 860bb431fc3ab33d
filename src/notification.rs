use tracing::trace;

/// Acknowledgement tokens emitted by the blind firmware.
///
/// The firmware signals over the same characteristic it accepts writes on,
/// using single-character ASCII payloads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckToken {
    /// The device finished starting up and is ready for the handshake.
    DeviceReady,
}

/// Decodes raw notification payloads into typed acknowledgement tokens.
pub struct NotificationHandler;

impl NotificationHandler {
    /// Decodes one notification payload.
    ///
    /// Only the single ASCII character `R` is recognised; every other
    /// payload is ignored rather than treated as an error, since the module
    /// forwards arbitrary UART traffic.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<AckToken> {
        if payload == b"R" {
            return Some(AckToken::DeviceReady);
        }

        trace!(payload_len = payload.len(), "ignoring unrecognised notification payload");
        None
    }
}
