use std::time::Duration;

use derive_more::From;
use thiserror::Error;

use crate::flow::SessionStateError;
use crate::profile::ProfileError;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("the platform refused bluetooth access; grant the permission and retry")]
    PermissionDenied { source: btleplug::Error },
    #[error("device scan failed before a matching peripheral appeared")]
    Scan { source: btleplug::Error },
    #[error("failed to connect to device `{device_id}`")]
    Connection {
        device_id: String,
        source: btleplug::Error,
    },
    #[error("service discovery failed on the connected device")]
    Discovery { source: btleplug::Error },
    #[error("failed to subscribe to readiness notifications")]
    Subscribe { source: btleplug::Error },
    #[error("characteristic write failed")]
    Write { source: btleplug::Error },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on the connected device",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { endpoint: EndpointId },
    #[error("the device did not acknowledge readiness within {waited:?}")]
    ReadyTimeout { waited: Duration },
    #[error("no device named `{name}` was found in the fake fixture")]
    NoMatchingFixtureDevice { name: String },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("notification payloads must be hexadecimal bytes")]
    InvalidHexPayload(#[from] hex::FromHexError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(InteractionError, Box<InteractionError>)]
    Interaction(Box<InteractionError>),
    #[error(transparent)]
    #[from(SessionStateError, Box<SessionStateError>)]
    State(Box<SessionStateError>),
    #[error(transparent)]
    #[from(ProfileError, Box<ProfileError>)]
    Profile(Box<ProfileError>),
}
