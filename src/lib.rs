mod app;
mod cli;
mod codec;
mod error;
mod flow;
mod hw;
mod notification;
mod profile;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    SessionHandler, fake_hardware_client, real_hardware_client, run,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use cli::{
    Args, Command, FakeArgs, ListenArgs, LogLevel, OpenArgs, OutputFormat, ProfileAction,
    ProfileArgs, ProfileSetArgs, SetupArgs,
};
pub use codec::{CommandCodec, CommandEnvelope, CommandKind};
pub use error::{FixtureError, InteractionError, ProtocolError};
pub use flow::{
    AckDisposition, OpenOutcome, SessionFlow, SessionState, SessionStateError, SessionTracker,
};
pub use hw::{
    CharacteristicInfo, DeviceSession, EndpointPresence, FakeBackendConfig, FakeHardwareClient,
    FoundDevice, HardwareClient, InspectReport, ListenStopReason, ListenSummary,
    NotificationPayloads, NotificationRunSummary, RealHardwareClient, ScanFixture, ServiceInfo,
    WriteMode,
};
pub use notification::{AckToken, NotificationHandler};
pub use profile::{ClockTime, ConfigurationProfile, ProfileError, ProfileStore};
pub use protocol::EndpointId;
pub use terminal::TerminalClient;
