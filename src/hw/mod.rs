mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;

pub use self::fake_backend::{FakeBackendConfig, FakeHardwareClient, NotificationPayloads, ScanFixture};
pub use self::hardware::{
    DeviceSession, HardwareClient, RealHardwareClient, WriteMode, fake_hardware_client,
    real_hardware_client,
};
pub use self::model::{
    CharacteristicInfo, EndpointPresence, FoundDevice, InspectReport, ListenStopReason,
    ListenSummary, NotificationRunSummary, ServiceInfo,
};
