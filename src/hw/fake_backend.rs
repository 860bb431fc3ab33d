use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::sleep;
use tracing::trace;

use super::hardware::{ConnectedBleSession, DeviceSession, HardwareClient, WriteMode};
use super::model::{
    CharacteristicInfo, EndpointPresence, FoundDevice, InspectReport, ListenStopReason,
    NotificationRunSummary, ServiceInfo,
};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{self, EndpointId};

// The firmware's single ready token, `R`.
const DEFAULT_NOTIFICATIONS: [[u8; 1]; 1] = [[0x52]];

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    discovery_delay: Duration,
    /// Fail the Nth characteristic write (1-based) with a transport error.
    write_failure: Option<usize>,
}

/// Fake client used in tests and non-hardware environments.
#[derive(Debug)]
pub struct FakeHardwareClient {
    devices: Vec<FoundDevice>,
    notifications: Vec<Vec<u8>>,
    discovery_delay: Duration,
    write_failure: Option<usize>,
}

impl FakeHardwareClient {
    /// Creates a fake client from explicit settings.
    #[must_use]
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let notifications = config.notifications.map_or_else(
            || DEFAULT_NOTIFICATIONS.map(Vec::from).to_vec(),
            Into::into,
        );

        Self {
            devices: config.scan_fixture.into(),
            notifications,
            discovery_delay: config.discovery_delay,
            write_failure: config.write_failure,
        }
    }
}

#[async_trait(?Send)]
impl HardwareClient for FakeHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        device_name: &str,
    ) -> Result<DeviceSession, InteractionError> {
        let Self {
            devices,
            notifications,
            discovery_delay,
            write_failure,
        } = *self;

        let device = first_matching_device(devices, discovery_delay, device_name).await?;
        let session = FakeDeviceSession {
            device,
            services: default_services(),
            pending: notifications.into(),
            write_failure,
            writes_seen: 0,
        };
        Ok(DeviceSession::new(Box::new(session)))
    }
}

/// Active fake session emitting fixture notifications.
#[derive(Debug)]
struct FakeDeviceSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    pending: VecDeque<Vec<u8>>,
    write_failure: Option<usize>,
    writes_seen: usize,
}

impl FakeDeviceSession {
    fn ensure_known_endpoint(&self, endpoint: EndpointId) -> Result<(), InteractionError> {
        match endpoint {
            EndpointId::UartCharacteristic => Ok(()),
            EndpointId::UartService => Err(InteractionError::MissingEndpoint { endpoint }),
        }
    }
}

#[async_trait(?Send)]
impl ConnectedBleSession for FakeDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn inspect_report(&self) -> InspectReport {
        InspectReport::new(
            self.device.clone(),
            self.services.clone(),
            endpoint_presence(&self.services),
        )
    }

    async fn write_endpoint(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        _mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.ensure_known_endpoint(endpoint)?;
        self.writes_seen += 1;
        if self.write_failure == Some(self.writes_seen) {
            return Err(InteractionError::Write {
                source: btleplug::Error::RuntimeError("injected write failure".to_string()),
            });
        }
        trace!(payload_len = payload.len(), "fake backend accepted write");
        Ok(())
    }

    async fn next_notification(
        &mut self,
        endpoint: EndpointId,
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, InteractionError> {
        self.ensure_known_endpoint(endpoint)?;
        match self.pending.pop_front() {
            Some(payload) => Ok(Some(payload)),
            None => {
                // Silent stream; behave like a timed-out wait.
                sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn run_notifications(
        &mut self,
        endpoint: EndpointId,
        max_notifications: Option<usize>,
        on_notification: &mut dyn for<'a> FnMut(usize, &'a [u8]),
    ) -> Result<NotificationRunSummary, InteractionError> {
        self.ensure_known_endpoint(endpoint)?;
        if let Some(limit) = max_notifications
            && limit == 0
        {
            return Ok(NotificationRunSummary::new(
                0,
                ListenStopReason::ReachedLimit(0),
            ));
        }

        let mut received = 0usize;
        let mut stop_reason = ListenStopReason::NotificationStreamClosed;
        while let Some(payload) = self.pending.pop_front() {
            received += 1;
            on_notification(received, &payload);

            if let Some(limit) = max_notifications
                && received >= limit
            {
                stop_reason = ListenStopReason::ReachedLimit(limit);
                break;
            }
        }

        Ok(NotificationRunSummary::new(received, stop_reason))
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        Ok(())
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

async fn first_matching_device(
    devices: Vec<FoundDevice>,
    discovery_delay: Duration,
    device_name: &str,
) -> Result<FoundDevice, InteractionError> {
    if !discovery_delay.is_zero() {
        sleep(discovery_delay).await;
    }

    devices
        .into_iter()
        .find(|device| device.local_name_is(device_name))
        .ok_or_else(|| InteractionError::NoMatchingFixtureDevice {
            name: device_name.to_string(),
        })
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields[0].is_empty() || fields[1].is_empty() || fields[2].is_empty() || fields[3].is_empty()
    {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].to_string())
    };
    let rssi = if fields[3] == "-" {
        None
    } else {
        Some(fields[3].parse::<i16>()?)
    };

    Ok(FoundDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
    ))
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(',').map(parse_hex).collect()
}

fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(cleaned)?)
}

fn default_services() -> Vec<ServiceInfo> {
    let service = protocol::endpoint_metadata(EndpointId::UartService);
    let characteristic = protocol::endpoint_metadata(EndpointId::UartCharacteristic);

    vec![ServiceInfo::new(
        service.uuid().to_string(),
        true,
        vec![CharacteristicInfo::new(
            characteristic.uuid().to_string(),
            vec![
                "write".to_string(),
                "write_without_response".to_string(),
                "notify".to_string(),
            ],
        )],
    )]
}

fn endpoint_presence(services: &[ServiceInfo]) -> EndpointPresence {
    let mut presence_by_endpoint = protocol::empty_presence_map();

    for service in services {
        if let Some(endpoint) = protocol::endpoint_for_uuid(service.uuid()) {
            presence_by_endpoint.insert(endpoint, true);
        }
        for characteristic in service.characteristics() {
            if let Some(endpoint) = protocol::endpoint_for_uuid(characteristic.uuid()) {
                presence_by_endpoint.insert(endpoint, true);
            }
        }
    }

    EndpointPresence::new(presence_by_endpoint)
}
