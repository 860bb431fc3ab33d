use std::time::Duration;

use async_trait::async_trait;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackendConfig, FakeHardwareClient};
use super::model::{FoundDevice, InspectReport, NotificationRunSummary};
use crate::error::InteractionError;
use crate::protocol::EndpointId;

/// Write strategy for characteristic writes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    /// Acknowledged GATT write.
    WithResponse,
    /// Unacknowledged GATT write.
    WithoutResponse,
}

/// Creates a client backed by the system's BLE stack.
///
/// # Errors
///
/// Returns an error when no adapter is available or the platform refuses
/// bluetooth access.
pub async fn real_hardware_client() -> Result<RealHardwareClient, InteractionError> {
    RealHardwareClient::new().await
}

/// Creates a client backed by in-memory fixtures.
#[must_use]
pub fn fake_hardware_client(config: FakeBackendConfig) -> FakeHardwareClient {
    FakeHardwareClient::new(config)
}

/// Entry point into a BLE backend: scans for and connects to the blind.
#[async_trait(?Send)]
pub trait HardwareClient {
    /// Scans until a peripheral advertising exactly `device_name` appears,
    /// connects to it, discovers its GATT table and subscribes to the
    /// UART-bridge characteristic.
    async fn connect_first_device(
        self: Box<Self>,
        device_name: &str,
    ) -> Result<DeviceSession, InteractionError>;
}

/// Backend-specific operations on one connected, subscribed peripheral.
#[async_trait(?Send)]
pub(crate) trait ConnectedBleSession: std::fmt::Debug {
    /// Returns details for the connected device.
    fn device(&self) -> &FoundDevice;

    /// Returns the GATT inventory captured at connect time.
    fn inspect_report(&self) -> InspectReport;

    /// Writes a payload to an endpoint.
    async fn write_endpoint(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    /// Waits up to `wait` for the next notification from an endpoint.
    ///
    /// Returns `Ok(None)` when the window elapses without a payload.
    async fn next_notification(
        &mut self,
        endpoint: EndpointId,
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, InteractionError>;

    /// Streams notifications to a callback until a stop condition is met.
    async fn run_notifications(
        &mut self,
        endpoint: EndpointId,
        max_notifications: Option<usize>,
        on_notification: &mut dyn for<'a> FnMut(usize, &'a [u8]),
    ) -> Result<NotificationRunSummary, InteractionError>;

    /// Tears down the connection.
    async fn close(self: Box<Self>) -> Result<(), InteractionError>;
}

/// A connected, subscribed session with the blind controller.
///
/// Wraps the backend-specific session so command-flow code is written once
/// against this type and exercised by both the real and fake backends.
#[derive(Debug)]
pub struct DeviceSession {
    inner: Box<dyn ConnectedBleSession>,
}

impl DeviceSession {
    pub(crate) fn new(inner: Box<dyn ConnectedBleSession>) -> Self {
        Self { inner }
    }

    /// Returns details for the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        self.inner.device()
    }

    /// Returns the GATT inventory captured at connect time.
    #[must_use]
    pub fn inspect_report(&self) -> InspectReport {
        self.inner.inspect_report()
    }

    /// Writes a payload to an endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is missing or the write fails.
    pub async fn write_endpoint(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.inner.write_endpoint(endpoint, payload, mode).await
    }

    /// Waits up to `wait` for the next notification from an endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the notification stream fails.
    pub async fn next_notification(
        &mut self,
        endpoint: EndpointId,
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, InteractionError> {
        self.inner.next_notification(endpoint, wait).await
    }

    /// Streams notifications to a callback until interrupted, disconnected or
    /// the optional count limit is reached.
    ///
    /// # Errors
    ///
    /// Returns an error when receiving notifications or handling an interrupt
    /// fails.
    pub async fn run_notifications(
        &mut self,
        endpoint: EndpointId,
        max_notifications: Option<usize>,
        mut on_notification: impl FnMut(usize, &[u8]),
    ) -> Result<NotificationRunSummary, InteractionError> {
        self.inner
            .run_notifications(endpoint, max_notifications, &mut on_notification)
            .await
    }

    /// Tears down the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport disconnect fails.
    pub async fn close(self) -> Result<(), InteractionError> {
        self.inner.close().await
    }
}

/// Real client over the system BLE stack.
#[derive(Debug)]
pub struct RealHardwareClient {
    backend: BtleplugBackend,
}

impl RealHardwareClient {
    async fn new() -> Result<Self, InteractionError> {
        Ok(Self {
            backend: BtleplugBackend::new().await?,
        })
    }
}

#[async_trait(?Send)]
impl HardwareClient for RealHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        device_name: &str,
    ) -> Result<DeviceSession, InteractionError> {
        let session = self.backend.connect_first_matching_device(device_name).await?;
        Ok(DeviceSession::new(Box::new(session)))
    }
}
