use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::timeout;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, instrument, trace};

use super::hardware::{ConnectedBleSession, WriteMode};
use super::model::{
    CharacteristicInfo, EndpointPresence, FoundDevice, InspectReport, ListenStopReason,
    NotificationRunSummary, ServiceInfo,
};
use crate::error::InteractionError;
use crate::protocol::{self, EndpointId};

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Waits on adapter events until the first matching peripheral is
    /// advertised, then connects to it.
    ///
    /// The advertisement filter is a strict name-equality match; the first
    /// matching event wins, so a peripheral re-advertising while the
    /// connection is being set up cannot trigger a second connect.
    #[instrument(skip(self), level = "debug", fields(name = device_name))]
    async fn find_and_connect_first_matching(
        &self,
        device_name: &str,
    ) -> Result<ConnectedPeripheral, InteractionError> {
        let adapters = self.adapters().await?;
        info!(
            adapter_count = adapters.len(),
            "starting event-driven BLE scan"
        );

        let mut events = StreamMap::new();
        for (index, handle) in adapters.iter().enumerate() {
            let stream = handle.adapter.events().await.map_err(scan_error)?;
            events.insert(index, stream);
        }
        for handle in &adapters {
            handle
                .adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(scan_error)?;
        }

        let (handle, peripheral, local_name, rssi) = loop {
            let Some((index, event)) = events.next().await else {
                return Err(scan_error(btleplug::Error::DeviceNotFound));
            };
            let peripheral_id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };

            let handle = &adapters[index];
            let peripheral = match handle.adapter.peripheral(&peripheral_id).await {
                Ok(peripheral) => peripheral,
                Err(error) => {
                    trace!(?error, "advertised peripheral vanished before lookup");
                    continue;
                }
            };
            let Some(properties) = peripheral.properties().await.map_err(scan_error)? else {
                continue;
            };
            if !matches_local_name(properties.local_name.as_deref(), device_name) {
                continue;
            }

            break (handle, peripheral, properties.local_name, properties.rssi);
        };

        for handle in &adapters {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, "failed to stop adapter scan cleanly");
            }
        }

        let device_id = peripheral.id().to_string();
        let connection_error = |source| InteractionError::Connection {
            device_id: device_id.clone(),
            source,
        };
        if !peripheral.is_connected().await.map_err(connection_error)? {
            peripheral.connect().await.map_err(connection_error)?;
        }
        peripheral
            .discover_services()
            .await
            .map_err(|source| InteractionError::Discovery { source })?;

        let device = FoundDevice::new(handle.name.clone(), device_id, local_name, rssi);
        info!(device_id = device.device_id(), "connected to matching peripheral");
        Ok(ConnectedPeripheral {
            adapter: handle.adapter.clone(),
            peripheral,
            device,
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    /// Connects to the first matching peripheral and prepares a session object.
    #[instrument(skip(self), level = "debug", fields(name = device_name))]
    pub(crate) async fn connect_first_matching_device(
        self,
        device_name: &str,
    ) -> Result<RealDeviceSession, InteractionError> {
        let connected = self.find_and_connect_first_matching(device_name).await?;
        let (services, characteristics_by_uuid) =
            collect_services_and_characteristics(&connected.peripheral);
        let endpoint_presence = endpoint_presence_from_services(&services);

        let uart_uuid = protocol::endpoint_metadata(EndpointId::UartCharacteristic).uuid();
        let Some(uart_characteristic) = characteristics_by_uuid.get(uart_uuid).cloned() else {
            if let Err(error) = connected.peripheral.disconnect().await {
                debug!(?error, "failed to disconnect after endpoint validation error");
            }
            return Err(InteractionError::MissingEndpoint {
                endpoint: EndpointId::UartCharacteristic,
            });
        };

        connected
            .peripheral
            .subscribe(&uart_characteristic)
            .await
            .map_err(|source| InteractionError::Subscribe { source })?;
        debug!(uuid = uart_uuid, "subscribed to UART characteristic");

        Ok(RealDeviceSession {
            device: connected.device,
            services,
            endpoint_presence,
            uart_characteristic,
            adapter: connected.adapter,
            peripheral: connected.peripheral,
        })
    }
}

fn scan_error(source: btleplug::Error) -> InteractionError {
    match source {
        source @ btleplug::Error::PermissionDenied => {
            InteractionError::PermissionDenied { source }
        }
        source => InteractionError::Scan { source },
    }
}

fn matches_local_name(local_name: Option<&str>, device_name: &str) -> bool {
    if device_name.is_empty() {
        return true;
    }

    local_name == Some(device_name)
}

/// Active session bound to a real peripheral.
#[derive(Debug)]
pub(crate) struct RealDeviceSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    endpoint_presence: EndpointPresence,
    uart_characteristic: Characteristic,
    adapter: Adapter,
    peripheral: Peripheral,
}

impl RealDeviceSession {
    fn characteristic_for(
        &self,
        endpoint: EndpointId,
    ) -> Result<&Characteristic, InteractionError> {
        match endpoint {
            EndpointId::UartCharacteristic => Ok(&self.uart_characteristic),
            EndpointId::UartService => Err(InteractionError::MissingEndpoint { endpoint }),
        }
    }
}

#[async_trait(?Send)]
impl ConnectedBleSession for RealDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn inspect_report(&self) -> InspectReport {
        InspectReport::new(
            self.device.clone(),
            self.services.clone(),
            self.endpoint_presence.clone(),
        )
    }

    #[instrument(skip(self, payload), level = "trace", fields(?endpoint, ?mode, payload_len = payload.len()))]
    async fn write_endpoint(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await
            .map_err(|source| InteractionError::Write { source })?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace", fields(?endpoint, ?wait))]
    async fn next_notification(
        &mut self,
        endpoint: EndpointId,
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, InteractionError> {
        let expected_uuid = self.characteristic_for(endpoint)?.uuid;
        let mut notifications = self.peripheral.notifications().await?;
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match timeout(remaining, notifications.next()).await {
                Ok(Some(notification)) => {
                    if notification.uuid != expected_uuid {
                        continue;
                    }
                    return Ok(Some(notification.value));
                }
                Ok(None) => return Ok(None),
                Err(_elapsed) => return Ok(None),
            }
        }
    }

    #[instrument(
        skip(self, on_notification),
        level = "debug",
        fields(?endpoint, ?max_notifications)
    )]
    async fn run_notifications(
        &mut self,
        endpoint: EndpointId,
        max_notifications: Option<usize>,
        on_notification: &mut dyn for<'a> FnMut(usize, &'a [u8]),
    ) -> Result<NotificationRunSummary, InteractionError> {
        let expected_uuid = self.characteristic_for(endpoint)?.uuid;
        let mut notifications = self.peripheral.notifications().await?;
        let mut adapter_events = self.adapter.events().await?;
        let peripheral_id = self.peripheral.id();
        let mut received = 0usize;

        let stop_reason = loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.map_err(|source| InteractionError::CtrlC { source })?;
                    break ListenStopReason::Interrupted;
                }
                maybe_event = adapter_events.next() => {
                    if let Some(CentralEvent::DeviceDisconnected(id)) = maybe_event
                        && id == peripheral_id
                    {
                        break ListenStopReason::Disconnected;
                    }
                }
                maybe_notification = notifications.next() => {
                    match maybe_notification {
                        Some(notification) => {
                            if notification.uuid != expected_uuid {
                                continue;
                            }

                            received += 1;
                            on_notification(received, &notification.value);
                            if let Some(limit) = max_notifications && received >= limit {
                                break ListenStopReason::ReachedLimit(limit);
                            }
                        }
                        None => {
                            break ListenStopReason::NotificationStreamClosed;
                        }
                    }
                }
            }
        };

        Ok(NotificationRunSummary::new(received, stop_reason))
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        if let Err(error) = self.peripheral.unsubscribe(&self.uart_characteristic).await {
            debug!(?error, "failed to unsubscribe cleanly before disconnect");
        }
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

#[derive(Debug)]
struct ConnectedPeripheral {
    adapter: Adapter,
    peripheral: Peripheral,
    device: FoundDevice,
}

fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<String, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_uuid = HashMap::new();

    for service in peripheral.services() {
        let service_uuid = service.uuid.to_string().to_lowercase();

        let mut characteristics = Vec::new();
        for characteristic in &service.characteristics {
            let characteristic_uuid = characteristic.uuid.to_string().to_lowercase();
            characteristics_by_uuid
                .entry(characteristic_uuid.clone())
                .or_insert_with(|| characteristic.clone());

            characteristics.push(CharacteristicInfo::new(
                characteristic_uuid,
                property_labels(characteristic.properties),
            ));
        }
        characteristics.sort_by(|left, right| left.uuid().cmp(right.uuid()));

        services.push(ServiceInfo::new(
            service_uuid,
            service.primary,
            characteristics,
        ));
    }
    services.sort_by(|left, right| left.uuid().cmp(right.uuid()));

    (services, characteristics_by_uuid)
}

fn endpoint_presence_from_services(services: &[ServiceInfo]) -> EndpointPresence {
    let mut by_endpoint = protocol::empty_presence_map();
    for service in services {
        if let Some(endpoint) = protocol::endpoint_for_uuid(service.uuid()) {
            by_endpoint.insert(endpoint, true);
        }
        for characteristic in service.characteristics() {
            if let Some(endpoint) = protocol::endpoint_for_uuid(characteristic.uuid()) {
                by_endpoint.insert(endpoint, true);
            }
        }
    }
    EndpointPresence::new(by_endpoint)
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("DSD TECH"), "DSD TECH", true)]
    #[case(Some("DSD TECH 2"), "DSD TECH", false)]
    #[case(Some("DSD"), "DSD TECH", false)]
    #[case(Some("dsd tech"), "DSD TECH", false)]
    #[case(None, "DSD TECH", false)]
    #[case(None, "", true)]
    #[case(Some("anything"), "", true)]
    fn matches_local_name_requires_exact_equality(
        #[case] local_name: Option<&str>,
        #[case] device_name: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, matches_local_name(local_name, device_name));
    }

    #[test]
    fn endpoint_presence_marks_known_uuids() {
        let services = vec![ServiceInfo::new(
            "0000ffe0-0000-1000-8000-00805f9b34fb".to_string(),
            true,
            vec![CharacteristicInfo::new(
                "0000ffe1-0000-1000-8000-00805f9b34fb".to_string(),
                vec!["write".to_string(), "notify".to_string()],
            )],
        )];

        let presence = endpoint_presence_from_services(&services);
        assert!(presence.is_present(EndpointId::UartService));
        assert!(presence.is_present(EndpointId::UartCharacteristic));
    }

    #[test]
    fn endpoint_presence_is_false_for_unrelated_services() {
        let services = vec![ServiceInfo::new(
            "0000180a-0000-1000-8000-00805f9b34fb".to_string(),
            true,
            Vec::new(),
        )];

        let presence = endpoint_presence_from_services(&services);
        assert!(!presence.is_present(EndpointId::UartService));
        assert!(!presence.is_present(EndpointId::UartCharacteristic));
    }

    #[test]
    fn property_labels_falls_back_to_none() {
        assert_eq!(vec!["none".to_string()], property_labels(CharPropFlags::empty()));
    }
}
