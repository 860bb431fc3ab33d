use std::collections::HashMap;
use std::sync::LazyLock;

use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Terminator appended to every outbound command frame. The blind firmware
/// has no length prefix or checksum; frame boundaries rely on this sentinel.
pub const FRAME_SENTINEL: &str = ":E";

/// Advertised local name of the blind controller module.
pub const BLIND_LOCAL_NAME: &str = "DSD TECH";

/// Known protocol endpoints on the HC/DSD UART-bridge GATT profile.
///
/// The module exposes a single service with a single characteristic that
/// carries both outbound command writes and inbound acknowledgement
/// notifications.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, SerializeDisplay)]
pub enum EndpointId {
    /// UART-bridge control service.
    #[strum(to_string = "uart_service")]
    UartService,
    /// Characteristic used for command writes and readiness notifications.
    #[strum(to_string = "uart_characteristic")]
    UartCharacteristic,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    /// GATT service endpoint.
    #[strum(to_string = "service")]
    Service,
    /// GATT characteristic endpoint.
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    /// Endpoint kind.
    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

/// Endpoint metadata keyed by typed endpoint IDs.
pub(crate) static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> =
    LazyLock::new(|| {
        EndpointId::iter()
            .map(|endpoint| (endpoint, metadata_for(endpoint)))
            .collect()
    });

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Returns all known endpoints.
pub(crate) fn known_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter()
}

/// Creates a presence map initialised with all known endpoints set to `false`.
pub(crate) fn empty_presence_map() -> HashMap<EndpointId, bool> {
    known_endpoints()
        .map(|endpoint| (endpoint, false))
        .collect()
}

/// Resolves the endpoint a discovered UUID belongs to, if any.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    known_endpoints().find(|endpoint| endpoint_metadata(*endpoint).uuid().eq_ignore_ascii_case(uuid))
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::UartService => EndpointMetadata {
            name: "UART bridge service",
            uuid: "0000ffe0-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Service,
        },
        EndpointId::UartCharacteristic => EndpointMetadata {
            name: "UART bridge data",
            uuid: "0000ffe1-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Characteristic,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoint_metadata_contains_expected_uuids() {
        let service = endpoint_metadata(EndpointId::UartService);
        assert_eq!("0000ffe0-0000-1000-8000-00805f9b34fb", service.uuid());
        assert_eq!(EndpointKind::Service, service.kind());

        let characteristic = endpoint_metadata(EndpointId::UartCharacteristic);
        assert_eq!(
            "0000ffe1-0000-1000-8000-00805f9b34fb",
            characteristic.uuid()
        );
        assert_eq!(EndpointKind::Characteristic, characteristic.kind());
    }

    #[test]
    fn endpoint_for_uuid_resolves_case_insensitively() {
        assert_eq!(
            Some(EndpointId::UartCharacteristic),
            endpoint_for_uuid("0000FFE1-0000-1000-8000-00805F9B34FB")
        );
        assert_eq!(None, endpoint_for_uuid("0000dead-0000-1000-8000-00805f9b34fb"));
    }
}
