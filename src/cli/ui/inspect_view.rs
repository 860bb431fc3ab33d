use std::fmt::{self, Display, Formatter};

use crate::hw::InspectReport;
use crate::protocol;

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders a full inspect report with device, endpoint, and service tables.
pub(crate) struct InspectReportView<'a> {
    report: &'a InspectReport,
    painter: &'a Painter,
}

impl<'a> InspectReportView<'a> {
    pub(crate) fn new(report: &'a InspectReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn endpoints_table(&self) -> Table {
        let rows = protocol::known_endpoints()
            .map(|endpoint| {
                let metadata = protocol::endpoint_metadata(endpoint);
                let present = if self.report.endpoint_presence().is_present(endpoint) {
                    self.painter.success("yes")
                } else {
                    self.painter.warning("no")
                };
                vec![
                    self.painter.value(metadata.name()),
                    metadata.kind().to_string(),
                    self.painter.muted(metadata.uuid()),
                    present,
                ]
            })
            .collect();
        Table::grid(["endpoint", "kind", "uuid", "present"], rows)
    }

    fn services_table(&self) -> Table {
        let mut rows = Vec::new();
        for service in self.report.services() {
            if service.characteristics().is_empty() {
                rows.push(vec![
                    self.painter.value(service.uuid()),
                    primary_label(service.is_primary()),
                    self.painter.muted("<no characteristics>"),
                    String::new(),
                ]);
                continue;
            }

            for characteristic in service.characteristics() {
                rows.push(vec![
                    self.painter.value(service.uuid()),
                    primary_label(service.is_primary()),
                    characteristic.uuid().to_string(),
                    characteristic.properties().join(","),
                ]);
            }
        }
        Table::grid(["service", "primary", "characteristic", "properties"], rows)
    }
}

fn primary_label(primary: bool) -> String {
    if primary { "yes" } else { "no" }.to_string()
}

impl Display for InspectReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let device = DeviceView::new(self.report.device(), self.painter);

        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{device}")?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Expected endpoints:"))?;
        write!(f, "\n{}", self.endpoints_table())?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Discovered services:"))?;
        write!(f, "\n{}", self.services_table())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::hw::{CharacteristicInfo, EndpointPresence, FoundDevice, ServiceInfo};
    use crate::protocol::EndpointId;

    use super::*;

    fn report(present: bool) -> InspectReport {
        let device = FoundDevice::new(
            "hci0".into(),
            "AA:BB:CC".into(),
            Some("DSD TECH".into()),
            Some(-43),
        );
        let services = vec![ServiceInfo::new(
            "0000ffe0-0000-1000-8000-00805f9b34fb".into(),
            true,
            vec![CharacteristicInfo::new(
                "0000ffe1-0000-1000-8000-00805f9b34fb".into(),
                vec!["write".into(), "notify".into()],
            )],
        )];
        let presence = EndpointPresence::new(HashMap::from([
            (EndpointId::UartService, present),
            (EndpointId::UartCharacteristic, present),
        ]));
        InspectReport::new(device, services, presence)
    }

    #[test]
    fn inspect_view_renders_all_sections() {
        let painter = Painter::new(false);
        let rendered = InspectReportView::new(&report(true), &painter).to_string();

        assert!(rendered.contains("Connected device:"));
        assert!(rendered.contains("Expected endpoints:"));
        assert!(rendered.contains("Discovered services:"));
        assert!(rendered.contains("0000ffe1-0000-1000-8000-00805f9b34fb"));
        assert!(rendered.contains("yes"));
    }

    #[test]
    fn inspect_view_flags_missing_endpoints() {
        let painter = Painter::new(false);
        let rendered = InspectReportView::new(&report(false), &painter).to_string();
        assert!(rendered.contains("no"));
    }
}
