use std::fmt::{self, Display, Formatter};

use crate::hw::{FoundDevice, ListenStopReason, ListenSummary};
use crate::protocol::{self, EndpointId};
use crate::utils::format_hex;

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders the listen-session readiness output.
pub(crate) struct ListenReadyView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> ListenReadyView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for ListenReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let endpoint = protocol::endpoint_metadata(EndpointId::UartCharacteristic);
        let session_table = Table::key_value(
            self.painter,
            vec![(
                "listening_on",
                format!(
                    "{} {}",
                    self.painter.value(endpoint.uuid()),
                    self.painter.muted(format!("({})", endpoint.name()))
                ),
            )],
        );

        let device = DeviceView::new(self.device, self.painter);

        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{device}")?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Listen session:"))?;
        write!(f, "\n{session_table}")
    }
}

/// Renders a single notification line.
pub(crate) struct ListenNotificationView<'a> {
    index: usize,
    payload: &'a [u8],
    event_label: Option<String>,
    painter: &'a Painter,
}

impl<'a> ListenNotificationView<'a> {
    pub(crate) fn new(
        index: usize,
        payload: &'a [u8],
        event_label: Option<String>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            index,
            payload,
            event_label,
            painter,
        }
    }
}

impl Display for ListenNotificationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        let event_label = self.event_label.as_deref().unwrap_or("notification");
        let raw_payload = self
            .painter
            .muted(format!("raw={}", format_hex(self.payload)));
        write!(
            f,
            "{index_label} {} {}",
            self.painter.value(event_label),
            raw_payload
        )
    }
}

/// Renders the listen session summary.
pub(crate) struct ListenSummaryView<'a> {
    summary: &'a ListenSummary,
    painter: &'a Painter,
}

impl<'a> ListenSummaryView<'a> {
    pub(crate) fn new(summary: &'a ListenSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for ListenSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stop_reason = match self.summary.stop_reason() {
            ListenStopReason::ReachedLimit(_) => {
                self.painter.success(self.summary.stop_reason().to_string())
            }
            ListenStopReason::Interrupted
            | ListenStopReason::Disconnected
            | ListenStopReason::NotificationStreamClosed => {
                self.painter.warning(self.summary.stop_reason().to_string())
            }
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            stop_reason,
            self.painter.value(format!(
                "- received {} notification(s)",
                self.summary.received_notifications()
            ))
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn device() -> FoundDevice {
        FoundDevice::new(
            "hci0".into(),
            "AA:BB:CC".into(),
            Some("DSD TECH".into()),
            Some(-43),
        )
    }

    #[test]
    fn listen_ready_names_the_uart_endpoint() {
        let dev = device();
        let painter = Painter::new(false);
        let rendered = ListenReadyView::new(&dev, &painter).to_string();

        assert!(rendered.contains("Connected device:"));
        assert!(rendered.contains("0000ffe1-0000-1000-8000-00805f9b34fb"));
    }

    #[test]
    fn notification_formats_index_and_hex() {
        let painter = Painter::new(false);
        let payload = [0x52];
        let view = ListenNotificationView::new(42, &payload, None, &painter);
        assert_eq!("[0042] notification raw=52", view.to_string());
    }

    #[test]
    fn notification_formats_with_event_label() {
        let painter = Painter::new(false);
        let payload = [0x52];
        let view =
            ListenNotificationView::new(1, &payload, Some("device_ready".to_string()), &painter);
        assert_eq!("[0001] device_ready raw=52", view.to_string());
    }

    #[rstest]
    #[case::reached_limit(ListenStopReason::ReachedLimit(10), "reached max notifications (10)")]
    #[case::interrupted(ListenStopReason::Interrupted, "interrupted by user")]
    #[case::disconnected(ListenStopReason::Disconnected, "device disconnected")]
    fn summary_renders_stop_reason(
        #[case] stop_reason: ListenStopReason,
        #[case] expected: &str,
    ) {
        let summary = ListenSummary::new(device(), 5, stop_reason);
        let painter = Painter::new(false);
        let rendered = ListenSummaryView::new(&summary, &painter).to_string();

        assert!(rendered.contains(expected));
        assert!(rendered.contains("received 5 notification(s)"));
    }
}
