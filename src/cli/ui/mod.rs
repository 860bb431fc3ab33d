mod device_view;
mod inspect_view;
mod listen_view;
mod painter;
mod profile_view;
mod table;

pub(crate) use self::device_view::DeviceView;
pub(crate) use self::inspect_view::InspectReportView;
pub(crate) use self::listen_view::{ListenNotificationView, ListenReadyView, ListenSummaryView};
pub(crate) use self::painter::Painter;
pub(crate) use self::profile_view::ProfileView;
