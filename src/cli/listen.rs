use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::hw::{HardwareClient, ListenSummary};
use crate::notification::{AckToken, NotificationHandler};
use crate::protocol::EndpointId;
use crate::terminal::TerminalClient;
use crate::utils::format_hex;

use super::ui::{ListenNotificationView, ListenReadyView, ListenSummaryView, Painter};

/// Arguments for the `listen` command.
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many notification packets. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_notifications: Option<usize>,
}

impl ListenArgs {
    /// Creates listen arguments with an optional notification limit.
    #[must_use]
    pub fn new(max_notifications: Option<usize>) -> Self {
        Self { max_notifications }
    }

    /// Returns the optional notification limit.
    #[must_use]
    pub(crate) fn max_notifications(&self) -> Option<usize> {
        self.max_notifications
    }
}

#[derive(Serialize)]
struct NotificationLine<'a> {
    index: usize,
    payload_hex: String,
    event: Option<&'a str>,
}

#[derive(Serialize)]
struct ListenResult<'a> {
    summary: &'a ListenSummary,
}

/// Executes the `listen` command.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    device_name: &str,
    args: &ListenArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let mut session = crate::SessionHandler::new(client)
        .with_device_name(device_name)
        .connect_first()
        .await?;
    let device = session.device().clone();

    if let OutputFormat::Pretty = output_format {
        writeln!(out, "{}", ListenReadyView::new(&device, &painter))?;
    }
    let mut write_error: Option<io::Error> = None;

    let run_result = session
        .run_notifications(
            EndpointId::UartCharacteristic,
            args.max_notifications(),
            |index, payload| {
                if write_error.is_some() {
                    return;
                }
                let event_label = NotificationHandler::decode(payload).map(|token| match token {
                    AckToken::DeviceReady => "device_ready",
                });
                let rendered = match output_format {
                    OutputFormat::Pretty => {
                        let view = ListenNotificationView::new(
                            index,
                            payload,
                            event_label.map(str::to_string),
                            &painter,
                        );
                        writeln!(out, "{view}")
                    }
                    OutputFormat::Json => write_json_line(
                        out,
                        &NotificationLine {
                            index,
                            payload_hex: format_hex(payload),
                            event: event_label,
                        },
                    ),
                };
                if let Err(error) = rendered {
                    write_error = Some(error);
                }
            },
        )
        .await;

    session.close().await?;

    if let Some(error) = write_error {
        return Err(error.into());
    }
    let run_result = run_result?;
    let summary = ListenSummary::new(
        device,
        run_result.received_notifications(),
        run_result.stop_reason().clone(),
    );
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", ListenSummaryView::new(&summary, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &ListenResult { summary: &summary })?;
            writeln!(out)?;
        }
    }

    Ok(())
}

fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)
}
