use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use pretty_assertions::assert_eq;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl blindctl::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_argv<const N: usize>(
    argv: [&str; N],
    output_format: blindctl::OutputFormat,
) -> anyhow::Result<String> {
    let args = blindctl::Args::try_parse_from(argv)?;
    let mut output = Vec::new();
    let device_name = args.device_name().to_string();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let hardware_client = match maybe_fake_args {
        Some(fake_args) => blindctl::fake_hardware_client(fake_args),
        None => blindctl::real_hardware_client().await?,
    };
    blindctl::run_with_clients_and_log_level(
        command,
        &mut output,
        &FakeTerminalClient,
        hardware_client,
        None,
        output_format,
        &device_name,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

fn temp_profile_path(tag: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "blindctl-cli-{tag}-{}-{timestamp}.json",
        std::process::id()
    ))
}

#[tokio::test]
async fn inspect_command_reports_uart_endpoints_from_fake_backend() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci1|00:11:22|Speaker|-65;hci0|AA:BB:CC|DSD TECH|-43",
            "inspect",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let report: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!("AA:BB:CC", report["device"]["device_id"]);
    assert_eq!("DSD TECH", report["device"]["local_name"]);
    assert_eq!(true, report["endpoint_presence"]["uart_service"]);
    assert_eq!(true, report["endpoint_presence"]["uart_characteristic"]);
    Ok(())
}

#[tokio::test]
async fn inspect_command_renders_pretty_tables_off_terminal() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "inspect",
        ],
        blindctl::OutputFormat::Pretty,
    )
    .await?;

    assert!(stdout.contains("Connected device:"));
    assert!(stdout.contains("0000ffe1-0000-1000-8000-00805f9b34fb"));
    Ok(())
}

#[tokio::test]
async fn open_command_runs_the_full_command_sequence() -> anyhow::Result<()> {
    let profile_path = temp_profile_path("open");
    let profile_path_arg = profile_path.display().to_string();
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "open",
            "65",
            "--profile-path",
            &profile_path_arg,
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let result: serde_json::Value = serde_json::from_str(&stdout)?;
    let ready_frame = result["ready_frame"]
        .as_str()
        .expect("ready frame should be a string");
    assert!(ready_frame.starts_with("R: "));
    assert!(ready_frame.ends_with(" :E"));
    assert_eq!(
        "Startup: 25 50 50 50 00:00 11:25:E",
        result["startup_frame"]
    );
    assert_eq!("O: 65 :E", result["open_frame"]);
    assert_eq!(65, result["requested_percent"]);
    assert_eq!(65, result["applied_percent"]);
    assert_eq!("operational", result["state"]);
    Ok(())
}

#[tokio::test]
async fn open_command_clamps_out_of_range_percentages() -> anyhow::Result<()> {
    let profile_path = temp_profile_path("open-clamp");
    let profile_path_arg = profile_path.display().to_string();
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "open",
            "--profile-path",
            &profile_path_arg,
            "--",
            "150",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let result: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!("O: 100 :E", result["open_frame"]);
    assert_eq!(150, result["requested_percent"]);
    assert_eq!(100, result["applied_percent"]);
    Ok(())
}

#[tokio::test]
async fn setup_command_applies_field_overrides_to_the_startup_frame() -> anyhow::Result<()> {
    let profile_path = temp_profile_path("setup");
    let profile_path_arg = profile_path.display().to_string();
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "setup",
            "--upper-temperature",
            "60",
            "--open-time",
            "06:30",
            "--profile-path",
            &profile_path_arg,
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let result: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!(
        "Startup: 25 60 50 50 06:30 11:25:E",
        result["startup_frame"]
    );
    assert_eq!("operational", result["state"]);
    assert_eq!(serde_json::Value::Null, result["saved_to"]);
    assert!(!profile_path.exists(), "setup without --save must not write");
    Ok(())
}

#[tokio::test]
async fn setup_command_with_save_persists_the_effective_profile() -> anyhow::Result<()> {
    let profile_path = temp_profile_path("setup-save");
    let profile_path_arg = profile_path.display().to_string();
    run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "setup",
            "--light-level",
            "70",
            "--save",
            "--profile-path",
            &profile_path_arg,
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let saved = blindctl::ProfileStore::at_path(&profile_path).load()?;
    assert_eq!(70, saved.light_level());
    assert_eq!(25, saved.lower_temperature());
    std::fs::remove_file(&profile_path)?;
    Ok(())
}

#[tokio::test]
async fn listen_command_labels_the_ready_token() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "listen",
            "--max-notifications",
            "1",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let first_line = stdout
        .lines()
        .next()
        .expect("listen should emit a notification line");
    let notification: serde_json::Value = serde_json::from_str(first_line)?;
    assert_eq!(1, notification["index"]);
    assert_eq!("52", notification["payload_hex"]);
    assert_eq!("device_ready", notification["event"]);
    assert!(stdout.contains("reached max notifications (1)"));
    Ok(())
}

#[tokio::test]
async fn listen_command_pretty_output_includes_summary() -> anyhow::Result<()> {
    let stdout = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "--fake-notifications",
            "00AA,52",
            "listen",
            "--max-notifications",
            "2",
        ],
        blindctl::OutputFormat::Pretty,
    )
    .await?;

    assert!(stdout.contains("[0001] notification raw=00 AA"));
    assert!(stdout.contains("[0002] device_ready raw=52"));
    assert!(stdout.contains("received 2 notification(s)"));
    Ok(())
}

#[tokio::test]
async fn profile_set_and_show_round_trip() -> anyhow::Result<()> {
    let profile_path = temp_profile_path("profile");
    let profile_path_arg = profile_path.display().to_string();

    run_with_argv(
        [
            "blindctl",
            "profile",
            "--profile-path",
            &profile_path_arg,
            "set",
            "--close-time",
            "20:15",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let stdout = run_with_argv(
        [
            "blindctl",
            "profile",
            "--profile-path",
            &profile_path_arg,
            "show",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    let record: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!("20:15", record["profile"]["close_time"]);
    assert_eq!("00:00", record["profile"]["open_time"]);
    std::fs::remove_file(&profile_path)?;
    Ok(())
}

#[tokio::test]
async fn inspect_command_applies_fake_discovery_delay() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let _ = run_with_argv(
        [
            "blindctl",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|DSD TECH|-43",
            "--fake-discovery-delay",
            "40ms",
            "inspect",
        ],
        blindctl::OutputFormat::Json,
    )
    .await?;

    assert!(started_at.elapsed() >= Duration::from_millis(40));
    Ok(())
}

#[test]
fn fake_fixture_with_wrong_field_count_is_rejected() {
    let result = blindctl::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(blindctl::FixtureError::InvalidRecordFieldCount)
    ));
}
