use std::path::PathBuf;
use std::time::Duration;

use boxwatch::capture::codec::MAX_LINE_BYTES;
use boxwatch::config::{GlobalConfig, NotifyConfig};
use boxwatch::AppError;

fn sample_toml() -> &'static str {
    r#"
poll_interval_seconds = 45
history_path = "state/db.json"

[monitor]
command = "idf.py"
args = ["--project-dir", "/opt/firmware", "monitor"]
working_dir = "/opt/firmware"
capture_timeout_seconds = 20

[detector]
threshold = 7
hash_size = 8

[analysis]
model = "gpt-4o-mini"
max_tokens = 500
temperature = 0.2

[notify]
base_url = "https://chat.example.com"
channel_id = "abc123"
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.poll_interval_seconds, 45);
    assert_eq!(config.poll_interval(), Duration::from_secs(45));
    assert_eq!(config.history_path, PathBuf::from("state/db.json"));
    assert_eq!(config.monitor.args, ["--project-dir", "/opt/firmware", "monitor"]);
    assert_eq!(config.monitor.working_dir, Some(PathBuf::from("/opt/firmware")));
    assert_eq!(config.capture_timeout(), Duration::from_secs(20));
    assert_eq!(config.detector.threshold, 7);
    assert_eq!(config.analysis.model, "gpt-4o-mini");
    assert_eq!(config.analysis.max_tokens, 500);
    assert!(config.notify.enabled, "notify defaults to enabled when the section is present");
    assert_eq!(config.notify.channel_id, "abc123");
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults are valid");

    assert_eq!(config.poll_interval_seconds, 30);
    assert_eq!(config.history_path, PathBuf::from("db.json"));
    assert_eq!(config.monitor.command, "idf.py");
    assert_eq!(config.monitor.args, ["--project-dir", "..", "monitor"]);
    assert_eq!(config.monitor.capture_timeout_seconds, 15);
    assert_eq!(config.monitor.max_line_bytes, MAX_LINE_BYTES);
    assert_eq!(config.detector.threshold, 5);
    assert_eq!(config.detector.hash_size, 8);
    assert_eq!(config.analysis.base_url, "https://api.openai.com/v1");
    assert_eq!(config.analysis.model, "gpt-4o");
    assert_eq!(config.analysis.max_tokens, 700);
    assert!(config.analysis.scene_context.contains("45 cm x 33 cm"));
    assert!(!config.notify.enabled, "no [notify] section means notifications are off");
}

#[test]
fn notify_table_presence_decides_the_enabled_default() {
    let absent = GlobalConfig::from_toml_str("").expect("valid");
    assert_eq!(absent.notify, NotifyConfig::default());
    assert!(!absent.notify.enabled);

    let present = GlobalConfig::from_toml_str(
        "[notify]\nbase_url = \"https://chat.example.com\"\nchannel_id = \"c1\"\n",
    )
    .expect("valid");
    assert!(present.notify.enabled, "an explicit [notify] table opts in");
}

#[test]
fn credentials_are_never_read_from_toml() {
    let toml = r#"
[analysis]
api_key = "sk-from-file"

[notify]
enabled = false
token = "from-file"
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("unknown keys ignored");
    assert!(config.analysis.api_key.is_empty());
    assert!(config.notify.token.is_empty());
}

#[test]
fn zero_capture_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str("[monitor]\ncapture_timeout_seconds = 0\n")
        .expect_err("zero timeout");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("capture_timeout_seconds"));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = GlobalConfig::from_toml_str("poll_interval_seconds = 0\n").expect_err("zero poll");
    assert!(err.to_string().contains("poll_interval_seconds"));
}

#[test]
fn empty_command_is_rejected() {
    let err = GlobalConfig::from_toml_str("[monitor]\ncommand = \"  \"\n").expect_err("blank");
    assert!(err.to_string().contains("monitor.command"));
}

#[test]
fn out_of_range_hash_size_is_rejected() {
    for size in [0, 3, 17] {
        let toml = format!("[detector]\nhash_size = {size}\n");
        let err = GlobalConfig::from_toml_str(&toml).expect_err("hash size out of range");
        assert!(err.to_string().contains("hash_size"), "size {size}: {err}");
    }
}

#[test]
fn enabled_notify_requires_channel() {
    let err = GlobalConfig::from_toml_str("[notify]\nbase_url = \"https://chat.example.com\"\n")
        .expect_err("missing channel");
    assert!(err.to_string().contains("channel_id"));
}

#[test]
fn disabled_notify_needs_no_channel() {
    let config = GlobalConfig::from_toml_str("[notify]\nenabled = false\n").expect("valid");
    assert!(!config.notify.enabled);
}

#[test]
fn invalid_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("poll_interval_seconds = \"soon\"").expect_err("bad type");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn validate_catches_cli_overrides() {
    let mut config = GlobalConfig::from_toml_str("").expect("defaults");
    config.monitor.capture_timeout_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write");

    let config = GlobalConfig::load_from_path(&path).expect("loads");
    assert_eq!(config.detector.threshold, 7);

    let missing = GlobalConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file");
    assert!(matches!(missing, AppError::Config(_)));
}
