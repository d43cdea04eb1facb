//! Configuration loading tests for Rustible Events.
//!
//! Environment variables are process-wide, so every test touching them runs
//! serially and clears what it sets.

use std::io::Write;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::{tempdir, Builder};

use rustible_events::callback::{EventDispatcher, EventsConfig, EventsConfigLoader, OutputStyle};
use rustible_events::error::Error;

const ENV_VARS: [&str; 10] = [
    "RE_TEST_OUTPUT",
    "RE_TEST_STYLE",
    "RE_TEST_DISPLAY_ARGS",
    "RE_TEST_CHUNK_WIDTH",
    "RE_TEST_NO_COLOR",
    "MAX_EVENT_RES",
    "AWX_PRIVATE_DATA_DIR",
    "JOB_ID",
    "AD_HOC_COMMAND_ID",
    "NO_COLOR",
];

/// Clears the test's environment variables when dropped.
struct EnvGuard;

impl EnvGuard {
    fn new() -> Self {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        EnvGuard
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }
}

fn loader() -> EventsConfigLoader {
    EventsConfigLoader::new()
        .without_standard_locations()
        .with_env_prefix("RE_TEST")
}

fn config_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// ============================================================================
// Files
// ============================================================================

#[test]
#[serial]
fn test_toml_file() {
    let _env = EnvGuard::new();
    let file = config_file(
        ".toml",
        r#"
[events]
output = "stderr"
style = "minimal"
display_args_to_stdout = false
chunk_width = 40
private_data_dir = "/tmp/awx_42"

[events.job_ids]
job_id = 42
"#,
    );

    let config = loader().with_file(file.path()).load().unwrap();
    assert_eq!(config.output, "stderr");
    assert_eq!(config.style, OutputStyle::Minimal);
    assert!(!config.display_args_to_stdout);
    assert_eq!(config.chunk_width, 40);
    assert_eq!(config.artifacts_dir(), Some(PathBuf::from("/tmp/awx_42/artifacts")));
    assert_eq!(config.job_ids.job_id, Some(42));
}

#[test]
#[serial]
fn test_yaml_and_json_files() {
    let _env = EnvGuard::new();
    let yaml = config_file(".yml", "events:\n  max_event_res: 1024\n  use_colors: false\n");
    let json = config_file(".json", r#"{"events": {"chunk_width": 120}}"#);

    let config = loader()
        .with_file(yaml.path())
        .with_file(json.path())
        .load()
        .unwrap();
    assert_eq!(config.max_event_res, 1024);
    assert!(!config.use_colors);
    assert_eq!(config.chunk_width, 120);
}

#[test]
#[serial]
fn test_missing_file_is_skipped() {
    let _env = EnvGuard::new();
    let config = loader()
        .with_file("/nonexistent/rustible/events.toml")
        .load()
        .unwrap();
    assert_eq!(config, EventsConfig::default());
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let _env = EnvGuard::new();
    let file = config_file(".toml", "[events\noutput = ");
    let err = loader().with_file(file.path()).load().unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load config"));
}

// ============================================================================
// Environment
// ============================================================================

#[test]
#[serial]
fn test_environment_overrides_file() {
    let env = EnvGuard::new();
    let file = config_file(".toml", "[events]\noutput = \"stderr\"\nchunk_width = 40\n");
    env.set("RE_TEST_OUTPUT", "/var/log/events.out");
    env.set("RE_TEST_STYLE", "Minimal");
    env.set("RE_TEST_DISPLAY_ARGS", "no");
    env.set("MAX_EVENT_RES", "2048");
    env.set("AWX_PRIVATE_DATA_DIR", "/tmp/awx_7");
    env.set("JOB_ID", "7");
    env.set("AD_HOC_COMMAND_ID", "");

    let config = loader().with_file(file.path()).load().unwrap();
    assert_eq!(config.output, "/var/log/events.out");
    assert_eq!(config.style, OutputStyle::Minimal);
    assert!(!config.display_args_to_stdout);
    assert_eq!(config.chunk_width, 40);
    assert_eq!(config.max_event_res, 2048);
    assert_eq!(config.private_data_dir, Some(PathBuf::from("/tmp/awx_7")));
    assert_eq!(config.job_ids.fields(), vec![("job_id", 7)]);
}

#[test]
#[serial]
fn test_no_color_variables() {
    let env = EnvGuard::new();
    assert!(loader().load().unwrap().use_colors);

    env.set("RE_TEST_NO_COLOR", "1");
    assert!(!loader().load().unwrap().use_colors);

    std::env::remove_var("RE_TEST_NO_COLOR");
    env.set("NO_COLOR", "");
    assert!(!loader().load().unwrap().use_colors);
}

#[test]
#[serial]
fn test_invalid_environment_values() {
    let env = EnvGuard::new();
    env.set("RE_TEST_CHUNK_WIDTH", "wide");
    assert!(loader().load().is_err());

    env.set("RE_TEST_CHUNK_WIDTH", "0");
    let err = loader().load().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidConfig { .. })
    ));

    std::env::remove_var("RE_TEST_CHUNK_WIDTH");
    env.set("JOB_ID", "forty-two");
    assert!(loader().load().is_err());
}

#[test]
#[serial]
fn test_without_env_ignores_variables() {
    let env = EnvGuard::new();
    env.set("RE_TEST_OUTPUT", "stderr");
    env.set("JOB_ID", "9");

    let config = loader().without_env().load().unwrap();
    assert_eq!(config.output, "stdout");
    assert!(config.job_ids.fields().is_empty());
}

#[test]
#[serial]
fn test_explicit_overrides_win() {
    let env = EnvGuard::new();
    env.set("RE_TEST_OUTPUT", "stderr");
    env.set("RE_TEST_STYLE", "minimal");

    let config = loader()
        .with_output("/tmp/override.out")
        .with_style(OutputStyle::Minimal)
        .with_colors(false)
        .load()
        .unwrap();
    assert_eq!(config.output, "/tmp/override.out");
    assert_eq!(config.style, OutputStyle::Minimal);
    assert!(!config.use_colors);
}

// ============================================================================
// Building a Dispatcher
// ============================================================================

#[test]
fn test_dispatcher_from_file_output() {
    let dir = tempdir().unwrap();
    let config = EventsConfig {
        output: dir.path().join("events.out").display().to_string(),
        ..EventsConfig::default()
    };
    let dispatcher = EventDispatcher::from_config(&config).unwrap();
    assert!(dir.path().join("events.out").exists());
    assert!(format!("{:?}", dispatcher).contains("default"));
}

#[test]
fn test_dispatcher_rejects_invalid_config() {
    let config = EventsConfig {
        output: "  ".to_string(),
        ..EventsConfig::default()
    };
    assert!(matches!(
        EventDispatcher::from_config(&config),
        Err(Error::InvalidConfig { .. })
    ));
}

#[test]
fn test_unwritable_output_path() {
    let config = EventsConfig {
        output: "/nonexistent/dir/events.out".to_string(),
        ..EventsConfig::default()
    };
    assert!(matches!(
        EventDispatcher::from_config(&config),
        Err(Error::Config(_))
    ));
}
