//! Global subscriber installation. Kept to a single test: the subscriber is
//! process-wide.

use unillm::ErrorKind;
use unillm::observability::{OutputFormat, TracingConfig, init_tracing};

#[test]
fn json_file_logging_installs_once() {
    let dir = tempfile::tempdir().unwrap();
    let log_file = dir.path().join("unillm.log");

    let guard = init_tracing(
        TracingConfig::default()
            .with_filter("info")
            .with_format(OutputFormat::Json)
            .with_log_file(&log_file),
    )
    .unwrap();
    assert!(guard.is_some());

    tracing::info!(provider = "openai", "subscriber installed");
    drop(guard);

    let written = std::fs::read_to_string(&log_file).unwrap();
    let line = written.lines().find(|l| l.contains("subscriber installed")).unwrap();
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["level"], "INFO");
    assert_eq!(event["fields"]["provider"], "openai");

    let err = init_tracing(TracingConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.operation, "init_tracing");
}
