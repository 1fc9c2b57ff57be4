//! Root-package integration tests: configuration layering and the pieces
//! of the platform that run without a database.

use std::io::Write;
use std::time::Duration;

use watchtower_core::api::cache::ResponseCache;
use watchtower_core::audit::AuditLog;
use watchtower_core::platform::config::AuthMode;
use watchtower_core::ControlPlaneConfig;

#[test]
fn defaults_stand_alone() {
    let config = ControlPlaneConfig::default();
    assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    assert_eq!(config.workers.assignment_interval_secs, 30);
    assert_eq!(config.workers.alert_interval_secs, 30);
    assert_eq!(config.state.baseline_secs, 60);
    assert_eq!(config.alerting.latency_critical_ms, 500.0);
}

#[test]
fn toml_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(
        file,
        r#"
[server]
bind_address = "127.0.0.1:9999"

[auth]
mode = "grace"

[state]
down_secs = 600

[workers]
state_interval_secs = 120
"#
    )
    .unwrap();

    let config = ControlPlaneConfig::load_from_path(Some(file.path())).unwrap();
    assert_eq!(config.server.bind_address, "127.0.0.1:9999");
    assert_eq!(config.auth.mode, AuthMode::Grace);
    assert_eq!(config.state.down_secs, 600);
    assert_eq!(config.workers.state_interval_secs, 120);
    // untouched sections keep their defaults
    assert_eq!(config.heartbeat.offline_secs, 60);
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let result = ControlPlaneConfig::load_from_path(Some("/nonexistent/watchtower.toml"));
    assert!(result.is_err());
}

#[test]
fn audit_log_writes_json_lines() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let log = AuditLog::new(file.path().to_str().unwrap(), 30).unwrap();
    log.log_mutation(Some("ops".into()), "create", "subnet/test");
    log.log_trigger(None, "mtr", "target/test");

    let contents = std::fs::read_to_string(file.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(parsed.get("action").is_some());
    }
}

#[test]
fn response_cache_round_trip() {
    let cache = ResponseCache::new();
    cache.put("alerts", serde_json::json!({"n": 3}));
    assert_eq!(
        cache.get("alerts", Duration::from_secs(10)),
        Some(serde_json::json!({"n": 3}))
    );
    cache.invalidate("alerts");
    assert_eq!(cache.get("alerts", Duration::from_secs(10)), None);
}
