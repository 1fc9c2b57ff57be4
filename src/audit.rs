//! Operator mutation audit log: JSON lines, one file, explicit ownership.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: u64,
    pub event_type: String,
    pub actor: Option<String>,
    pub resource: String,
    pub action: String,
    pub result: String,
    pub severity: AuditSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone)]
pub struct AuditLog {
    log_file: Arc<Mutex<BufWriter<File>>>,
    _retention_days: u32,
}

impl AuditLog {
    pub fn new(log_path: &str, retention_days: u32) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = Path::new(log_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            log_file: Arc::new(Mutex::new(BufWriter::new(file))),
            _retention_days: retention_days,
        })
    }

    pub fn log_event(&self, mut event: AuditEvent) -> Result<(), Box<dyn std::error::Error>> {
        if event.timestamp == 0 {
            event.timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        }
        if event.id.is_empty() {
            event.id = Uuid::new_v4().to_string();
        }

        let event_json = serde_json::to_string(&event)? + "\n";
        let mut writer = match self.log_file.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        writer.write_all(event_json.as_bytes())?;
        writer.flush()?;

        if matches!(event.severity, AuditSeverity::Critical | AuditSeverity::High) {
            eprintln!(
                "AUDIT [{:?}]: {} - {}",
                event.severity, event.event_type, event.action
            );
        }

        Ok(())
    }

    /// Record an operator mutation (create/update/archive of an entity).
    pub fn log_mutation(&self, actor: Option<String>, action: &str, resource: &str) {
        let event = AuditEvent {
            id: String::new(),
            timestamp: 0,
            event_type: "operator_mutation".to_string(),
            actor,
            resource: resource.to_string(),
            action: action.to_string(),
            result: "success".to_string(),
            severity: AuditSeverity::Medium,
        };
        if let Err(err) = self.log_event(event) {
            tracing::warn!(error = %err, "audit write failed");
        }
    }

    /// Record a failed agent credential verification.
    pub fn log_auth_failure(&self, agent: &str) {
        let event = AuditEvent {
            id: String::new(),
            timestamp: 0,
            event_type: "authentication".to_string(),
            actor: Some(agent.to_string()),
            resource: "agent_credential".to_string(),
            action: "verify".to_string(),
            result: "failure".to_string(),
            severity: AuditSeverity::High,
        };
        if let Err(err) = self.log_event(event) {
            tracing::warn!(error = %err, "audit write failed");
        }
    }

    /// Record a trigger endpoint invocation (materialize, mtr, recalc).
    pub fn log_trigger(&self, actor: Option<String>, trigger: &str, resource: &str) {
        let event = AuditEvent {
            id: String::new(),
            timestamp: 0,
            event_type: "admin_trigger".to_string(),
            actor,
            resource: resource.to_string(),
            action: trigger.to_string(),
            result: "accepted".to_string(),
            severity: AuditSeverity::High,
        };
        if let Err(err) = self.log_event(event) {
            tracing::warn!(error = %err, "audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn events_append_as_json_lines() {
        let temp_file = NamedTempFile::new().unwrap();
        let log = AuditLog::new(temp_file.path().to_str().unwrap(), 7).unwrap();

        let event = AuditEvent {
            id: "event-1".to_string(),
            timestamp: 1_700_000_000,
            event_type: "operator_mutation".to_string(),
            actor: Some("ops@example.net".to_string()),
            resource: "tier/vip".to_string(),
            action: "update".to_string(),
            result: "success".to_string(),
            severity: AuditSeverity::Low,
        };
        assert!(log.log_event(event).is_ok());

        let written = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(written.contains("\"resource\":\"tier/vip\""));
        assert!(written.ends_with('\n'));
    }
}
