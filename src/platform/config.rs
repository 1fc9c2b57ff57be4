use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use registry_metadata::{AlertThresholds, HEARTBEAT_DEGRADED_SECS, HEARTBEAT_OFFLINE_SECS};

const DEFAULT_CONFIG_PATH: &str = "configs/watchtower.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub metadata: MetadataSettings,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub observability: ObservabilitySettings,
    pub audit: AuditSettings,
    pub auth: AuthSettings,
    pub heartbeat: HeartbeatSettings,
    pub state: StateSettings,
    pub alerting: AlertThresholds,
    pub ingest: IngestSettings,
    pub workers: WorkerSettings,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            metadata: MetadataSettings::default(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            observability: ObservabilitySettings::default(),
            audit: AuditSettings::default(),
            auth: AuthSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            state: StateSettings::default(),
            alerting: AlertThresholds::default(),
            ingest: IngestSettings::default(),
            workers: WorkerSettings::default(),
        }
    }
}

impl ControlPlaneConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(None::<PathBuf>)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            File::from(PathBuf::from(DEFAULT_CONFIG_PATH))
                .format(FileFormat::Toml)
                .required(false),
        );

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path.as_ref())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(Environment::with_prefix("WATCHTOWER").separator("__"));

        let config = builder.build()?;
        config
            .try_deserialize()
            .context("invalid control plane configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub name: String,
    pub environment: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            name: "project-watchtower".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub metrics_port: u16,
    pub enable_metrics: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: 9090,
            enable_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub log_path: String,
    pub retention_days: u32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            log_path: "logs/audit.log".to_string(),
            retention_days: 90,
        }
    }
}

/// Agent credential verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Reject requests whose bearer credential fails verification
    Enforce,
    /// Admit everything but log verification failures
    Grace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub mode: AuthMode,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: AuthMode::Enforce,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub degraded_secs: i64,
    pub offline_secs: i64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            degraded_secs: HEARTBEAT_DEGRADED_SECS,
            offline_secs: HEARTBEAT_OFFLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub baseline_secs: i64,
    pub down_secs: i64,
    pub excluded_secs: i64,
    pub discovery_max_attempts: i32,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            baseline_secs: 60,     // 1 minute
            down_secs: 900,        // 15 minutes
            excluded_secs: 86_400, // 24 hours
            discovery_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Bounded worker pool size; 0 sizes to the CPU count
    pub workers: usize,
    pub consecutive_failures: i32,
    pub z_score: f64,
    pub packet_loss_pct: f64,
    pub late_window_secs: i64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            consecutive_failures: 3,
            z_score: 3.0,
            packet_loss_pct: 5.0,
            late_window_secs: 120, // 2 minutes
        }
    }
}

impl IngestSettings {
    /// Effective pool size, CPU-sized when unset.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub heartbeat_interval_secs: u64,
    pub assignment_interval_secs: u64,
    pub state_interval_secs: u64,
    pub alert_interval_secs: u64,
    pub command_expiry_interval_secs: u64,
    pub config_reload_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            assignment_interval_secs: 30,
            state_interval_secs: 300, // 5 minutes
            alert_interval_secs: 30,
            command_expiry_interval_secs: 60,
            config_reload_secs: 300, // 5 minutes
            shutdown_grace_secs: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_thresholds() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.heartbeat.degraded_secs, 30);
        assert_eq!(config.heartbeat.offline_secs, 60);
        assert_eq!(config.state.down_secs, 900);
        assert_eq!(config.state.excluded_secs, 86_400);
        assert_eq!(config.workers.state_interval_secs, 300);
        assert_eq!(config.auth.mode, AuthMode::Enforce);
    }

    #[test]
    fn cpu_sizing_kicks_in_at_zero_workers() {
        let settings = IngestSettings::default();
        assert!(settings.effective_workers() >= 1);

        let fixed = IngestSettings {
            workers: 7,
            ..Default::default()
        };
        assert_eq!(fixed.effective_workers(), 7);
    }
}
