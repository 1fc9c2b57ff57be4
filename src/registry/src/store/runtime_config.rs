//! Hot-reloadable thresholds stored in the registry.
//!
//! The alert worker re-reads these every few minutes, so operators can tune
//! alerting without a restart.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::Row;
use tracing::warn;

use crate::types::RegistryResult;

use super::MetadataRegistry;

/// Key under which [`AlertThresholds`] live in runtime_config.
pub const ALERT_THRESHOLDS_KEY: &str = "alert_thresholds";

/// Alerting thresholds; defaults match the shipped configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub latency_warning_ms: f64,
    pub latency_critical_ms: f64,
    pub packet_loss_warning_pct: f64,
    pub packet_loss_critical_pct: f64,
    /// Consecutive healthy probes required before alerts resolve
    pub resolution_probe_count: i32,
    /// Active unlinked alerts on one key needed to open an incident
    pub incident_creation_threshold: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            latency_warning_ms: 100.0,
            latency_critical_ms: 500.0,
            packet_loss_warning_pct: 5.0,
            packet_loss_critical_pct: 20.0,
            resolution_probe_count: 3,
            incident_creation_threshold: 2,
        }
    }
}

impl MetadataRegistry {
    pub async fn get_runtime_value(&self, key: &str) -> RegistryResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM runtime_config WHERE key = $1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => {
                let Json(value): Json<serde_json::Value> = row.try_get("value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set_runtime_value(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> RegistryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO runtime_config (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Load alert thresholds, falling back to defaults when the row is
    /// missing or unreadable. A broken row must not take alerting down.
    pub async fn load_alert_thresholds(&self) -> RegistryResult<AlertThresholds> {
        match self.get_runtime_value(ALERT_THRESHOLDS_KEY).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(thresholds) => Ok(thresholds),
                Err(err) => {
                    warn!(error = %err, "alert thresholds row malformed, using defaults");
                    Ok(AlertThresholds::default())
                }
            },
            None => Ok(AlertThresholds::default()),
        }
    }

    pub async fn store_alert_thresholds(
        &self,
        thresholds: &AlertThresholds,
    ) -> RegistryResult<()> {
        let value = serde_json::to_value(thresholds)?;
        self.set_runtime_value(ALERT_THRESHOLDS_KEY, &value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_shipped_configuration() {
        let t = AlertThresholds::default();
        assert_eq!(t.latency_warning_ms, 100.0);
        assert_eq!(t.latency_critical_ms, 500.0);
        assert_eq!(t.packet_loss_warning_pct, 5.0);
        assert_eq!(t.packet_loss_critical_pct, 20.0);
        assert_eq!(t.resolution_probe_count, 3);
        assert_eq!(t.incident_creation_threshold, 2);
    }

    #[test]
    fn partial_rows_fill_with_defaults() {
        let partial: AlertThresholds =
            serde_json::from_str(r#"{"latency_warning_ms": 150.0}"#).unwrap();
        assert_eq!(partial.latency_warning_ms, 150.0);
        assert_eq!(partial.latency_critical_ms, 500.0);
    }
}
