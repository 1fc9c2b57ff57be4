//! Heartbeat handling and agent status transitions.
//!
//! Status is never stored: it is derived from heartbeat age on every read.
//! The tracker only remembers the last classification per agent so the
//! periodic sweep can tell edges from steady state, and a flap suppressor
//! keeps a rapidly bouncing agent from churning the assignment plan.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use registry_metadata::{
    AgentId, AgentMetricsSample, AgentStatus, MetadataRegistry,
};

use crate::metrics;
use crate::types::{AgentTransition, FleetResult, HeartbeatPayload, HeartbeatResponse};

/// Pure edge detection between two classifications.
///
/// Offline fires on any reachable→offline edge; recovered fires when an
/// offline or never-seen agent shows up active. Degraded is steady state
/// in both directions.
pub fn transition_for(
    previous: Option<AgentStatus>,
    current: AgentStatus,
    agent_id: AgentId,
) -> Option<AgentTransition> {
    match (previous, current) {
        (Some(AgentStatus::Offline), AgentStatus::Active) => {
            Some(AgentTransition::Recovered(agent_id))
        }
        (None, AgentStatus::Active) => Some(AgentTransition::Recovered(agent_id)),
        (Some(prev), AgentStatus::Offline) if prev != AgentStatus::Offline => {
            Some(AgentTransition::Offline(agent_id))
        }
        _ => None,
    }
}

/// Tracks agent transition timestamps and suppresses failover/recovery for
/// agents flapping faster than the window allows.
pub struct FlapSuppressor {
    window: Duration,
    max_transitions: usize,
    history: Mutex<HashMap<AgentId, Vec<DateTime<Utc>>>>,
}

impl FlapSuppressor {
    pub fn new(window: Duration, max_transitions: usize) -> Self {
        Self {
            window,
            max_transitions,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Defaults: more than 3 transitions within 5 minutes suppresses.
    pub fn with_defaults() -> Self {
        Self::new(Duration::minutes(5), 3)
    }

    /// Record a transition and report whether the agent is now suppressed.
    pub async fn record(&self, agent_id: AgentId, at: DateTime<Utc>) -> bool {
        let mut history = self.history.lock().await;
        let entries = history.entry(agent_id).or_default();
        entries.push(at);
        let horizon = at - self.window;
        entries.retain(|t| *t > horizon);
        let suppressed = entries.len() > self.max_transitions;
        if suppressed {
            warn!(
                agent = %agent_id,
                transitions = entries.len(),
                "agent is flapping, suppressing failover/recovery"
            );
        }
        suppressed
    }

    /// Whether the agent is currently inside a suppression window.
    pub async fn is_suppressed(&self, agent_id: AgentId, now: DateTime<Utc>) -> bool {
        let mut history = self.history.lock().await;
        let Some(entries) = history.get_mut(&agent_id) else {
            return false;
        };
        let horizon = now - self.window;
        entries.retain(|t| *t > horizon);
        entries.len() > self.max_transitions
    }
}

/// Heartbeat ingestion and the periodic fleet status sweep.
pub struct HeartbeatTracker {
    registry: MetadataRegistry,
    last_known: Mutex<HashMap<AgentId, AgentStatus>>,
    events_tx: mpsc::Sender<AgentTransition>,
    degraded_secs: i64,
    offline_secs: i64,
}

impl HeartbeatTracker {
    pub fn new(registry: MetadataRegistry, events_tx: mpsc::Sender<AgentTransition>) -> Self {
        Self {
            registry,
            last_known: Mutex::new(HashMap::new()),
            events_tx,
            degraded_secs: registry_metadata::HEARTBEAT_DEGRADED_SECS,
            offline_secs: registry_metadata::HEARTBEAT_OFFLINE_SECS,
        }
    }

    /// Tracker with tuned heartbeat windows.
    pub fn with_thresholds(
        registry: MetadataRegistry,
        events_tx: mpsc::Sender<AgentTransition>,
        degraded_secs: i64,
        offline_secs: i64,
    ) -> Self {
        Self {
            registry,
            last_known: Mutex::new(HashMap::new()),
            events_tx,
            degraded_secs,
            offline_secs,
        }
    }

    fn classify(&self, agent: &registry_metadata::Agent, now: DateTime<Utc>) -> AgentStatus {
        agent.status_at_with(now, self.degraded_secs, self.offline_secs)
    }

    /// Populate last-known status for the whole fleet without emitting
    /// events. Run once at startup so a restart does not stampede the
    /// assignment engine with synthetic transitions.
    pub async fn seed(&self) -> FleetResult<()> {
        let now = Utc::now();
        let agents = self.registry.list_agents().await?;
        let mut map = self.last_known.lock().await;
        for agent in &agents {
            map.insert(agent.id, self.classify(agent, now));
        }
        info!(agents = agents.len(), "heartbeat tracker seeded");
        Ok(())
    }

    /// Process one heartbeat: refresh the stored timestamp, persist the
    /// metrics sample, detect an edge, and answer with assignment freshness
    /// plus the pending command count.
    pub async fn handle_heartbeat(
        &self,
        agent_id: AgentId,
        payload: HeartbeatPayload,
    ) -> FleetResult<HeartbeatResponse> {
        let agent = self
            .registry
            .record_heartbeat(agent_id, payload.assignment_version)
            .await?;
        metrics::HEARTBEATS_TOTAL.inc();

        for error in &payload.errors {
            warn!(agent = %agent_id, error = %error, "agent reported error");
        }

        let now = Utc::now();
        self.registry
            .insert_agent_metrics(&AgentMetricsSample {
                agent_id,
                sampled_at: now,
                cpu_pct: payload.cpu_pct,
                memory_pct: payload.memory_pct,
                active_targets: payload.active_targets,
                probes_per_second: payload.probes_per_second,
                error_count: payload.errors.len() as i32,
            })
            .await?;

        let status = self.classify(&agent, now);
        self.observe(agent_id, status).await;

        let current_version = self.registry.current_assignment_version().await?;
        let pending_commands_count = self
            .registry
            .count_pending_commands(agent_id, now)
            .await?;

        Ok(HeartbeatResponse {
            assignment_version: current_version,
            assignments_changed: payload.assignment_version < current_version,
            pending_commands_count,
        })
    }

    /// Classify the whole fleet and emit transition events for edges since
    /// the last look. Runs on the supervisor's heartbeat-sweep cadence.
    pub async fn sweep(&self) -> FleetResult<Vec<AgentTransition>> {
        let now = Utc::now();
        let agents = self.registry.list_agents().await?;
        let mut transitions = Vec::new();

        {
            let mut map = self.last_known.lock().await;
            for agent in &agents {
                let status = self.classify(agent, now);
                let previous = map.insert(agent.id, status);
                if let Some(transition) = transition_for(previous, status, agent.id) {
                    transitions.push(transition);
                }
            }
        }

        for transition in &transitions {
            metrics::AGENT_TRANSITIONS_TOTAL.inc();
            debug!(?transition, "agent transition");
            if self.events_tx.send(*transition).await.is_err() {
                warn!("transition bus closed, dropping event");
            }
        }
        Ok(transitions)
    }

    /// Record a single observation (from a heartbeat) and emit an edge if
    /// one occurred.
    async fn observe(&self, agent_id: AgentId, status: AgentStatus) {
        let previous = {
            let mut map = self.last_known.lock().await;
            map.insert(agent_id, status)
        };
        if let Some(transition) = transition_for(previous, status, agent_id) {
            metrics::AGENT_TRANSITIONS_TOTAL.inc();
            debug!(?transition, "agent transition (heartbeat)");
            if self.events_tx.send(transition).await.is_err() {
                warn!("transition bus closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn edges_fire_only_on_offline_boundaries() {
        let id = Uuid::new_v4();

        assert_eq!(
            transition_for(Some(AgentStatus::Active), AgentStatus::Offline, id),
            Some(AgentTransition::Offline(id))
        );
        assert_eq!(
            transition_for(Some(AgentStatus::Degraded), AgentStatus::Offline, id),
            Some(AgentTransition::Offline(id))
        );
        assert_eq!(
            transition_for(Some(AgentStatus::Offline), AgentStatus::Active, id),
            Some(AgentTransition::Recovered(id))
        );
        // a brand new agent seen active counts as recovered
        assert_eq!(
            transition_for(None, AgentStatus::Active, id),
            Some(AgentTransition::Recovered(id))
        );

        // steady states and degradation are not edges
        assert_eq!(transition_for(Some(AgentStatus::Active), AgentStatus::Active, id), None);
        assert_eq!(transition_for(Some(AgentStatus::Active), AgentStatus::Degraded, id), None);
        assert_eq!(transition_for(Some(AgentStatus::Offline), AgentStatus::Offline, id), None);
        assert_eq!(transition_for(Some(AgentStatus::Offline), AgentStatus::Degraded, id), None);
        assert_eq!(transition_for(None, AgentStatus::Offline, id), None);
    }

    #[tokio::test]
    async fn flap_suppression_kicks_in_past_the_window_budget() {
        let suppressor = FlapSuppressor::new(Duration::minutes(5), 3);
        let id = Uuid::new_v4();
        let base = Utc::now();

        assert!(!suppressor.record(id, base).await);
        assert!(!suppressor.record(id, base + Duration::seconds(30)).await);
        assert!(!suppressor.record(id, base + Duration::seconds(60)).await);
        // fourth transition inside five minutes crosses the budget
        assert!(suppressor.record(id, base + Duration::seconds(90)).await);
        assert!(
            suppressor
                .is_suppressed(id, base + Duration::seconds(95))
                .await
        );

        // once the burst ages out of the window the agent resumes
        assert!(
            !suppressor
                .is_suppressed(id, base + Duration::minutes(7))
                .await
        );
    }

    #[tokio::test]
    async fn suppression_is_per_agent() {
        let suppressor = FlapSuppressor::with_defaults();
        let flappy = Uuid::new_v4();
        let steady = Uuid::new_v4();
        let base = Utc::now();

        for i in 0..5 {
            suppressor.record(flappy, base + Duration::seconds(i)).await;
        }
        assert!(suppressor.is_suppressed(flappy, base + Duration::seconds(10)).await);
        assert!(!suppressor.is_suppressed(steady, base + Duration::seconds(10)).await);
    }
}
