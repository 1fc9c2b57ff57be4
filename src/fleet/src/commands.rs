//! One-shot command dispatch: queueing, poll delivery, result capture.

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use registry_metadata::{
    AgentId, Command, CommandId, CommandResult, CommandStatus, MetadataRegistry,
};

use crate::metrics;
use crate::types::{CommandRequest, CommandResultPayload, FleetError, FleetResult};

/// Default command time-to-live.
pub const DEFAULT_COMMAND_TTL_SECS: i64 = 300;

/// Queues one-shot commands for agents and aggregates their results.
pub struct CommandDispatcher {
    registry: MetadataRegistry,
    ttl: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: MetadataRegistry) -> Self {
        Self {
            registry,
            ttl: Duration::seconds(DEFAULT_COMMAND_TTL_SECS),
        }
    }

    pub fn with_ttl(registry: MetadataRegistry, ttl: Duration) -> Self {
        Self { registry, ttl }
    }

    /// Create a command, fanning out one pending delivery per agent. The
    /// agent set defaults to the target's current assignees.
    pub async fn dispatch(&self, request: CommandRequest) -> FleetResult<Command> {
        if request.command_type.trim().is_empty() {
            return Err(FleetError::Validation("command_type must not be empty".into()));
        }

        let target = self.registry.get_target(request.target_id).await?;

        let agent_ids = match request.agent_ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                let assignments = self
                    .registry
                    .assignments_for_target(request.target_id)
                    .await?;
                assignments.into_iter().map(|a| a.agent_id).collect()
            }
        };
        if agent_ids.is_empty() {
            return Err(FleetError::Conflict(format!(
                "target {} has no assigned agents to run {}",
                target.id, request.command_type
            )));
        }

        let now = Utc::now();
        let command = Command {
            id: Uuid::new_v4(),
            command_type: request.command_type,
            target_id: target.id,
            target_ip: target.ip.clone(),
            params: request.params,
            requested_by: request.requested_by,
            requested_at: now,
            expires_at: now + self.ttl,
            status: CommandStatus::Pending,
            assigned_agent_ids: agent_ids,
        };

        self.registry.create_command(&command).await?;
        metrics::COMMANDS_DISPATCHED_TOTAL.inc();
        info!(
            command = %command.id,
            command_type = %command.command_type,
            target = %command.target_id,
            agents = command.assigned_agent_ids.len(),
            "command dispatched"
        );
        Ok(command)
    }

    /// Pending commands for an agent's poll; advances them to `delivered`.
    pub async fn poll(&self, agent_id: AgentId) -> FleetResult<Vec<Command>> {
        let commands = self
            .registry
            .pending_commands_for_agent(agent_id, Utc::now())
            .await?;
        if !commands.is_empty() {
            debug!(agent = %agent_id, count = commands.len(), "commands delivered");
        }
        Ok(commands)
    }

    /// Record one agent's result. Duplicate posts are acknowledged but not
    /// re-stored; returns whether the result was new.
    pub async fn record_result(
        &self,
        command_id: CommandId,
        agent_id: AgentId,
        payload: CommandResultPayload,
    ) -> FleetResult<bool> {
        let command = self.registry.get_command(command_id).await?;
        if !command.assigned_agent_ids.contains(&agent_id) {
            return Err(FleetError::Validation(format!(
                "agent {agent_id} was not assigned command {command_id}"
            )));
        }

        let stored = self
            .registry
            .record_command_result(&CommandResult {
                command_id,
                agent_id,
                success: payload.success,
                error: payload.error,
                payload: payload.payload,
                duration_ms: payload.duration_ms,
                completed_at: payload.completed_at.unwrap_or_else(Utc::now),
            })
            .await?;
        if stored {
            metrics::COMMAND_RESULTS_TOTAL.inc();
        } else {
            debug!(command = %command_id, agent = %agent_id, "duplicate command result ignored");
        }
        Ok(stored)
    }

    /// Expire overdue commands; run on the supervisor's expiry cadence.
    pub async fn expire_overdue(&self) -> FleetResult<u64> {
        let expired = self.registry.expire_commands(Utc::now()).await?;
        if expired > 0 {
            info!(expired, "commands expired");
        }
        Ok(expired)
    }
}
