//! Command fan-out persistence: per-agent deliveries and at-most-once
//! result capture.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use crate::model::{Command, CommandDelivery, CommandResult};
use crate::types::{AgentId, CommandId, CommandStatus, RegistryError, RegistryResult};

use super::MetadataRegistry;

impl MetadataRegistry {
    /// Persist a command and one pending delivery per assigned agent.
    pub async fn create_command(&self, command: &Command) -> RegistryResult<()> {
        if command.assigned_agent_ids.is_empty() {
            return Err(RegistryError::Validation(
                "command must target at least one agent".into(),
            ));
        }

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO commands (
                id, command_type, target_id, target_ip, params, requested_by,
                requested_at, expires_at, status, assigned_agent_ids
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(command.id)
        .bind(&command.command_type)
        .bind(command.target_id)
        .bind(&command.target_ip)
        .bind(sqlx::types::Json(&command.params))
        .bind(&command.requested_by)
        .bind(command.requested_at)
        .bind(command.expires_at)
        .bind(command.status.as_str())
        .bind(sqlx::types::Json(&command.assigned_agent_ids))
        .execute(&mut *tx)
        .await?;

        for agent_id in &command.assigned_agent_ids {
            sqlx::query(
                r#"
                INSERT INTO command_deliveries (command_id, agent_id, status)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(command.id)
            .bind(agent_id)
            .bind(CommandStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(command = %command.id, agents = command.assigned_agent_ids.len(), "command queued");
        Ok(())
    }

    /// Commands awaiting an agent, advancing fresh deliveries to
    /// `delivered`. Idempotent: a re-poll returns the same delivered set
    /// until results arrive or the command expires.
    pub async fn pending_commands_for_agent(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> RegistryResult<Vec<Command>> {
        let mut tx = self.pool().begin().await?;

        let commands = sqlx::query_as::<_, Command>(
            r#"
            SELECT c.* FROM commands c
            JOIN command_deliveries d ON d.command_id = c.id
            WHERE d.agent_id = $1
              AND d.status IN ($2, $3)
              AND c.expires_at > $4
              AND c.status IN ($2, $3)
            ORDER BY c.requested_at
            "#,
        )
        .bind(agent_id)
        .bind(CommandStatus::Pending.as_str())
        .bind(CommandStatus::Delivered.as_str())
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        if !commands.is_empty() {
            sqlx::query(
                r#"
                UPDATE command_deliveries
                SET status = $3, delivered_at = $4
                WHERE agent_id = $1 AND status = $2 AND command_id = ANY($5)
                "#,
            )
            .bind(agent_id)
            .bind(CommandStatus::Pending.as_str())
            .bind(CommandStatus::Delivered.as_str())
            .bind(now)
            .bind(commands.iter().map(|c| c.id).collect::<Vec<_>>())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE commands SET status = $2 WHERE status = $1 AND id = ANY($3)",
            )
            .bind(CommandStatus::Pending.as_str())
            .bind(CommandStatus::Delivered.as_str())
            .bind(commands.iter().map(|c| c.id).collect::<Vec<_>>())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(commands)
    }

    /// Undelivered, unexpired deliveries waiting on an agent; surfaced in
    /// heartbeat responses.
    pub async fn count_pending_commands(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> RegistryResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT count(*) AS n
            FROM command_deliveries d
            JOIN commands c ON c.id = d.command_id
            WHERE d.agent_id = $1 AND d.status = $2 AND c.expires_at > $3
            "#,
        )
        .bind(agent_id)
        .bind(CommandStatus::Pending.as_str())
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("n")?)
    }

    /// Store an agent's result once. A duplicate post is accepted but not
    /// re-stored; returns whether the row was new. When the last assigned
    /// agent reports, the command completes.
    pub async fn record_command_result(&self, result: &CommandResult) -> RegistryResult<bool> {
        let mut tx = self.pool().begin().await?;

        let done = sqlx::query(
            r#"
            INSERT INTO command_results
                (command_id, agent_id, success, error, payload, duration_ms, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (command_id, agent_id) DO NOTHING
            "#,
        )
        .bind(result.command_id)
        .bind(result.agent_id)
        .bind(result.success)
        .bind(&result.error)
        .bind(&result.payload)
        .bind(result.duration_ms)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await?;
        let stored = done.rows_affected() > 0;

        if stored {
            sqlx::query(
                r#"
                UPDATE command_deliveries SET status = $3
                WHERE command_id = $1 AND agent_id = $2
                "#,
            )
            .bind(result.command_id)
            .bind(result.agent_id)
            .bind(CommandStatus::Complete.as_str())
            .execute(&mut *tx)
            .await?;

            let remaining = sqlx::query(
                r#"
                SELECT count(*) AS n FROM command_deliveries
                WHERE command_id = $1 AND status <> $2
                "#,
            )
            .bind(result.command_id)
            .bind(CommandStatus::Complete.as_str())
            .fetch_one(&mut *tx)
            .await?;
            let n: i64 = remaining.try_get("n")?;
            if n == 0 {
                sqlx::query("UPDATE commands SET status = $2 WHERE id = $1")
                    .bind(result.command_id)
                    .bind(CommandStatus::Complete.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(stored)
    }

    /// Expire overdue commands and their unfinished deliveries. Completed
    /// commands are left alone.
    pub async fn expire_commands(&self, now: DateTime<Utc>) -> RegistryResult<u64> {
        let mut tx = self.pool().begin().await?;

        let expired = sqlx::query(
            r#"
            UPDATE commands SET status = $1
            WHERE expires_at <= $2 AND status IN ($3, $4)
            RETURNING id
            "#,
        )
        .bind(CommandStatus::Expired.as_str())
        .bind(now)
        .bind(CommandStatus::Pending.as_str())
        .bind(CommandStatus::Delivered.as_str())
        .fetch_all(&mut *tx)
        .await?;

        if !expired.is_empty() {
            let mut ids = Vec::with_capacity(expired.len());
            for row in &expired {
                let id: CommandId = row.try_get("id")?;
                ids.push(id);
            }
            sqlx::query(
                r#"
                UPDATE command_deliveries SET status = $1
                WHERE command_id = ANY($2) AND status <> $3
                "#,
            )
            .bind(CommandStatus::Expired.as_str())
            .bind(&ids)
            .bind(CommandStatus::Complete.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(expired.len() as u64)
    }

    pub async fn cancel_command(&self, id: CommandId) -> RegistryResult<()> {
        let done = sqlx::query(
            "UPDATE commands SET status = $2 WHERE id = $1 AND status IN ($3, $4)",
        )
        .bind(id)
        .bind(CommandStatus::Cancelled.as_str())
        .bind(CommandStatus::Pending.as_str())
        .bind(CommandStatus::Delivered.as_str())
        .execute(self.pool())
        .await?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::Conflict(format!(
                "command {id} is not cancellable"
            )));
        }
        Ok(())
    }

    pub async fn get_command(&self, id: CommandId) -> RegistryResult<Command> {
        sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("command {id}")))
    }

    pub async fn command_deliveries(&self, id: CommandId) -> RegistryResult<Vec<CommandDelivery>> {
        let deliveries = sqlx::query_as::<_, CommandDelivery>(
            "SELECT * FROM command_deliveries WHERE command_id = $1",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;
        Ok(deliveries)
    }

    pub async fn command_results(&self, id: CommandId) -> RegistryResult<Vec<CommandResult>> {
        let results = sqlx::query_as::<_, CommandResult>(
            "SELECT * FROM command_results WHERE command_id = $1 ORDER BY completed_at",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;
        Ok(results)
    }
}
