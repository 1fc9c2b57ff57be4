//! Embedded schema bootstrap.
//!
//! The registry owns its tables and creates them on startup. Statements are
//! idempotent so repeated boots are safe; column migrations beyond this are
//! an operational concern, not the registry's.

/// DDL applied in order by `MetadataRegistry::ensure_schema`.
pub(crate) const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        region TEXT NOT NULL,
        location TEXT NOT NULL,
        provider TEXT NOT NULL,
        tags JSONB NOT NULL DEFAULT '{}'::jsonb,
        public_ip TEXT,
        version TEXT,
        executors JSONB NOT NULL DEFAULT '[]'::jsonb,
        max_targets INTEGER NOT NULL,
        api_key_hash TEXT NOT NULL,
        last_heartbeat TIMESTAMPTZ,
        archived_at TIMESTAMPTZ,
        assignment_version_seen BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_metrics_samples (
        id BIGSERIAL PRIMARY KEY,
        agent_id UUID NOT NULL REFERENCES agents(id),
        sampled_at TIMESTAMPTZ NOT NULL,
        cpu_pct DOUBLE PRECISION NOT NULL,
        memory_pct DOUBLE PRECISION NOT NULL,
        active_targets INTEGER NOT NULL,
        probes_per_second DOUBLE PRECISION NOT NULL,
        error_count INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_agent_metrics_agent_time
        ON agent_metrics_samples (agent_id, sampled_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tiers (
        name TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        probe_interval_secs INTEGER NOT NULL,
        probe_timeout_ms INTEGER NOT NULL,
        probe_retries INTEGER NOT NULL,
        selection_policy JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subnets (
        id UUID PRIMARY KEY,
        network TEXT NOT NULL,
        network_size INTEGER NOT NULL,
        gateway_ip TEXT,
        first_usable TEXT NOT NULL,
        last_usable TEXT NOT NULL,
        pilot_subnet_id TEXT,
        vlan_id TEXT,
        service_id TEXT,
        subscriber_id TEXT,
        location_id TEXT,
        subscriber_name TEXT,
        city TEXT,
        region TEXT,
        pop_name TEXT,
        gateway_device TEXT,
        state TEXT NOT NULL,
        max_representatives INTEGER,
        archived_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS targets (
        id UUID PRIMARY KEY,
        ip TEXT NOT NULL,
        subnet_id UUID REFERENCES subnets(id),
        tier TEXT NOT NULL REFERENCES tiers(name),
        ip_type TEXT NOT NULL,
        ownership TEXT NOT NULL,
        origin TEXT NOT NULL,
        tags JSONB NOT NULL DEFAULT '{}'::jsonb,
        display_name TEXT,
        expected_outcome BOOLEAN,
        monitoring_state TEXT NOT NULL,
        state_changed_at TIMESTAMPTZ NOT NULL,
        needs_review BOOLEAN NOT NULL DEFAULT FALSE,
        first_response_at TIMESTAMPTZ,
        baseline_established_at TIMESTAMPTZ,
        last_response_at TIMESTAMPTZ,
        discovery_attempts INTEGER NOT NULL DEFAULT 0,
        is_representative BOOLEAN NOT NULL DEFAULT FALSE,
        under_assigned BOOLEAN NOT NULL DEFAULT FALSE,
        archived_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_targets_subnet ON targets (subnet_id)
        WHERE archived_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_targets_state ON targets (monitoring_state)
        WHERE archived_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS target_state_history (
        id BIGSERIAL PRIMARY KEY,
        target_id UUID NOT NULL REFERENCES targets(id),
        from_state TEXT,
        to_state TEXT NOT NULL,
        trigger TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignments (
        id UUID PRIMARY KEY,
        target_id UUID NOT NULL REFERENCES targets(id),
        agent_id UUID NOT NULL REFERENCES agents(id),
        tier TEXT NOT NULL,
        assigned_at TIMESTAMPTZ NOT NULL,
        assigned_by TEXT NOT NULL,
        UNIQUE (target_id, agent_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_assignments_agent ON assignments (agent_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignment_history (
        id BIGSERIAL PRIMARY KEY,
        target_id UUID NOT NULL,
        agent_id UUID NOT NULL,
        action TEXT NOT NULL,
        assigned_by TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignment_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        version BIGINT NOT NULL
    )
    "#,
    r#"
    INSERT INTO assignment_meta (id, version) VALUES (1, 0)
        ON CONFLICT (id) DO NOTHING
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entity_changes (
        id BIGSERIAL PRIMARY KEY,
        version BIGINT NOT NULL,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        change_kind TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_entity_changes_version ON entity_changes (version)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_target_state (
        agent_id UUID NOT NULL,
        target_id UUID NOT NULL,
        status TEXT NOT NULL,
        status_since TIMESTAMPTZ NOT NULL,
        current_z_score DOUBLE PRECISION,
        current_packet_loss DOUBLE PRECISION,
        current_latency_ms DOUBLE PRECISION,
        anomaly_start TIMESTAMPTZ,
        consecutive_anomalies INTEGER NOT NULL DEFAULT 0,
        consecutive_successes INTEGER NOT NULL DEFAULT 0,
        last_probe_time TIMESTAMPTZ,
        PRIMARY KEY (agent_id, target_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS baselines (
        agent_id UUID NOT NULL,
        target_id UUID NOT NULL,
        latency_p50 DOUBLE PRECISION NOT NULL,
        latency_p95 DOUBLE PRECISION NOT NULL,
        latency_p99 DOUBLE PRECISION NOT NULL,
        stddev DOUBLE PRECISION NOT NULL,
        packet_loss_baseline DOUBLE PRECISION NOT NULL,
        sample_count BIGINT NOT NULL,
        first_seen TIMESTAMPTZ NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL,
        recent_samples JSONB NOT NULL DEFAULT '[]'::jsonb,
        PRIMARY KEY (agent_id, target_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS probe_results (
        agent_id UUID NOT NULL,
        target_id UUID NOT NULL,
        ts TIMESTAMPTZ NOT NULL,
        success BOOLEAN NOT NULL,
        latency_ms DOUBLE PRECISION,
        packet_loss_pct DOUBLE PRECISION NOT NULL,
        rtt_samples JSONB NOT NULL DEFAULT '[]'::jsonb,
        agent_region TEXT NOT NULL,
        target_region TEXT NOT NULL,
        is_in_market BOOLEAN NOT NULL,
        PRIMARY KEY (agent_id, target_id, ts)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_probe_results_target_time
        ON probe_results (target_id, ts DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id UUID PRIMARY KEY,
        target_id UUID NOT NULL,
        target_ip TEXT NOT NULL,
        agent_id UUID,
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        status TEXT NOT NULL,
        initial_severity TEXT NOT NULL,
        peak_severity TEXT NOT NULL,
        initial_latency_ms DOUBLE PRECISION,
        peak_latency_ms DOUBLE PRECISION,
        current_latency_ms DOUBLE PRECISION,
        initial_packet_loss DOUBLE PRECISION,
        peak_packet_loss DOUBLE PRECISION,
        current_packet_loss DOUBLE PRECISION,
        detected_at TIMESTAMPTZ NOT NULL,
        last_updated_at TIMESTAMPTZ NOT NULL,
        acknowledged_at TIMESTAMPTZ,
        acknowledged_by TEXT,
        resolved_at TIMESTAMPTZ,
        incident_id UUID,
        correlation_key TEXT NOT NULL,
        subnet_snapshot JSONB
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_alerts_active ON alerts (target_id, alert_type)
        WHERE status <> 'resolved'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_alerts_correlation ON alerts (correlation_key)
        WHERE status <> 'resolved'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alert_events (
        id BIGSERIAL PRIMARY KEY,
        alert_id UUID NOT NULL REFERENCES alerts(id),
        event_type TEXT NOT NULL,
        old_severity TEXT,
        new_severity TEXT,
        old_status TEXT,
        new_status TEXT,
        latency_ms DOUBLE PRECISION,
        packet_loss_pct DOUBLE PRECISION,
        triggered_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS incidents (
        id UUID PRIMARY KEY,
        incident_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        primary_entity TEXT NOT NULL,
        affected_target_ids JSONB NOT NULL DEFAULT '[]'::jsonb,
        affected_agent_ids JSONB NOT NULL DEFAULT '[]'::jsonb,
        detected_at TIMESTAMPTZ NOT NULL,
        confirmed_at TIMESTAMPTZ,
        resolved_at TIMESTAMPTZ,
        peak_latency_ms DOUBLE PRECISION,
        peak_packet_loss DOUBLE PRECISION,
        status TEXT NOT NULL,
        alert_ids JSONB NOT NULL DEFAULT '[]'::jsonb,
        alert_count INTEGER NOT NULL DEFAULT 0,
        last_alert_at TIMESTAMPTZ,
        correlation_key TEXT NOT NULL,
        evolution_history JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_incidents_key ON incidents (correlation_key)
        WHERE status <> 'resolved'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id UUID PRIMARY KEY,
        command_type TEXT NOT NULL,
        target_id UUID NOT NULL,
        target_ip TEXT NOT NULL,
        params JSONB NOT NULL DEFAULT '{}'::jsonb,
        requested_by TEXT NOT NULL,
        requested_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL,
        assigned_agent_ids JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_deliveries (
        command_id UUID NOT NULL REFERENCES commands(id),
        agent_id UUID NOT NULL,
        status TEXT NOT NULL,
        delivered_at TIMESTAMPTZ,
        PRIMARY KEY (command_id, agent_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_results (
        command_id UUID NOT NULL,
        agent_id UUID NOT NULL,
        success BOOLEAN NOT NULL,
        error TEXT,
        payload BYTEA NOT NULL DEFAULT ''::bytea,
        duration_ms BIGINT NOT NULL,
        completed_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (command_id, agent_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS runtime_config (
        key TEXT PRIMARY KEY,
        value JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];
