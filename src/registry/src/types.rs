//! # Registry Types
//!
//! Shared identifier aliases, lifecycle enumerations, and the registry error
//! type used by every subsystem of the control plane. Enumerations are stored
//! as lower-case text columns; the `str_enum!` macro keeps the wire text, the
//! database text, and the serde representation in one place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for agents
pub type AgentId = uuid::Uuid;

/// Unique identifier for subnets
pub type SubnetId = uuid::Uuid;

/// Unique identifier for targets
pub type TargetId = uuid::Uuid;

/// Unique identifier for alerts
pub type AlertId = uuid::Uuid;

/// Unique identifier for incidents
pub type IncidentId = uuid::Uuid;

/// Unique identifier for commands
pub type CommandId = uuid::Uuid;

/// Tier names are unique and double as identifiers
pub type TierName = String;

/// Agents heartbeat at this cadence; older heartbeats degrade the agent.
pub const HEARTBEAT_DEGRADED_SECS: i64 = 30;

/// Heartbeats at least this old (or absent) classify the agent offline.
pub const HEARTBEAT_OFFLINE_SECS: i64 = 60;

/// Reserved tier used for targets still in discovery.
pub const DISCOVERY_TIER: &str = "discovery";

/// Reserved tier used to recheck excluded/unresponsive targets.
pub const SMART_RECHECK_TIER: &str = "smart_recheck";

/// Reserved tier used to recheck administratively inactive targets.
pub const INACTIVE_RECHECK_TIER: &str = "inactive_recheck";

/// Reserved tier used for standby representatives (hourly).
pub const STANDBY_RECHECK_TIER: &str = "standby_recheck";

/// All reserved tiers; these are seeded at startup and always `distributed{1}`.
pub const RESERVED_TIERS: [&str; 4] = [
    DISCOVERY_TIER,
    SMART_RECHECK_TIER,
    INACTIVE_RECHECK_TIER,
    STANDBY_RECHECK_TIER,
];

/// Error raised when a text column does not map onto a known enum variant
#[derive(Debug, Clone)]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! str_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// Text form used in the database and on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError::new(stringify!($name), other)),
                }
            }
        }
    };
}

str_enum! {
    /// Derived agent health, never stored directly
    AgentStatus {
        Active => "active",
        Degraded => "degraded",
        Offline => "offline",
    }
}

str_enum! {
    /// Subnet inventory state
    SubnetState {
        Active => "active",
        Archived => "archived",
    }
}

str_enum! {
    /// Classification of a monitored IP
    IpType {
        Gateway => "gateway",
        Infrastructure => "infrastructure",
        Customer => "customer",
    }
}

str_enum! {
    /// Whether the control plane manages the target automatically
    Ownership {
        Auto => "auto",
        Manual => "manual",
    }
}

str_enum! {
    /// How the target entered the system
    Origin {
        Sync => "sync",
        Discovery => "discovery",
        User => "user",
    }
}

str_enum! {
    /// Monitoring lifecycle state of a target
    MonitoringState {
        Unknown => "unknown",
        Active => "active",
        Degraded => "degraded",
        Down => "down",
        Unresponsive => "unresponsive",
        Excluded => "excluded",
        Inactive => "inactive",
        Standby => "standby",
    }
}

str_enum! {
    /// Actor that produced an assignment
    AssignedBy {
        Initial => "initial",
        Rebalancer => "rebalancer",
        Failover => "failover",
        Manual => "manual",
    }
}

str_enum! {
    /// Per-(agent,target) probe health
    PairStatus {
        Healthy => "healthy",
        Degraded => "degraded",
        Down => "down",
        Unknown => "unknown",
    }
}

str_enum! {
    /// Category of an alert
    AlertType {
        Availability => "availability",
        Latency => "latency",
        PacketLoss => "packet_loss",
        AgentDown => "agent_down",
        SecurityViolation => "security_violation",
    }
}

str_enum! {
    /// Alert severity ladder
    AlertSeverity {
        Info => "info",
        Warning => "warning",
        Critical => "critical",
    }
}

impl AlertSeverity {
    /// Numeric rank used for peak/escalation comparisons
    pub fn rank(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

str_enum! {
    /// Alert workflow status
    AlertStatus {
        Active => "active",
        Acknowledged => "acknowledged",
        Resolved => "resolved",
    }
}

str_enum! {
    /// Append-only alert history event kinds
    AlertEventType {
        Created => "created",
        Escalated => "escalated",
        DeEscalated => "de_escalated",
        Acknowledged => "acknowledged",
        LinkedToIncident => "linked_to_incident",
        MetricsUpdated => "metrics_updated",
        Resolved => "resolved",
        Reopened => "reopened",
    }
}

str_enum! {
    /// Blast-radius classification of an incident
    IncidentType {
        Target => "target",
        Agent => "agent",
        Regional => "regional",
        Global => "global",
    }
}

str_enum! {
    /// Incident severity ladder
    IncidentSeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl IncidentSeverity {
    /// Numeric rank used for peak comparisons
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

str_enum! {
    /// Incident workflow status
    IncidentStatus {
        Pending => "pending",
        Active => "active",
        Acknowledged => "acknowledged",
        Resolved => "resolved",
    }
}

str_enum! {
    /// One-shot command lifecycle
    CommandStatus {
        Pending => "pending",
        Delivered => "delivered",
        Complete => "complete",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

str_enum! {
    /// Entity family recorded on the change feed
    EntityKind {
        Agent => "agent",
        Tier => "tier",
        Subnet => "subnet",
        Target => "target",
        Assignment => "assignment",
    }
}

str_enum! {
    /// Kind of mutation recorded on the change feed
    ChangeKind {
        Created => "created",
        Updated => "updated",
        Archived => "archived",
        Deleted => "deleted",
    }
}

str_enum! {
    /// What caused a target state transition
    TransitionTrigger {
        Probe => "probe",
        Sweep => "sweep",
        Manual => "manual",
    }
}

/// How a tier selects agents for its targets.
///
/// Closed-world: adding a case is a deliberate change in the assignment
/// engine, not an extension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Every active candidate probes the target
    All,
    /// Exactly `count` diverse agents probe the target
    Distributed { count: u32 },
    /// `count` agents restricted to the listed regions
    Region { regions: Vec<String>, count: u32 },
}

impl SelectionPolicy {
    /// The number of agents the policy asks for, if bounded
    pub fn required_count(&self) -> Option<u32> {
        match self {
            Self::All => None,
            Self::Distributed { count } => Some(*count),
            Self::Region { count, .. } => Some(*count),
        }
    }

    /// Region restriction, if the policy carries one
    pub fn region_filter(&self) -> Option<&[String]> {
        match self {
            Self::Region { regions, .. } => Some(regions),
            _ => None,
        }
    }
}

/// Error types surfaced by the metadata registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying database failure; callers treat this as transient
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity lookup by id or name found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Write rejected because it conflicts with existing state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed invariant checks before touching the database
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON (de)serialization of a stored document failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_text_round_trips() {
        assert_eq!(MonitoringState::Unresponsive.as_str(), "unresponsive");
        assert_eq!(
            "packet_loss".parse::<AlertType>().unwrap(),
            AlertType::PacketLoss
        );
        assert_eq!(
            "de_escalated".parse::<AlertEventType>().unwrap(),
            AlertEventType::DeEscalated
        );
        assert!("bogus".parse::<MonitoringState>().is_err());
    }

    #[test]
    fn enum_serde_matches_text() {
        let json = serde_json::to_string(&AlertType::PacketLoss).unwrap();
        assert_eq!(json, "\"packet_loss\"");
        let back: AlertType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AlertType::PacketLoss);
    }

    #[test]
    fn severity_rank_orders_the_ladder() {
        assert!(AlertSeverity::Critical.rank() > AlertSeverity::Warning.rank());
        assert!(AlertSeverity::Warning.rank() > AlertSeverity::Info.rank());
        assert!(IncidentSeverity::Critical.rank() > IncidentSeverity::High.rank());
    }

    #[test]
    fn selection_policy_tagged_form() {
        let policy: SelectionPolicy =
            serde_json::from_str(r#"{"policy":"distributed","count":2}"#).unwrap();
        assert_eq!(policy, SelectionPolicy::Distributed { count: 2 });
        assert_eq!(policy.required_count(), Some(2));

        let all: SelectionPolicy = serde_json::from_str(r#"{"policy":"all"}"#).unwrap();
        assert_eq!(all.required_count(), None);

        let region: SelectionPolicy = serde_json::from_str(
            r#"{"policy":"region","regions":["us-east","us-west"],"count":3}"#,
        )
        .unwrap();
        assert_eq!(region.region_filter().unwrap().len(), 2);
    }
}
