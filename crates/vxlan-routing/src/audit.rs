//! Structured audit logging.
//!
//! Audit records capture the control-plane decisions that change which
//! routes a logical router leaks: routing VRF ownership, bridge membership,
//! logical router garbage collection and internal invariant violations.
//! Records are emitted as JSON through `tracing` under the `audit` target so
//! they can be filtered apart from operational logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Logical router state created or garbage-collected
    LogicalRouter,
    /// Routing VRF claimed or released by a routing VN
    RoutingOwnership,
    /// Bridge VN attached to or detached from a logical router
    BridgeMembership,
    /// Internal invariant broken while processing a route
    InvariantViolation,
    /// Daemon startup and shutdown
    SystemLifecycle,
    /// Operator-driven actions
    AdminAction,
    /// Configuration loaded or overridden
    ConfigurationChange,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::LogicalRouter => write!(f, "LOGICAL_ROUTER"),
            AuditCategory::RoutingOwnership => write!(f, "ROUTING_OWNERSHIP"),
            AuditCategory::BridgeMembership => write!(f, "BRIDGE_MEMBERSHIP"),
            AuditCategory::InvariantViolation => write!(f, "INVARIANT_VIOLATION"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// Rejected, e.g. a second routing VN claiming an owned routing VRF
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// Structured audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component generating the event
    pub source: String,

    pub action: String,

    pub outcome: AuditOutcome,

    /// Affected object, e.g. a logical router uuid or VRF name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Examples: "logical_router", "routing_vrf", "bridge_vn"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Groups records produced by one notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time. The outcome starts
    /// as `InProgress`.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the outcome as `Failure`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] under the `audit` target.
///
/// Success is logged at info, in-progress at debug, failure and denial at
/// warn with the error attached.
///
/// ```ignore
/// let record = AuditRecord::new(AuditCategory::RoutingOwnership, "RoutingManager", "bind_routing_vrf")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("vrf-r");
/// audit_log!(record);
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON `tracing` subscriber. `RUST_LOG` overrides `log_level`.
///
/// `log` records from the rest of the workspace are bridged into the
/// subscriber, so this replaces `env_logger` rather than complementing it.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(
            AuditCategory::RoutingOwnership,
            "RoutingManager",
            "bind_routing_vrf",
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id("vrf-r")
        .with_object_type("routing_vrf");

        assert_eq!(record.category, AuditCategory::RoutingOwnership);
        assert_eq!(record.source, "RoutingManager");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("vrf-r".to_string()));
        assert_eq!(record.object_type, Some("routing_vrf".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(
            AuditCategory::InvariantViolation,
            "RoutingManager",
            "route_notify",
        )
        .with_error("unexpected tunnel next hop");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("unexpected tunnel next hop"));
    }

    #[test]
    fn test_audit_record_json_serialization() {
        let record = AuditRecord::new(
            AuditCategory::BridgeMembership,
            "RoutingManager",
            "attach_bridge",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "bridge_vn": "vn1",
            "bridge_vrf": "vrf1"
        }));

        let json = record.to_json();
        assert!(json.contains("BRIDGE_MEMBERSHIP"));
        assert!(json.contains("attach_bridge"));
        assert!(json.contains("\"bridge_vn\":\"vn1\""));
        assert!(!json.contains("correlation_id"));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::LogicalRouter.to_string(), "LOGICAL_ROUTER");
        assert_eq!(AuditCategory::InvariantViolation.to_string(), "INVARIANT_VIOLATION");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
        assert_eq!(AuditOutcome::Denied.to_string(), "denied");
    }
}
