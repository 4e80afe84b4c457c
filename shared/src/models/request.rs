//! Support Request Model
//!
//! A support request (ticket) is raised by a requester, routed to the agent
//! on duty and driven through an explicit status machine. SLA compliance is
//! derived purely from elapsed wall-clock time, never cached.

use crate::util::elapsed_minutes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RequestType {
    GeneralInquiry,
    TechnicalSupport,
    BillingInquiry,
    TherapistSupport,
    Emergency,
    Other,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        RequestType::GeneralInquiry,
        RequestType::TechnicalSupport,
        RequestType::BillingInquiry,
        RequestType::TherapistSupport,
        RequestType::Emergency,
        RequestType::Other,
    ];
}

/// Request priority, drives the SLA threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    /// Fixed response threshold in minutes. A request older than this
    /// without resolution is overdue.
    pub fn sla_minutes(&self) -> i64 {
        match self {
            Priority::Urgent => 15,
            Priority::High => 60,
            Priority::Medium => 240,
            Priority::Low => 1440,
        }
    }

    /// SLA policy: overdue once elapsed time exceeds the threshold.
    /// Monotonic in `elapsed`: once true it stays true.
    pub fn is_overdue(&self, elapsed_min: i64) -> bool {
        elapsed_min > self.sla_minutes()
    }
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RequestStatus {
    Pending,
    Assigned,
    InProgress,
    Resolved,
    Escalated,
    Cancelled,
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RequestStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Resolved | RequestStatus::Cancelled)
    }

    /// Central transition table for the forward-biased status machine:
    /// PENDING -> ASSIGNED -> IN_PROGRESS -> RESOLVED, with ESCALATED and
    /// CANCELLED reachable from any non-terminal state. Skipping forward
    /// (e.g. ASSIGNED -> RESOLVED) is allowed; moving backward is not.
    /// CANCELLED is not reachable from RESOLVED.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        if *self == next {
            return true; // idempotent no-op
        }
        match self {
            Pending => matches!(next, Assigned | InProgress | Resolved | Escalated | Cancelled),
            Assigned => matches!(next, InProgress | Resolved | Escalated | Cancelled),
            InProgress => matches!(next, Resolved | Escalated | Cancelled),
            Escalated => matches!(next, Assigned | InProgress | Resolved | Cancelled),
            Resolved | Cancelled => false,
        }
    }
}

/// Support request entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SupportRequest {
    pub id: i64,
    /// External identity of the originator (referenced, never owned)
    pub requester_id: i64,
    /// Agent currently holding the request, if any
    pub assigned_agent_id: Option<i64>,
    /// Shift the request was auto-routed onto, if any
    pub shift_id: Option<i64>,
    pub request_type: RequestType,
    pub priority: Priority,
    pub status: RequestStatus,
    pub description: String,
    pub resolution: Option<String>,
    pub escalation_reason: Option<String>,
    /// Opaque key/value bag supplied by the caller
    #[cfg_attr(feature = "db", sqlx(json))]
    pub metadata: HashMap<String, String>,
    pub notes: Option<String>,
    pub assigned_at: Option<i64>,
    pub started_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub escalated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SupportRequest {
    /// Minutes from creation to first assignment, if assigned.
    pub fn response_time_minutes(&self) -> Option<i64> {
        self.assigned_at.map(|at| elapsed_minutes(self.created_at, at))
    }

    /// Minutes from creation to resolution, if resolved.
    pub fn resolution_time_minutes(&self) -> Option<i64> {
        self.resolved_at.map(|at| elapsed_minutes(self.created_at, at))
    }

    /// SLA check against `now` (epoch millis). Derived on demand and
    /// independent of the stored status.
    pub fn is_overdue(&self, now_ms: i64) -> bool {
        self.priority
            .is_overdue(elapsed_minutes(self.created_at, now_ms))
    }
}

/// Create request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCreate {
    pub requester_id: i64,
    pub request_type: RequestType,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Update request payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Merged into the existing bag, not replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Request list filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
    pub request_type: Option<RequestType>,
    pub priority: Option<Priority>,
    pub assigned_agent_id: Option<i64>,
    pub requester_id: Option<i64>,
    /// Creation-time range, epoch millis
    pub created_from: Option<i64>,
    pub created_to: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
