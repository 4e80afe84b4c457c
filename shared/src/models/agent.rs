//! Agent Directory Types
//!
//! Agents live in an external directory; the desk only ever references
//! them by id and resolves contact details at read time.

use serde::{Deserialize, Serialize};

/// Role within the support platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Admin,
    Support,
    Requester,
}

impl AgentRole {
    /// Admins may act on any record.
    pub fn is_privileged(&self) -> bool {
        matches!(self, AgentRole::Admin)
    }
}

/// Directory entry for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub role: AgentRole,
    /// SMS target, if the agent registered one
    pub phone: Option<String>,
    pub email: Option<String>,
}
