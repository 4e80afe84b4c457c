//! Agent Directory
//!
//! Agents (admins, support staff, requesters) live in an external identity
//! service; the desk only references them by id. This module is the
//! read-only seam: an in-memory directory for standalone/dev/test use and
//! an HTTP client for a remote directory.

use async_trait::async_trait;
use shared::models::{Agent, AgentRole};
use std::collections::HashMap;

/// Read-only view of the agent population.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Resolve an agent by id. An unreachable remote directory resolves to
    /// `None`; callers surface that as NotFound.
    async fn resolve(&self, id: i64) -> Option<Agent>;

    /// List agents, optionally filtered by role.
    async fn list(&self, role: Option<AgentRole>) -> Vec<Agent>;
}

/// In-memory directory seeded at startup (or by tests).
pub struct StaticDirectory {
    agents: HashMap<i64, Agent>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Load the seed file: a JSON array of agents.
    pub fn from_file(path: &str) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let agents: Vec<Agent> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tracing::info!(count = agents.len(), path = %path, "Loaded agent directory seed");
        Ok(Self::new(agents))
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn resolve(&self, id: i64) -> Option<Agent> {
        self.agents.get(&id).cloned()
    }

    async fn list(&self, role: Option<AgentRole>) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .agents
            .values()
            .filter(|a| role.is_none_or(|r| a.role == r))
            .cloned()
            .collect();
        agents.sort_by_key(|a| a.id);
        agents
    }
}

/// Remote directory over HTTP (`GET {base}/agents/{id}`,
/// `GET {base}/agents?role=...`). Lookup failures are logged and treated
/// as absent.
pub struct HttpAgentDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AgentDirectory for HttpAgentDirectory {
    async fn resolve(&self, id: i64) -> Option<Agent> {
        let url = format!("{}/agents/{id}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Agent>().await {
                Ok(agent) => Some(agent),
                Err(e) => {
                    tracing::warn!(agent_id = id, error = %e, "Malformed agent directory response");
                    None
                }
            },
            Ok(resp) => {
                tracing::debug!(agent_id = id, status = %resp.status(), "Agent not found in directory");
                None
            }
            Err(e) => {
                tracing::warn!(agent_id = id, error = %e, "Agent directory unreachable");
                None
            }
        }
    }

    async fn list(&self, role: Option<AgentRole>) -> Vec<Agent> {
        let mut req = self.client.get(format!("{}/agents", self.base_url));
        if let Some(role) = role {
            // Roles are wire-named SCREAMING_SNAKE_CASE
            if let Ok(value) = serde_json::to_value(role)
                && let Some(name) = value.as_str()
            {
                req = req.query(&[("role", name)]);
            }
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Vec<Agent>>().await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Malformed agent directory list response");
                    Vec::new()
                })
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Agent directory list failed");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Agent directory unreachable");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: i64, role: AgentRole) -> Agent {
        Agent {
            id,
            name: format!("agent-{id}"),
            role,
            phone: Some("+34600000000".into()),
            email: Some(format!("agent{id}@desk.test")),
        }
    }

    #[tokio::test]
    async fn test_static_directory_resolve_and_filter() {
        let dir = StaticDirectory::new(vec![
            agent(1, AgentRole::Admin),
            agent(2, AgentRole::Support),
            agent(3, AgentRole::Support),
            agent(4, AgentRole::Requester),
        ]);

        assert_eq!(dir.resolve(2).await.map(|a| a.id), Some(2));
        assert!(dir.resolve(99).await.is_none());

        let support = dir.list(Some(AgentRole::Support)).await;
        assert_eq!(support.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(dir.list(None).await.len(), 4);
    }
}
