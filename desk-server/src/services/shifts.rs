//! Shift Lifecycle Service
//!
//! Enforces who may do what to a shift and when:
//! - create/update re-validate the agent against the directory
//! - delete only while SCHEDULED, by an admin or the assigned agent
//! - start/end only by the assigned agent, start only inside the window
//!
//! Status moves go through compare-and-swap updates; a lost race surfaces
//! as Conflict rather than silently overwriting.

use crate::db::repository::shift as shift_repo;
use crate::directory::AgentDirectory;
use crate::utils::{AppError, AppResult};
use shared::models::{Agent, AgentRole, Shift, ShiftCreate, ShiftQuery, ShiftStatus, ShiftUpdate};
use shared::util::Now;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct ShiftService {
    pool: SqlitePool,
    directory: Arc<dyn AgentDirectory>,
}

impl ShiftService {
    pub fn new(pool: SqlitePool, directory: Arc<dyn AgentDirectory>) -> Self {
        Self { pool, directory }
    }

    /// Resolve an agent id and require a staffable role.
    async fn require_support_agent(&self, agent_id: i64) -> AppResult<Agent> {
        let agent = self
            .directory
            .resolve(agent_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Agent {agent_id} not found")))?;
        if agent.role == AgentRole::Requester {
            return Err(AppError::validation(format!(
                "Agent {agent_id} is not support staff"
            )));
        }
        Ok(agent)
    }

    async fn require_actor(&self, actor_id: i64) -> AppResult<Agent> {
        self.directory
            .resolve(actor_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Agent {actor_id} not found")))
    }

    pub async fn get(&self, id: i64) -> AppResult<Shift> {
        shift_repo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Shift {id} not found")))
    }

    pub async fn list(&self, query: &ShiftQuery) -> AppResult<Vec<Shift>> {
        Ok(shift_repo::find_all(&self.pool, query).await?)
    }

    /// Schedule a shift. The `(date, type)` slot must be free of live
    /// shifts and the agent must resolve to support staff.
    pub async fn create(&self, data: ShiftCreate, now: Now) -> AppResult<Shift> {
        self.require_support_agent(data.assigned_agent_id).await?;
        let shift = shift_repo::create(&self.pool, &data, now.epoch_ms).await?;
        tracing::info!(
            shift_id = shift.id,
            shift_type = ?shift.shift_type,
            date = %shift.shift_date,
            agent_id = shift.assigned_agent_id,
            "Shift scheduled"
        );
        Ok(shift)
    }

    /// Re-assignment, status override, notes. A new agent is re-validated
    /// against the directory.
    pub async fn update(&self, id: i64, data: ShiftUpdate, now: Now) -> AppResult<Shift> {
        if let Some(agent_id) = data.assigned_agent_id {
            self.require_support_agent(agent_id).await?;
        }
        Ok(shift_repo::update(&self.pool, id, &data, now.epoch_ms).await?)
    }

    /// Remove a SCHEDULED shift. Only an admin or the assigned agent may
    /// delete; anything past SCHEDULED is immutable history.
    pub async fn delete(&self, id: i64, actor_id: i64) -> AppResult<()> {
        let shift = self.get(id).await?;
        let actor = self.require_actor(actor_id).await?;
        if !actor.role.is_privileged() && shift.assigned_agent_id != actor_id {
            return Err(AppError::forbidden(
                "Only an admin or the assigned agent may delete a shift",
            ));
        }
        if shift.status != ShiftStatus::Scheduled {
            return Err(AppError::invalid_state(format!(
                "Shift {id} is {:?}, only SCHEDULED shifts can be deleted",
                shift.status
            )));
        }
        if !shift_repo::delete_scheduled(&self.pool, id).await? {
            return Err(AppError::conflict(format!(
                "Shift {id} was modified concurrently"
            )));
        }
        tracing::info!(shift_id = id, actor_id = actor_id, "Shift deleted");
        Ok(())
    }

    /// Check in: SCHEDULED -> ACTIVE by the assigned agent, only while the
    /// shift's window contains `now`.
    pub async fn start(&self, id: i64, actor_id: i64, now: Now) -> AppResult<Shift> {
        let shift = self.get(id).await?;
        if shift.assigned_agent_id != actor_id {
            return Err(AppError::forbidden(
                "Only the assigned agent may start a shift",
            ));
        }
        if shift.status != ShiftStatus::Scheduled {
            return Err(AppError::invalid_state(format!(
                "Shift {id} is {:?}, expected SCHEDULED",
                shift.status
            )));
        }
        if !shift.is_window_open(now.local) {
            return Err(AppError::invalid_state(format!(
                "Shift {id} window ({} - {}) is not open",
                shift.start_time, shift.end_time
            )));
        }
        let moved = shift_repo::update_status(
            &self.pool,
            id,
            ShiftStatus::Scheduled,
            ShiftStatus::Active,
            now.epoch_ms,
        )
        .await?;
        if !moved {
            return Err(AppError::conflict(format!(
                "Shift {id} was modified concurrently"
            )));
        }
        tracing::info!(shift_id = id, agent_id = actor_id, "Shift started");
        self.get(id).await
    }

    /// Check out: ACTIVE -> COMPLETED by the assigned agent.
    pub async fn end(&self, id: i64, actor_id: i64, now: Now) -> AppResult<Shift> {
        let shift = self.get(id).await?;
        if shift.assigned_agent_id != actor_id {
            return Err(AppError::forbidden(
                "Only the assigned agent may end a shift",
            ));
        }
        if shift.status != ShiftStatus::Active {
            return Err(AppError::invalid_state(format!(
                "Shift {id} is {:?}, expected ACTIVE",
                shift.status
            )));
        }
        let moved = shift_repo::update_status(
            &self.pool,
            id,
            ShiftStatus::Active,
            ShiftStatus::Completed,
            now.epoch_ms,
        )
        .await?;
        if !moved {
            return Err(AppError::conflict(format!(
                "Shift {id} was modified concurrently"
            )));
        }
        tracing::info!(shift_id = id, agent_id = actor_id, "Shift completed");
        self.get(id).await
    }

    /// The shift currently covering `now`: today's SCHEDULED/ACTIVE shifts
    /// whose window contains the wall clock, first match.
    pub async fn current_active(&self, now: Now) -> AppResult<Option<Shift>> {
        let today = now.local.date().format("%Y-%m-%d").to_string();
        let shifts = shift_repo::find_open_for_date(&self.pool, &today).await?;
        Ok(shifts.into_iter().find(|s| s.is_window_open(now.local)))
    }
}
