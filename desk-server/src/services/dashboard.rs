//! Dashboard Aggregator
//!
//! Read-only rollup over a creation-time range: counts by status, type and
//! priority, mean response/resolution minutes, the live overdue listing
//! (SLA policy applied at read time) and the head of the most recent
//! requests. Nothing here caches; every call recomputes from storage.

use crate::db::repository::{request as request_repo, shift as shift_repo};
use crate::directory::AgentDirectory;
use crate::utils::{AppError, AppResult};
use serde::Serialize;
use shared::models::{AgentRole, RequestQuery, SupportRequest};
use shared::util::Now;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

const RECENT_HEAD: i64 = 20;

/// Aggregate view, counts keyed by wire names (SCREAMING_SNAKE_CASE).
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_requests: i64,
    pub by_status: HashMap<String, i64>,
    pub by_type: HashMap<String, i64>,
    pub by_priority: HashMap<String, i64>,
    /// Mean minutes from creation to first assignment (assigned rows only)
    pub avg_response_minutes: Option<f64>,
    /// Mean minutes from creation to resolution (resolved rows only)
    pub avg_resolution_minutes: Option<f64>,
    pub active_shifts: i64,
    /// ASSIGNED / IN_PROGRESS requests past their SLA threshold at `now`
    pub overdue: Vec<SupportRequest>,
    /// Newest requests in range, capped
    pub recent: Vec<SupportRequest>,
}

#[derive(Clone)]
pub struct DashboardService {
    pool: SqlitePool,
    directory: Arc<dyn AgentDirectory>,
}

impl DashboardService {
    pub fn new(pool: SqlitePool, directory: Arc<dyn AgentDirectory>) -> Self {
        Self { pool, directory }
    }

    /// Build the summary for `[from_ms, to_ms)`. Requesters get Forbidden;
    /// the dashboard is a staff surface.
    pub async fn summary(
        &self,
        from_ms: i64,
        to_ms: i64,
        actor_id: i64,
        now: Now,
    ) -> AppResult<DashboardSummary> {
        let actor = self
            .directory
            .resolve(actor_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Agent {actor_id} not found")))?;
        if actor.role == AgentRole::Requester {
            return Err(AppError::forbidden("Dashboard is restricted to support staff"));
        }

        let by_status: HashMap<String, i64> = request_repo::count_by_status(&self.pool, from_ms, to_ms)
            .await?
            .into_iter()
            .collect();
        let by_type: HashMap<String, i64> = request_repo::count_by_type(&self.pool, from_ms, to_ms)
            .await?
            .into_iter()
            .collect();
        let by_priority: HashMap<String, i64> =
            request_repo::count_by_priority(&self.pool, from_ms, to_ms)
                .await?
                .into_iter()
                .collect();
        let total_requests = by_status.values().sum();

        let overdue = request_repo::find_open_assigned(&self.pool)
            .await?
            .into_iter()
            .filter(|r| r.is_overdue(now.epoch_ms))
            .collect();

        let recent = request_repo::find_all(
            &self.pool,
            &RequestQuery {
                created_from: Some(from_ms),
                created_to: Some(to_ms),
                limit: Some(RECENT_HEAD),
                ..Default::default()
            },
        )
        .await?;

        Ok(DashboardSummary {
            total_requests,
            by_status,
            by_type,
            by_priority,
            avg_response_minutes: request_repo::avg_response_minutes(&self.pool, from_ms, to_ms)
                .await?,
            avg_resolution_minutes: request_repo::avg_resolution_minutes(&self.pool, from_ms, to_ms)
                .await?,
            active_shifts: shift_repo::count_active(&self.pool).await?,
            overdue,
            recent,
        })
    }
}
