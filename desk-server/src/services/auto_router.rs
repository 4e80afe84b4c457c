//! Auto-Router
//!
//! Routes a freshly created request to whoever is on duty right now.
//! Invoked synchronously on creation, at most once per request: a miss
//! (no covering shift, routing disabled, or a lost race) leaves the
//! request PENDING and nothing retries it later.
//!
//! Enablement is plain injected configuration, fixed at construction.

use crate::db::repository::{request as request_repo, shift as shift_repo};
use crate::directory::AgentDirectory;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::services::ShiftService;
use crate::utils::AppResult;
use serde::Serialize;
use shared::models::{Shift, SupportRequest};
use shared::util::Now;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Read-only routing snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingStatus {
    pub enabled: bool,
    pub active_shifts: i64,
    pub pending_requests: i64,
}

#[derive(Clone)]
pub struct AutoRouter {
    pool: SqlitePool,
    shifts: ShiftService,
    directory: Arc<dyn AgentDirectory>,
    notifier: Arc<dyn NotificationSink>,
    enabled: bool,
}

impl AutoRouter {
    pub fn new(
        pool: SqlitePool,
        shifts: ShiftService,
        directory: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn NotificationSink>,
        enabled: bool,
    ) -> Self {
        Self {
            pool,
            shifts,
            directory,
            notifier,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Try to route `request` onto the shift covering `now`. Returns the
    /// shift on success, `None` on any miss.
    pub async fn route(&self, request: &SupportRequest, now: Now) -> AppResult<Option<Shift>> {
        if !self.enabled {
            tracing::debug!(request_id = request.id, "Auto-routing disabled, request stays pending");
            return Ok(None);
        }

        let Some(shift) = self.shifts.current_active(now).await? else {
            tracing::info!(
                request_id = request.id,
                "No shift on duty, request stays pending"
            );
            return Ok(None);
        };

        let claimed = request_repo::route_pending(
            &self.pool,
            request.id,
            shift.assigned_agent_id,
            shift.id,
            now.epoch_ms,
        )
        .await?;
        if !claimed {
            // Someone took or assigned the request between create and here
            tracing::debug!(request_id = request.id, "Request no longer routable");
            return Ok(None);
        }

        tracing::info!(
            request_id = request.id,
            shift_id = shift.id,
            agent_id = shift.assigned_agent_id,
            "Request auto-routed to on-duty agent"
        );

        let agent = self.directory.resolve(shift.assigned_agent_id).await;
        let notification = Notification {
            kind: NotificationKind::TicketAssigned,
            payload: serde_json::json!({
                "request_id": request.id,
                "request_type": request.request_type,
                "priority": request.priority,
                "description": request.description,
                "shift_id": shift.id,
                "agent_id": shift.assigned_agent_id,
                "agent_name": agent.as_ref().map(|a| a.name.clone()),
                "agent_email": agent.as_ref().and_then(|a| a.email.clone()),
            }),
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!(request_id = request.id, error = %e, "Assignment notification failed");
        }

        Ok(Some(shift))
    }

    /// Routing snapshot for operators.
    pub async fn status(&self) -> AppResult<RoutingStatus> {
        Ok(RoutingStatus {
            enabled: self.enabled,
            active_shifts: shift_repo::count_active(&self.pool).await?,
            pending_requests: request_repo::count_pending(&self.pool).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::directory::StaticDirectory;
    use crate::notify::MemorySink;
    use chrono::{NaiveDate, NaiveTime};
    use shared::models::{
        Agent, AgentRole, Priority, RequestCreate, RequestStatus, RequestType, ShiftCreate,
        ShiftType,
    };
    use std::collections::HashMap;

    const AGENT: i64 = 42;

    fn directory() -> Arc<dyn AgentDirectory> {
        Arc::new(StaticDirectory::new(vec![Agent {
            id: AGENT,
            name: "On Duty".into(),
            role: AgentRole::Support,
            phone: Some("+34600000002".into()),
            email: Some("duty@desk.test".into()),
        }]))
    }

    fn at(date: &str, h: u32, m: u32) -> Now {
        let local = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap());
        Now::fixed(local, 1_700_000_000_000)
    }

    async fn router(enabled: bool) -> (AutoRouter, Arc<MemorySink>, SqlitePool) {
        let pool = test_pool().await;
        let dir = directory();
        let sink = Arc::new(MemorySink::new());
        let shifts = ShiftService::new(pool.clone(), dir.clone());
        let router = AutoRouter::new(pool.clone(), shifts, dir, sink.clone(), enabled);
        (router, sink, pool)
    }

    async fn seed_morning_shift(pool: &SqlitePool, date: &str) {
        shift_repo::create(
            pool,
            &ShiftCreate {
                shift_type: ShiftType::Morning,
                shift_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                assigned_agent_id: AGENT,
                notes: None,
            },
            1000,
        )
        .await
        .unwrap();
    }

    async fn seed_request(pool: &SqlitePool) -> SupportRequest {
        request_repo::create(
            pool,
            &RequestCreate {
                requester_id: 7,
                request_type: RequestType::TechnicalSupport,
                priority: Some(Priority::High),
                description: "login broken".into(),
                metadata: HashMap::new(),
            },
            2000,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_routes_to_covering_shift_and_notifies() {
        let (router, sink, pool) = router(true).await;
        seed_morning_shift(&pool, "2026-03-10").await;
        let req = seed_request(&pool).await;

        let shift = router.route(&req, at("2026-03-10", 9, 0)).await.unwrap();
        assert!(shift.is_some());

        let req = request_repo::find_by_id(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Assigned);
        assert_eq!(req.assigned_agent_id, Some(AGENT));
        assert!(req.shift_id.is_some());

        let sent = sink.sent_of_kind(NotificationKind::TicketAssigned);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload["agent_name"], "On Duty");
    }

    #[tokio::test]
    async fn test_no_covering_shift_leaves_pending() {
        let (router, sink, pool) = router(true).await;
        seed_morning_shift(&pool, "2026-03-10").await;
        let req = seed_request(&pool).await;

        // 14:00 falls in the unstaffed afternoon gap
        let shift = router.route(&req, at("2026-03-10", 14, 0)).await.unwrap();
        assert!(shift.is_none());

        let req = request_repo::find_by_id(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_router_never_assigns() {
        let (router, sink, pool) = router(false).await;
        seed_morning_shift(&pool, "2026-03-10").await;
        let req = seed_request(&pool).await;

        let shift = router.route(&req, at("2026-03-10", 9, 0)).await.unwrap();
        assert!(shift.is_none());

        let req = request_repo::find_by_id(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let (router, _sink, pool) = router(true).await;
        seed_request(&pool).await;
        seed_request(&pool).await;

        let status = router.status().await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.active_shifts, 0);
        assert_eq!(status.pending_requests, 2);
    }
}
