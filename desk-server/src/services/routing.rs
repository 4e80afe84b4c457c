//! Request Routing Service
//!
//! Drives a support request through its lifecycle. Status moves are
//! validated against the transition table before any write, and every
//! write is conditional on the status the service observed, so two actors
//! racing on the same request cannot interleave.

use crate::db::repository::request as request_repo;
use crate::db::repository::request::RequestChanges;
use crate::directory::AgentDirectory;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::services::AutoRouter;
use crate::services::auto_router::RoutingStatus;
use crate::utils::{AppError, AppResult};
use shared::models::{
    Agent, AgentRole, RequestCreate, RequestQuery, RequestStatus, RequestUpdate, SupportRequest,
};
use shared::util::Now;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct RoutingService {
    pool: SqlitePool,
    directory: Arc<dyn AgentDirectory>,
    notifier: Arc<dyn NotificationSink>,
    router: AutoRouter,
}

impl RoutingService {
    pub fn new(
        pool: SqlitePool,
        directory: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn NotificationSink>,
        router: AutoRouter,
    ) -> Self {
        Self {
            pool,
            directory,
            notifier,
            router,
        }
    }

    async fn require_actor(&self, actor_id: i64) -> AppResult<Agent> {
        self.directory
            .resolve(actor_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Agent {actor_id} not found")))
    }

    async fn require_support_agent(&self, agent_id: i64) -> AppResult<Agent> {
        let agent = self.require_actor(agent_id).await?;
        if agent.role == AgentRole::Requester {
            return Err(AppError::validation(format!(
                "Agent {agent_id} is not support staff"
            )));
        }
        Ok(agent)
    }

    async fn load(&self, id: i64) -> AppResult<SupportRequest> {
        request_repo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Request {id} not found")))
    }

    /// Raise a request. Persists PENDING, then gives the auto-router its
    /// single synchronous shot; a router failure is logged, never bubbled
    /// up to the requester.
    pub async fn create(&self, data: RequestCreate, now: Now) -> AppResult<SupportRequest> {
        if data.description.trim().is_empty() {
            return Err(AppError::validation("Description must not be empty"));
        }

        let request = request_repo::create(&self.pool, &data, now.epoch_ms).await?;
        tracing::info!(
            request_id = request.id,
            requester_id = request.requester_id,
            priority = ?request.priority,
            "Support request created"
        );

        if let Err(e) = self.router.route(&request, now).await {
            tracing::error!(request_id = request.id, error = %e, "Auto-routing failed");
        }

        self.load(request.id).await
    }

    /// Actor-scoped read: non-admins only see requests they raised or
    /// currently hold.
    pub async fn get(&self, id: i64, actor_id: i64) -> AppResult<SupportRequest> {
        let request = self.load(id).await?;
        let actor = self.require_actor(actor_id).await?;
        let visible = actor.role.is_privileged()
            || request.requester_id == actor_id
            || request.assigned_agent_id == Some(actor_id);
        if !visible {
            return Err(AppError::forbidden(format!(
                "Request {id} is not visible to agent {actor_id}"
            )));
        }
        Ok(request)
    }

    pub async fn list(&self, query: &RequestQuery) -> AppResult<Vec<SupportRequest>> {
        Ok(request_repo::find_all(&self.pool, query).await?)
    }

    /// General mutation. Non-privileged actors may only touch requests
    /// assigned to them; status changes go through the transition table
    /// and ESCALATED requires a reason.
    pub async fn update(
        &self,
        id: i64,
        patch: RequestUpdate,
        actor_id: i64,
        now: Now,
    ) -> AppResult<SupportRequest> {
        let request = self.load(id).await?;
        let actor = self.require_actor(actor_id).await?;
        if !actor.role.is_privileged() && request.assigned_agent_id != Some(actor_id) {
            return Err(AppError::forbidden(format!(
                "Request {id} is not assigned to agent {actor_id}"
            )));
        }

        if let Some(next) = patch.status {
            if !request.status.can_transition_to(next) {
                return Err(AppError::invalid_state(format!(
                    "Request {id} cannot move from {:?} to {next:?}",
                    request.status
                )));
            }
            if next == RequestStatus::Escalated
                && patch.escalation_reason.is_none()
                && request.escalation_reason.is_none()
            {
                return Err(AppError::validation("Escalation requires a reason"));
            }
        }

        let metadata_json = match &patch.metadata {
            Some(extra) => {
                // Merge into the existing bag rather than replacing it
                let mut merged = request.metadata.clone();
                merged.extend(extra.clone());
                Some(
                    serde_json::to_string(&merged)
                        .map_err(|e| AppError::validation(format!("Invalid metadata: {e}")))?,
                )
            }
            None => None,
        };

        let changes = RequestChanges {
            status: patch.status,
            priority: patch.priority,
            resolution: patch.resolution,
            escalation_reason: patch.escalation_reason,
            notes: patch.notes,
            metadata_json,
        };
        let applied =
            request_repo::apply_update(&self.pool, id, request.status, &changes, now.epoch_ms)
                .await?;
        if !applied {
            return Err(AppError::conflict(format!(
                "Request {id} was modified concurrently"
            )));
        }
        self.load(id).await
    }

    /// Self-assignment: the agent pulls the request and starts working.
    /// Re-take by the current holder is an idempotent no-op; a request
    /// held by someone else is a Conflict.
    pub async fn take(&self, id: i64, agent_id: i64, now: Now) -> AppResult<SupportRequest> {
        self.require_support_agent(agent_id).await?;

        let claimed = request_repo::take(&self.pool, id, agent_id, now.epoch_ms).await?;
        if !claimed {
            // Classify the failed precondition from the current row
            let request = self.load(id).await?;
            if request.status.is_terminal() {
                return Err(AppError::invalid_state(format!(
                    "Request {id} is {:?} and cannot be taken",
                    request.status
                )));
            }
            return Err(AppError::conflict(format!(
                "Request {id} is already held by agent {}",
                request.assigned_agent_id.unwrap_or_default()
            )));
        }

        tracing::info!(request_id = id, agent_id = agent_id, "Request taken");
        self.load(id).await
    }

    /// Admin-directed assignment, independent of who is on shift.
    pub async fn assign(
        &self,
        id: i64,
        agent_id: i64,
        admin_id: i64,
        now: Now,
    ) -> AppResult<SupportRequest> {
        let admin = self.require_actor(admin_id).await?;
        if !admin.role.is_privileged() {
            return Err(AppError::forbidden("Only admins may assign requests"));
        }
        let agent = self.require_support_agent(agent_id).await?;

        let request = self.load(id).await?;
        if !request.status.can_transition_to(RequestStatus::Assigned) {
            return Err(AppError::invalid_state(format!(
                "Request {id} cannot move from {:?} to Assigned",
                request.status
            )));
        }

        let applied =
            request_repo::assign(&self.pool, id, agent_id, request.status, now.epoch_ms).await?;
        if !applied {
            return Err(AppError::conflict(format!(
                "Request {id} was modified concurrently"
            )));
        }

        tracing::info!(request_id = id, agent_id = agent_id, admin_id = admin_id, "Request assigned");

        let notification = Notification {
            kind: NotificationKind::TicketAssigned,
            payload: serde_json::json!({
                "request_id": id,
                "request_type": request.request_type,
                "priority": request.priority,
                "description": request.description,
                "agent_id": agent.id,
                "agent_name": agent.name,
                "agent_email": agent.email,
            }),
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!(request_id = id, error = %e, "Assignment notification failed");
        }

        self.load(id).await
    }

    /// Flag the request for urgent attention. Any resolvable actor may
    /// escalate; the assigned agent (if any) is notified.
    pub async fn escalate(
        &self,
        id: i64,
        reason: &str,
        actor_id: i64,
        now: Now,
    ) -> AppResult<SupportRequest> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("Escalation requires a reason"));
        }
        self.require_actor(actor_id).await?;

        let request = self.load(id).await?;
        if !request.status.can_transition_to(RequestStatus::Escalated) {
            return Err(AppError::invalid_state(format!(
                "Request {id} cannot be escalated from {:?}",
                request.status
            )));
        }

        let changes = RequestChanges {
            status: Some(RequestStatus::Escalated),
            escalation_reason: Some(reason.to_string()),
            ..Default::default()
        };
        let applied =
            request_repo::apply_update(&self.pool, id, request.status, &changes, now.epoch_ms)
                .await?;
        if !applied {
            return Err(AppError::conflict(format!(
                "Request {id} was modified concurrently"
            )));
        }

        tracing::warn!(request_id = id, actor_id = actor_id, reason = %reason, "Request escalated");

        if let Some(agent_id) = request.assigned_agent_id {
            let agent = self.directory.resolve(agent_id).await;
            let notification = Notification {
                kind: NotificationKind::TicketEscalated,
                payload: serde_json::json!({
                    "request_id": id,
                    "reason": reason,
                    "priority": request.priority,
                    "agent_id": agent_id,
                    "agent_name": agent.as_ref().map(|a| a.name.clone()),
                    "agent_email": agent.as_ref().and_then(|a| a.email.clone()),
                }),
            };
            if let Err(e) = self.notifier.send(notification).await {
                tracing::warn!(request_id = id, error = %e, "Escalation notification failed");
            }
        }

        self.load(id).await
    }

    /// Routing snapshot (enabled flag, on-duty and backlog counts).
    pub async fn routing_status(&self) -> AppResult<RoutingStatus> {
        self.router.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::shift as shift_repo;
    use crate::db::test_pool;
    use crate::directory::StaticDirectory;
    use crate::notify::MemorySink;
    use crate::services::ShiftService;
    use chrono::{NaiveDate, NaiveTime};
    use shared::models::{Priority, RequestType, ShiftCreate, ShiftType};
    use std::collections::HashMap;

    const ADMIN: i64 = 1;
    const AGENT: i64 = 42;
    const OTHER_AGENT: i64 = 43;
    const REQUESTER: i64 = 7;

    fn directory() -> Arc<dyn AgentDirectory> {
        let agent = |id, role| Agent {
            id,
            name: format!("agent-{id}"),
            role,
            phone: None,
            email: Some(format!("a{id}@desk.test")),
        };
        Arc::new(StaticDirectory::new(vec![
            agent(ADMIN, AgentRole::Admin),
            agent(AGENT, AgentRole::Support),
            agent(OTHER_AGENT, AgentRole::Support),
            agent(REQUESTER, AgentRole::Requester),
        ]))
    }

    fn at(date: &str, h: u32, m: u32) -> Now {
        let local = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap());
        Now::fixed(local, 1_700_000_000_000)
    }

    async fn service(routing_enabled: bool) -> (RoutingService, Arc<MemorySink>, SqlitePool) {
        let pool = test_pool().await;
        let dir = directory();
        let sink = Arc::new(MemorySink::new());
        let shifts = ShiftService::new(pool.clone(), dir.clone());
        let router = AutoRouter::new(
            pool.clone(),
            shifts,
            dir.clone(),
            sink.clone(),
            routing_enabled,
        );
        let svc = RoutingService::new(pool.clone(), dir, sink.clone(), router);
        (svc, sink, pool)
    }

    fn ticket(priority: Priority) -> RequestCreate {
        RequestCreate {
            requester_id: REQUESTER,
            request_type: RequestType::TechnicalSupport,
            priority: Some(priority),
            description: "screen is blank".into(),
            metadata: HashMap::new(),
        }
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

    #[tokio::test]
    async fn test_create_routes_when_shift_on_duty() {
        let (svc, sink, pool) = service(true).await;
        seed_morning_shift(&pool, "2026-03-10").await;

        let req = svc
            .create(ticket(Priority::Urgent), at("2026-03-10", 9, 0))
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Assigned);
        assert_eq!(req.assigned_agent_id, Some(AGENT));
        assert_eq!(sink.sent_of_kind(NotificationKind::TicketAssigned).len(), 1);
    }

    #[tokio::test]
    async fn test_create_stays_pending_without_coverage() {
        let (svc, _sink, _pool) = service(true).await;
        let req = svc
            .create(ticket(Priority::Urgent), at("2026-03-10", 9, 0))
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.assigned_agent_id, None);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_description() {
        let (svc, _sink, _pool) = service(true).await;
        let mut data = ticket(Priority::Low);
        data.description = "   ".into();
        let err = svc.create(data, at("2026-03-10", 9, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_take_conflict_and_idempotent_retake() {
        let (svc, _sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::High), at("2026-03-10", 9, 0))
            .await
            .unwrap();

        let taken = svc.take(req.id, AGENT, at("2026-03-10", 9, 5)).await.unwrap();
        assert_eq!(taken.status, RequestStatus::InProgress);
        assert_eq!(taken.assigned_at, taken.started_at);

        // Re-take by the same agent succeeds without touching timestamps
        let again = svc.take(req.id, AGENT, at("2026-03-10", 9, 30)).await.unwrap();
        assert_eq!(again.assigned_at, taken.assigned_at);

        // A different agent loses
        let err = svc
            .take(req.id, OTHER_AGENT, at("2026-03-10", 9, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_take_rejects_requester_and_resolved() {
        let (svc, _sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::High), at("2026-03-10", 9, 0))
            .await
            .unwrap();

        let err = svc
            .take(req.id, REQUESTER, at("2026-03-10", 9, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        svc.take(req.id, AGENT, at("2026-03-10", 9, 5)).await.unwrap();
        svc.update(
            req.id,
            RequestUpdate {
                status: Some(RequestStatus::Resolved),
                resolution: Some("rebooted".into()),
                ..Default::default()
            },
            AGENT,
            at("2026-03-10", 10, 0),
        )
        .await
        .unwrap();

        let err = svc
            .take(req.id, AGENT, at("2026-03-10", 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_assign_admin_only_and_notifies() {
        let (svc, sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::High), at("2026-03-10", 9, 0))
            .await
            .unwrap();

        let err = svc
            .assign(req.id, OTHER_AGENT, AGENT, at("2026-03-10", 9, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let assigned = svc
            .assign(req.id, OTHER_AGENT, ADMIN, at("2026-03-10", 9, 6))
            .await
            .unwrap();
        assert_eq!(assigned.status, RequestStatus::Assigned);
        assert_eq!(assigned.assigned_agent_id, Some(OTHER_AGENT));
        assert_eq!(sink.sent_of_kind(NotificationKind::TicketAssigned).len(), 1);
    }

    #[tokio::test]
    async fn test_update_permission_and_transition_table() {
        let (svc, _sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::High), at("2026-03-10", 9, 0))
            .await
            .unwrap();
        svc.take(req.id, AGENT, at("2026-03-10", 9, 5)).await.unwrap();

        // Not the holder, not an admin
        let err = svc
            .update(
                req.id,
                RequestUpdate {
                    notes: Some("mine now".into()),
                    ..Default::default()
                },
                OTHER_AGENT,
                at("2026-03-10", 9, 10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Backward move rejected
        let err = svc
            .update(
                req.id,
                RequestUpdate {
                    status: Some(RequestStatus::Pending),
                    ..Default::default()
                },
                AGENT,
                at("2026-03-10", 9, 11),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        // Resolve, then nothing further
        svc.update(
            req.id,
            RequestUpdate {
                status: Some(RequestStatus::Resolved),
                resolution: Some("replaced cable".into()),
                ..Default::default()
            },
            AGENT,
            at("2026-03-10", 10, 0),
        )
        .await
        .unwrap();

        let err = svc
            .update(
                req.id,
                RequestUpdate {
                    status: Some(RequestStatus::Cancelled),
                    ..Default::default()
                },
                ADMIN,
                at("2026-03-10", 10, 5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_update_merges_metadata() {
        let (svc, _sink, _pool) = service(false).await;
        let mut data = ticket(Priority::Medium);
        data.metadata.insert("room".into(), "12".into());
        let req = svc.create(data, at("2026-03-10", 9, 0)).await.unwrap();

        let updated = svc
            .update(
                req.id,
                RequestUpdate {
                    metadata: Some(HashMap::from([("floor".into(), "3".into())])),
                    ..Default::default()
                },
                ADMIN,
                at("2026-03-10", 9, 30),
            )
            .await
            .unwrap();
        assert_eq!(updated.metadata.get("room").map(String::as_str), Some("12"));
        assert_eq!(updated.metadata.get("floor").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn test_escalate_requires_reason_and_notifies_holder() {
        let (svc, sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::High), at("2026-03-10", 9, 0))
            .await
            .unwrap();
        svc.take(req.id, AGENT, at("2026-03-10", 9, 5)).await.unwrap();

        let err = svc
            .escalate(req.id, "  ", REQUESTER, at("2026-03-10", 11, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let escalated = svc
            .escalate(req.id, "no progress in 2h", REQUESTER, at("2026-03-10", 11, 0))
            .await
            .unwrap();
        assert_eq!(escalated.status, RequestStatus::Escalated);
        assert_eq!(escalated.escalation_reason.as_deref(), Some("no progress in 2h"));
        assert_eq!(sink.sent_of_kind(NotificationKind::TicketEscalated).len(), 1);

        // Escalated can resume to InProgress
        let resumed = svc
            .update(
                req.id,
                RequestUpdate {
                    status: Some(RequestStatus::InProgress),
                    ..Default::default()
                },
                AGENT,
                at("2026-03-10", 11, 30),
            )
            .await
            .unwrap();
        assert_eq!(resumed.status, RequestStatus::InProgress);
    }

    #[tokio::test]
    async fn test_get_visibility() {
        let (svc, _sink, _pool) = service(false).await;
        let req = svc
            .create(ticket(Priority::Low), at("2026-03-10", 9, 0))
            .await
            .unwrap();

        // Requester and admin see it, an unrelated agent does not
        assert!(svc.get(req.id, REQUESTER).await.is_ok());
        assert!(svc.get(req.id, ADMIN).await.is_ok());
        let err = svc.get(req.id, OTHER_AGENT).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Once taken, the holder sees it
        svc.take(req.id, OTHER_AGENT, at("2026-03-10", 9, 5)).await.unwrap();
        assert!(svc.get(req.id, OTHER_AGENT).await.is_ok());
    }
}
