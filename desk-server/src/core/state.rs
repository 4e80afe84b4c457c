//! Server State
//!
//! Wires configuration, storage, collaborators and services together.
//! All fields are cheap to clone (pool handles and `Arc`s).

use std::sync::Arc;
use std::time::Duration;

use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::db::DbService;
use crate::directory::{AgentDirectory, HttpAgentDirectory, StaticDirectory};
use crate::notify::{HttpNotificationSink, LogSink, NotificationSink};
use crate::services::{
    AutoRouter, DashboardService, ReminderSweep, RoutingService, ShiftService, StatusSweep,
};
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub directory: Arc<dyn AgentDirectory>,
    pub notifier: Arc<dyn NotificationSink>,
    pub shifts: ShiftService,
    pub routing: RoutingService,
    pub dashboard: DashboardService,
}

impl ServerState {
    /// Initialize storage and services from configuration.
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        std::fs::create_dir_all(&config.work_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create work dir: {e}")))?;

        let db = DbService::new(&config.db_path()).await?;
        let pool = db.pool.clone();

        let directory: Arc<dyn AgentDirectory> = match (&config.directory_url, &config.agents_file)
        {
            (Some(url), _) => {
                tracing::info!(url = %url, "Using remote agent directory");
                Arc::new(HttpAgentDirectory::new(url.clone()))
            }
            (None, Some(path)) => Arc::new(StaticDirectory::from_file(path).map_err(|e| {
                AppError::Validation(format!("Failed to load agents file {path}: {e}"))
            })?),
            (None, None) => {
                tracing::warn!("No agent directory configured; every agent lookup will miss");
                Arc::new(StaticDirectory::empty())
            }
        };

        let notifier: Arc<dyn NotificationSink> = match &config.notification_url {
            Some(url) => {
                tracing::info!(url = %url, "Using HTTP notification sink");
                Arc::new(HttpNotificationSink::new(url.clone()))
            }
            None => {
                tracing::info!("No notification service configured; notifications are logged only");
                Arc::new(LogSink)
            }
        };

        let shifts = ShiftService::new(pool.clone(), directory.clone());
        let router = AutoRouter::new(
            pool.clone(),
            shifts.clone(),
            directory.clone(),
            notifier.clone(),
            config.auto_routing_enabled,
        );
        let routing = RoutingService::new(pool.clone(), directory.clone(), notifier.clone(), router);
        let dashboard = DashboardService::new(pool, directory.clone());

        Ok(Self {
            config: config.clone(),
            db,
            directory,
            notifier,
            shifts,
            routing,
            dashboard,
        })
    }

    /// Register the two sweeps with the task manager.
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let reminder = ReminderSweep::new(
            self.db.pool.clone(),
            self.directory.clone(),
            self.notifier.clone(),
            Duration::from_secs(self.config.reminder_interval_secs),
            tasks.shutdown_token(),
        );
        tasks.spawn("reminder_sweep", TaskKind::Periodic, reminder.run());

        let status = StatusSweep::new(
            self.db.pool.clone(),
            Duration::from_secs(self.config.status_interval_secs),
            tasks.shutdown_token(),
        );
        tasks.spawn("status_sweep", TaskKind::Periodic, status.run());
    }
}
