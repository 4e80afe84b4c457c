/// Server configuration - all knobs of the desk node
///
/// # Environment variables
///
/// Every knob can be overridden through an environment variable:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | /var/lib/desk | Working directory (database, logs) |
/// | DATABASE_PATH | {WORK_DIR}/desk.db | SQLite file path |
/// | LOG_LEVEL | info | tracing level filter |
/// | LOG_DIR | (stdout only) | Daily-rolling log file directory |
/// | REMINDER_INTERVAL_SECS | 300 | Reminder sweep period |
/// | STATUS_INTERVAL_SECS | 3600 | Shift status sweep period |
/// | AUTO_ROUTING_ENABLED | true | Route new requests to the on-duty agent |
/// | NOTIFICATION_URL | (log only) | Notification service base URL |
/// | DIRECTORY_URL | (in-memory) | Remote agent directory base URL |
/// | AGENTS_FILE | (none) | JSON seed file for the in-memory directory |
/// | ENVIRONMENT | development | development / staging / production |
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for database and log files
    pub work_dir: String,
    /// SQLite database file, defaults to `{work_dir}/desk.db`
    pub database_path: Option<String>,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// Reminder sweep period (seconds). Must stay below the 5-minute
    /// reminder window width or reminders can be skipped entirely.
    pub reminder_interval_secs: u64,
    /// Shift status sweep period (seconds)
    pub status_interval_secs: u64,
    /// Whether new requests are auto-routed to the active shift
    pub auto_routing_enabled: bool,
    /// Notification service base URL; unset means reminders are only logged
    pub notification_url: Option<String>,
    /// Remote agent directory base URL; unset means in-memory directory
    pub directory_url: Option<String>,
    /// JSON file seeding the in-memory agent directory
    pub agents_file: Option<String>,
    /// development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/desk".into()),
            database_path: std::env::var("DATABASE_PATH").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
            reminder_interval_secs: std::env::var("REMINDER_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            status_interval_secs: std::env::var("STATUS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            auto_routing_enabled: std::env::var("AUTO_ROUTING_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            notification_url: std::env::var("NOTIFICATION_URL").ok(),
            directory_url: std::env::var("DIRECTORY_URL").ok(),
            agents_file: std::env::var("AGENTS_FILE").ok(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// Effective SQLite file path.
    pub fn db_path(&self) -> String {
        self.database_path
            .clone()
            .unwrap_or_else(|| format!("{}/desk.db", self.work_dir))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
