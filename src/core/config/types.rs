use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) database: DatabaseSettings,
    pub(super) grading: GradingSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub postgres_server: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

/// Background sweep cadence plus the knobs handed to the engine itself.
#[derive(Debug, Clone)]
pub struct GradingSettings {
    pub sweep_interval_seconds: u64,
    pub recovery_interval_seconds: u64,
    pub engine: EngineSettings,
}

/// Engine behaviour that does not depend on the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Bound on internal retries after an optimistic-concurrency conflict.
    pub max_conflict_retries: u32,
    /// Whether students see interim scores explicitly labelled as provisional.
    pub label_provisional: bool,
    pub max_feedback_length: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_conflict_retries: 3, label_provisional: true, max_feedback_length: 4000 }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl DatabaseSettings {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}
