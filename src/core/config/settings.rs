use super::parsing::{
    env_flag, env_optional, env_or_default, parse_bool, parse_environment, parse_u16, parse_u32,
    parse_u64,
};
use super::types::{
    ConfigError, DatabaseSettings, EngineSettings, GradingSettings, RuntimeSettings, Settings,
    TelemetrySettings,
};

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("ASSESSMENT_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("ASSESSMENT_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "assessment");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "assessment_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "10"),
        )?;
        let acquire_timeout_seconds = parse_u64(
            "DATABASE_ACQUIRE_TIMEOUT_SECONDS",
            env_or_default("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "30"),
        )?;

        let defaults = EngineSettings::default();
        let sweep_interval_seconds =
            parse_u64("SWEEP_INTERVAL_SECONDS", env_or_default("SWEEP_INTERVAL_SECONDS", "60"))?;
        let recovery_interval_seconds = parse_u64(
            "RECOVERY_INTERVAL_SECONDS",
            env_or_default("RECOVERY_INTERVAL_SECONDS", "300"),
        )?;
        let max_conflict_retries = match env_optional("MAX_CONFLICT_RETRIES") {
            Some(value) => parse_u32("MAX_CONFLICT_RETRIES", value)?,
            None => defaults.max_conflict_retries,
        };
        let label_provisional = env_flag("LABEL_PROVISIONAL_SCORES", defaults.label_provisional);
        let max_feedback_length = match env_optional("MAX_FEEDBACK_LENGTH") {
            Some(value) => parse_u64("MAX_FEEDBACK_LENGTH", value)?,
            None => defaults.max_feedback_length,
        };

        let log_level = env_or_default("ASSESSMENT_LOG_LEVEL", "info");
        let json = env_flag("ASSESSMENT_LOG_JSON", false);
        let prometheus_enabled = env_flag("PROMETHEUS_ENABLED", false);
        let metrics_port = parse_u16("METRICS_PORT", env_or_default("METRICS_PORT", "9464"))?;

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
                acquire_timeout_seconds,
            },
            grading: GradingSettings {
                sweep_interval_seconds,
                recovery_interval_seconds,
                engine: EngineSettings {
                    max_conflict_retries,
                    label_provisional,
                    max_feedback_length,
                },
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled, metrics_port },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub fn engine(&self) -> &EngineSettings {
        &self.grading.engine
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grading.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.grading.recovery_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "RECOVERY_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if self.database.acquire_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_ACQUIRE_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
