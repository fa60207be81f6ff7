mod parsing;
mod settings;
mod types;

pub use types::{
    ConfigError, DatabaseSettings, EngineSettings, Environment, GradingSettings, RuntimeSettings,
    Settings, TelemetrySettings,
};
