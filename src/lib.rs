pub mod core;
pub mod db;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry, time::SystemClock};
use crate::repositories::postgres::PgStore;
use crate::services::notifications::TracingNotifier;

pub use crate::core::errors::{EligibilityReason, EngineError, EngineResult};
pub use crate::services::engine::{GradingEngine, GradingEngineBuilder};

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let engine = GradingEngine::with_store(Arc::new(PgStore::new(db_pool)))
        .clock(Arc::new(SystemClock))
        .notifier(Arc::new(TracingNotifier))
        .settings(settings.engine().clone())
        .build();
    let state = AppState::new(settings, engine);

    tracing::info!(
        environment = %state.settings().runtime().environment.as_str(),
        sweep_interval_seconds = state.settings().grading().sweep_interval_seconds,
        "Grading worker started"
    );

    tasks::scheduler::run(state).await
}
