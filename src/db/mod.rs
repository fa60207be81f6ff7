pub mod models;
pub mod types;

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::{DatabaseSettings, Settings};

const APPLICATION_NAME: &str = "assessment-engine";

/// Statements slower than this are logged at `warn`; grading writes are single-row updates.
const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_millis(500);

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// An explicit `DATABASE_URL` wins; otherwise the discrete `POSTGRES_*` fields are used
/// as-is, so passwords never need URL escaping.
pub fn connect_options(database: &DatabaseSettings) -> Result<PgConnectOptions, sqlx::Error> {
    let options = match &database.database_url {
        Some(url) => url.parse::<PgConnectOptions>()?,
        None => PgConnectOptions::new_without_pgpass()
            .host(&database.postgres_server)
            .port(database.postgres_port)
            .username(&database.postgres_user)
            .password(&database.postgres_password)
            .database(&database.postgres_db),
    };

    Ok(options
        .application_name(APPLICATION_NAME)
        .log_statements(tracing::log::LevelFilter::Off)
        .log_slow_statements(tracing::log::LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD))
}

fn pool_options(database: &DatabaseSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(database.acquire_timeout_seconds))
        .test_before_acquire(true)
}

pub async fn init_pool(settings: &Settings) -> Result<PgPool, sqlx::Error> {
    let database = settings.database();
    let pool = pool_options(database).connect_with(connect_options(database)?).await?;
    tracing::info!(
        max_connections = database.max_connections,
        acquire_timeout_seconds = database.acquire_timeout_seconds,
        "Database pool ready"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    MIGRATOR.run(pool).await?;
    tracing::info!(known_migrations = MIGRATOR.iter().count(), "Migrations applied");
    Ok(())
}
