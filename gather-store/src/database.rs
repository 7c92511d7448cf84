use gather_core::{LedgerError, StoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// SQLSTATE codes worth retrying: serialization failure, deadlock.
const RETRYABLE_STATES: [&str; 2] = ["40001", "40P01"];

fn is_retryable(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .code()
            .map_or(false, |code| RETRYABLE_STATES.iter().any(|s| *s == code)),
        _ => true,
    }
}

pub(crate) fn store_error(e: sqlx::Error) -> StoreError {
    if is_retryable(&e) {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Invalid(e.to_string())
    }
}

pub(crate) fn ledger_error(e: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable(e.to_string())
}

/// Counters are `INTEGER CHECK (>= 0)`.
pub(crate) fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
