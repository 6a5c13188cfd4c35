use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::AppError;

const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Connect to Postgres, retrying a few times while the database comes up.
pub async fn create_pool(database_url: &str) -> Result<PgPool, AppError> {
    log::info!("Creating database connection pool");

    let mut last_error = None;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        log::info!(
            "Database connection attempt {} of {}",
            attempt,
            MAX_CONNECT_ATTEMPTS
        );

        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                log::info!("Successfully connected to database");
                return Ok(pool);
            }
            Err(e) => {
                log::warn!("Database connection attempt {} failed: {}", attempt, e);

                if e.to_string().contains("authentication failed") {
                    log::error!("Database authentication failed; check DATABASE_URL credentials");
                    return Err(AppError::Database(e.to_string()));
                }

                last_error = Some(e);

                if attempt < MAX_CONNECT_ATTEMPTS {
                    let delay = Duration::from_secs(2 * attempt as u64);
                    log::info!("Retrying in {} seconds...", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown database connection error".to_string());
    log::error!("All database connection attempts failed: {}", error);

    Err(AppError::Database(error))
}

/// Round-trip a trivial query to confirm the pool is usable.
pub async fn verify_connection(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query_as::<_, (i32,)>("SELECT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            log::error!("Database connection verification failed: {}", e);
            AppError::Database(e.to_string())
        })?;

    log::info!("Database connection verified successfully");
    Ok(())
}
