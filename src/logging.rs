use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::AppError;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// `log` records from sqlx and actix are bridged into the same output.
pub fn init_logging(level: &str) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| AppError::Configuration(format!("Invalid LOG_LEVEL '{}': {}", level, e)))?,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_names(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| AppError::Configuration(format!("Failed to initialize logging: {}", e)))
}
