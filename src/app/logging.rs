use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

const LOG_FILTER_ENV: &str = "BIN_MONITOR_LOG";
const DEFAULT_FILTER: &str = "info,actix_server=warn";

/// `BIN_MONITOR_LOG` takes precedence over `RUST_LOG`.
pub fn init(component: &'static str) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)?;

    tracing::debug!(component, "logging initialized");
    Ok(())
}
