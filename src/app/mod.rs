pub mod config;
pub mod error;
mod logging;
pub mod runtime;
pub mod services;

pub use error::AppError;

use config::AppConfig;

/// Poller and HTTP API in one process.
pub fn run() -> Result<(), AppError> {
    let config = bootstrap("bin_monitor")?;
    runtime::run(config)
}

/// Poller only; keeps the offline cache warm.
pub fn run_service() -> Result<(), AppError> {
    let config = bootstrap("bin_service")?;
    runtime::run_service(config)
}

/// HTTP API only; refreshes on demand.
pub fn run_api() -> Result<(), AppError> {
    let config = bootstrap("bin_api")?;
    runtime::run_api(config)
}

fn bootstrap(component: &'static str) -> Result<AppConfig, AppError> {
    logging::init(component)?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        component,
        source = config.source_label(),
        poll_interval_ms = config.poll_interval_ms,
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        "application bootstrap initialized"
    );

    Ok(config)
}
