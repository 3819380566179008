use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::{DateTime, FixedOffset, Local};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::bin_fixture_file::FixtureFileBinSource;
use crate::adapters::bin_source::{BinSource, BinSourceError, HttpBinSource};
use crate::adapters::db::{SqliteBinCache, open_connection, run_migrations};
use crate::app::config::{AppConfig, SourceConfig};
use crate::app::error::AppError;
use crate::app::services::{BinCommandHandler, BinRegistry};
use crate::domain::bin_record::BinRecord;
use crate::domain::timestamp::Clock;

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Source selected by configuration; fixture files replace the backend in dev setups.
pub enum ConfiguredSource {
    Http(HttpBinSource),
    FixtureFile(FixtureFileBinSource),
}

impl BinSource for ConfiguredSource {
    fn fetch_bins(&self) -> Result<Vec<BinRecord>, BinSourceError> {
        match self {
            Self::Http(source) => source.fetch_bins(),
            Self::FixtureFile(source) => source.fetch_bins(),
        }
    }

    fn create_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        match self {
            Self::Http(source) => source.create_bin(bin),
            Self::FixtureFile(source) => source.create_bin(bin),
        }
    }

    fn update_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        match self {
            Self::Http(source) => source.update_bin(bin),
            Self::FixtureFile(source) => source.update_bin(bin),
        }
    }
}

pub fn build_source(config: &SourceConfig) -> Result<ConfiguredSource, AppError> {
    match config {
        SourceConfig::Http {
            api_url,
            api_token,
            timeout_ms,
        } => {
            if api_token.is_none() {
                tracing::warn!("BINS_API_TOKEN is not set, backend calls will be skipped");
            }
            HttpBinSource::new(
                api_url,
                api_token.clone(),
                Duration::from_millis(*timeout_ms),
            )
            .map(ConfiguredSource::Http)
            .map_err(AppError::source_init)
        }
        SourceConfig::FixtureFile { path } => {
            tracing::info!(path = %path, "using bin fixture file instead of backend");
            FixtureFileBinSource::from_file(path)
                .map(ConfiguredSource::FixtureFile)
                .map_err(AppError::source_init)
        }
    }
}

pub fn build_cache(db_path: &str) -> Result<SqliteBinCache, AppError> {
    if let Some(parent) = std::path::Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(AppError::database_init)?;
    }

    let mut connection = open_connection(db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    Ok(SqliteBinCache::new(Arc::new(Mutex::new(connection))))
}

struct Runtime {
    registry: Arc<BinRegistry>,
    cache: SqliteBinCache,
}

fn build_runtime(config: &AppConfig) -> Result<Runtime, AppError> {
    let cache = build_cache(&config.db_path)?;
    let source = build_source(&config.source)?;

    Ok(Runtime {
        registry: Arc::new(BinRegistry::new(source, cache.clone(), SystemClock)),
        cache,
    })
}

pub fn start_poller(
    registry: Arc<BinRegistry>,
    poll_interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            match registry.refresh() {
                Ok(summary) => tracing::debug!(
                    origin = ?summary.origin,
                    received = summary.received,
                    published = summary.published,
                    "poll cycle completed"
                ),
                Err(error) => tracing::warn!(error = %error, "poll cycle failed"),
            }
            sleep_unless_stopped(poll_interval, &stop_flag);
        }
    })
}

fn sleep_unless_stopped(interval: Duration, stop_flag: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(100);

    let mut remaining = interval;
    while !remaining.is_zero() && !stop_flag.load(Ordering::Relaxed) {
        let step = remaining.min(STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = build_runtime(&config)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let poller_handle = start_poller(
        Arc::clone(&runtime.registry),
        Duration::from_millis(config.poll_interval_ms),
        Arc::clone(&stop_flag),
    );

    let server_result = serve(&config.http_bind, &runtime);

    stop_flag.store(true, Ordering::Relaxed);
    if poller_handle.join().is_err() {
        return Err(AppError::runtime("poller thread panicked"));
    }

    server_result
}

pub fn run_service(config: AppConfig) -> Result<(), AppError> {
    let runtime = build_runtime(&config)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let poller_handle = start_poller(
        Arc::clone(&runtime.registry),
        Duration::from_millis(config.poll_interval_ms),
        Arc::clone(&stop_flag),
    );

    tracing::info!("bin poller running, press ctrl-c to stop");
    let signal_result =
        actix_web::rt::System::new().block_on(async { actix_web::rt::signal::ctrl_c().await });

    stop_flag.store(true, Ordering::Relaxed);
    if poller_handle.join().is_err() {
        return Err(AppError::runtime("poller thread panicked"));
    }

    signal_result.map_err(AppError::runtime)
}

pub fn run_api(config: AppConfig) -> Result<(), AppError> {
    let runtime = build_runtime(&config)?;

    match runtime.registry.refresh() {
        Ok(summary) => tracing::info!(
            origin = ?summary.origin,
            published = summary.published,
            "initial bin list loaded"
        ),
        Err(error) => tracing::warn!(error = %error, "initial bin refresh failed"),
    }

    serve(&config.http_bind, &runtime)
}

// The caller's `runtime` must outlive the actix system: the last registry
// handle may not be dropped on an async worker.
fn serve(bind: &str, runtime: &Runtime) -> Result<(), AppError> {
    let api_state = ApiState {
        bins: Arc::clone(&runtime.registry),
        cache: runtime.cache.clone(),
    };

    tracing::info!(bind = %bind, "http server starting");

    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || {
                App::new()
                    .wrap(
                        Cors::default()
                            .allow_any_origin()
                            .allow_any_method()
                            .allow_any_header()
                            .max_age(3600),
                    )
                    .app_data(web::Data::new(api_state.clone()))
                    .configure(configure_routes)
            })
            .bind(bind)?
            .run()
            .await
        })
        .map_err(AppError::runtime)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use crate::app::config::SourceConfig;
    use crate::app::services::{BinQueryHandler, BinRegistry};
    use crate::test_support::{FakeBinCache, FakeClock};

    use super::{build_cache, build_source, start_poller};

    fn fixture_registry(cache: FakeBinCache) -> BinRegistry {
        let source = build_source(&SourceConfig::FixtureFile {
            path: format!(
                "{}/testdata/fixtures/single_shot.json",
                env!("CARGO_MANIFEST_DIR")
            ),
        })
        .expect("fixture source should load");
        BinRegistry::new(source, cache, FakeClock::at("2026-02-20T12:00:00+05:00"))
    }

    #[test]
    fn poller_publishes_fixture_bins_and_stops_on_flag() {
        let cache = FakeBinCache::default();
        let registry = Arc::new(fixture_registry(cache.clone()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let handle = start_poller(
            Arc::clone(&registry),
            Duration::from_millis(20),
            Arc::clone(&stop_flag),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.list_bins().expect("list").is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        stop_flag.store(true, Ordering::Relaxed);
        handle.join().expect("poller thread should stop cleanly");

        let ids: Vec<String> = registry
            .list_bins()
            .expect("list")
            .into_iter()
            .map(|bin| bin.id)
            .collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
        assert!(!cache.saved().is_empty());
    }

    #[test]
    fn poller_exits_promptly_during_long_interval() {
        let registry = Arc::new(fixture_registry(FakeBinCache::default()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let handle = start_poller(
            registry,
            Duration::from_secs(600),
            Arc::clone(&stop_flag),
        );
        std::thread::sleep(Duration::from_millis(50));

        let stopped_at = Instant::now();
        stop_flag.store(true, Ordering::Relaxed);
        handle.join().expect("poller thread should stop cleanly");

        assert!(stopped_at.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn missing_fixture_file_fails_source_init() {
        let result = build_source(&SourceConfig::FixtureFile {
            path: "./testdata/fixtures/does_not_exist.json".to_string(),
        });

        assert!(matches!(
            result,
            Err(crate::app::AppError::SourceInit(_))
        ));
    }

    #[test]
    fn build_cache_creates_parent_dirs_and_migrates() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let db_path = dir.path().join("nested/cache/bins.db");

        let cache = build_cache(db_path.to_string_lossy().as_ref()).expect("cache should build");
        let version = cache
            .with_connection(crate::adapters::db::schema_version)
            .expect("version should be queryable");

        assert_eq!(version, crate::adapters::db::LATEST_SCHEMA_VERSION);
    }
}
