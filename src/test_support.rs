use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;

use crate::adapters::bin_source::{BinSource, BinSourceError};
use crate::adapters::db::{BinCache, DbError, open_connection, run_migrations};
use crate::domain::bin_record::BinRecord;
use crate::domain::timestamp::Clock;

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn open_test_connection(test_name: &str) -> Connection {
    let template = ensure_template_db();
    let test_db_path = unique_test_db_path(test_name);

    if let Some(parent) = test_db_path.parent() {
        std::fs::create_dir_all(parent).expect("test db dir should be creatable");
    }

    std::fs::copy(&template, &test_db_path).expect("template db should be copied");
    open_connection(test_db_path.to_string_lossy().as_ref()).expect("test db should open")
}

fn ensure_template_db() -> PathBuf {
    static TEMPLATE_PATH: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE_PATH
        .get_or_init(|| {
            let template_path = std::env::var("TEST_DB_TEMPLATE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_template_path);

            if let Some(parent) = template_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).expect("template parent dir should be creatable");
            }

            let mut connection = open_connection(template_path.to_string_lossy().as_ref())
                .expect("template db opens");
            run_migrations(&mut connection).expect("template migrations should succeed");

            template_path
        })
        .clone()
}

fn default_template_path() -> PathBuf {
    Path::new("./target/testdb/bins_template.db").to_path_buf()
}

fn unique_test_db_path(test_name: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    Path::new("./target/testdb")
        .join(format!("{test_name}-{now}-{counter}.sqlite"))
        .to_path_buf()
}

pub fn bin_at(id: &str, address: &str) -> BinRecord {
    BinRecord {
        address: Some(address.to_string()),
        ..BinRecord::new(id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FakeClock {
    now: DateTime<FixedOffset>,
}

impl FakeClock {
    pub fn at(rfc3339: &str) -> Self {
        Self {
            now: DateTime::parse_from_rfc3339(rfc3339).expect("fake clock time should parse"),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeBinCache {
    snapshots: Arc<Mutex<Vec<Vec<BinRecord>>>>,
}

impl FakeBinCache {
    pub fn with_snapshot(bins: Vec<BinRecord>) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(vec![bins])),
        }
    }

    pub fn saved(&self) -> Vec<Vec<BinRecord>> {
        self.snapshots.lock().expect("cache lock").clone()
    }
}

impl BinCache for FakeBinCache {
    fn load(&self) -> Result<Option<Vec<BinRecord>>, DbError> {
        Ok(self.snapshots.lock().expect("cache lock").last().cloned())
    }

    fn save(&self, bins: &[BinRecord]) -> Result<(), DbError> {
        self.snapshots.lock().expect("cache lock").push(bins.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Accept,
    Duplicate,
    Unauthenticated,
}

#[derive(Debug)]
struct ScriptState {
    fetches: VecDeque<Result<Vec<BinRecord>, BinSourceError>>,
    calls: Vec<String>,
}

/// In-memory backend: fetches are replayed in order, writes are recorded.
#[derive(Debug, Clone)]
pub struct ScriptedBinSource {
    state: Arc<Mutex<ScriptState>>,
    write_mode: WriteMode,
}

impl ScriptedBinSource {
    pub fn with_fetches(fetches: Vec<Result<Vec<BinRecord>, BinSourceError>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                fetches: fetches.into(),
                calls: Vec::new(),
            })),
            write_mode: WriteMode::Accept,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            write_mode: WriteMode::Unauthenticated,
            ..Self::with_fetches(Vec::new())
        }
    }

    pub fn rejecting_writes_as_duplicate(self) -> Self {
        Self {
            write_mode: WriteMode::Duplicate,
            ..self
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("script lock").calls.clone()
    }

    fn write(&self, kind: &str, bin: &BinRecord) -> Result<(), BinSourceError> {
        self.state
            .lock()
            .expect("script lock")
            .calls
            .push(format!("{kind}:{}", bin.id));

        match self.write_mode {
            WriteMode::Accept => Ok(()),
            WriteMode::Duplicate => Err(BinSourceError::Duplicate(
                "bin already exists".to_string(),
            )),
            WriteMode::Unauthenticated => Err(BinSourceError::Unauthenticated),
        }
    }
}

impl BinSource for ScriptedBinSource {
    fn fetch_bins(&self) -> Result<Vec<BinRecord>, BinSourceError> {
        let next = self.state.lock().expect("script lock").fetches.pop_front();
        match (next, self.write_mode) {
            (Some(result), _) => result,
            (None, WriteMode::Unauthenticated) => Err(BinSourceError::Unauthenticated),
            (None, _) => Ok(Vec::new()),
        }
    }

    fn create_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        self.write("create", bin)?;
        Ok(BinRecord {
            id: uuid::Uuid::new_v4().to_string(),
            ..bin.clone()
        })
    }

    fn update_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        self.write("update", bin)?;
        Ok(bin.clone())
    }
}
