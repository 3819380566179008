use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;

use crate::adapters::bin_source::{BinSource, BinSourceError};
use crate::adapters::db::{BinCache, DbError};
use crate::domain::bin_record::BinRecord;
use crate::domain::bin_summary::{BinSummary, summarize};
use crate::domain::reconcile::{ReconcileReport, add_or_update_bin, deduplicate_bins_with_report};
use crate::domain::timestamp::Clock;

const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bin registry lock poisoned")]
    LockPoisoned,
    #[error("bin source failed: {0}")]
    Source(#[from] BinSourceError),
    #[error("bin cache failed: {0}")]
    Cache(#[from] DbError),
    #[error("bin {id} was not applied to the canonical list")]
    NotApplied { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOrigin {
    Backend,
    Unauthenticated,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub origin: RefreshOrigin,
    pub received: usize,
    pub published: usize,
    pub duplicates_removed: usize,
}

impl RefreshSummary {
    fn from_report(origin: RefreshOrigin, report: &ReconcileReport) -> Self {
        Self {
            origin,
            received: report.input,
            published: report.output,
            duplicates_removed: report.removed(),
        }
    }
}

pub trait BinQueryHandler {
    fn list_bins(&self) -> Result<Vec<BinRecord>, ServiceError>;
    fn get_bin(&self, id: &str) -> Result<Option<BinRecord>, ServiceError>;
    fn summary(&self) -> Result<BinSummary, ServiceError>;
    fn now(&self) -> DateTime<FixedOffset>;
}

pub trait BinCommandHandler {
    fn refresh(&self) -> Result<RefreshSummary, ServiceError>;
    fn save_bin(&self, bin: BinRecord) -> Result<BinRecord, ServiceError>;
}

/// Holds the canonical bin list between refresh cycles and routes writes
/// through the backend, the reconciler and the offline cache.
pub struct BinRegistry {
    source: Box<dyn BinSource>,
    cache: Box<dyn BinCache>,
    clock: Box<dyn Clock + Send + Sync>,
    canonical: Mutex<Vec<BinRecord>>,
}

impl BinRegistry {
    pub fn new(
        source: impl BinSource,
        cache: impl BinCache,
        clock: impl Clock + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            cache: Box::new(cache),
            clock: Box::new(clock),
            canonical: Mutex::new(Vec::new()),
        }
    }

    fn canonical(&self) -> Result<MutexGuard<'_, Vec<BinRecord>>, ServiceError> {
        self.canonical
            .lock()
            .map_err(|_| ServiceError::LockPoisoned)
    }

    fn publish(&self, bins: Vec<BinRecord>) -> Result<(), ServiceError> {
        *self.canonical()? = bins;
        Ok(())
    }

    fn persist(&self, bins: &[BinRecord]) {
        if let Err(error) = self.cache.save(bins) {
            tracing::warn!(error = %error, bins = bins.len(), "failed to write bin cache");
        }
    }

    fn find_by_address(&self, bin: &BinRecord) -> Result<Option<BinRecord>, ServiceError> {
        let Some(address) = bin.normalized_address() else {
            return Ok(None);
        };

        Ok(self
            .canonical()?
            .iter()
            .find(|existing| existing.normalized_address().as_deref() == Some(address.as_str()))
            .cloned())
    }
}

impl BinQueryHandler for BinRegistry {
    fn list_bins(&self) -> Result<Vec<BinRecord>, ServiceError> {
        Ok(self.canonical()?.clone())
    }

    fn get_bin(&self, id: &str) -> Result<Option<BinRecord>, ServiceError> {
        Ok(self.canonical()?.iter().find(|bin| bin.id == id).cloned())
    }

    fn summary(&self) -> Result<BinSummary, ServiceError> {
        let now = self.clock.now();
        Ok(summarize(&self.canonical()?, &now))
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }
}

impl BinCommandHandler for BinRegistry {
    fn refresh(&self) -> Result<RefreshSummary, ServiceError> {
        let (origin, fetched) = match self.source.fetch_bins() {
            Ok(fetched) => (RefreshOrigin::Backend, fetched),
            Err(BinSourceError::Unauthenticated) => {
                tracing::info!("no valid credentials for bins backend, publishing empty bin list");
                (RefreshOrigin::Unauthenticated, Vec::new())
            }
            Err(error) => {
                tracing::warn!(error = %error, "bin fetch failed, falling back to cache");
                (
                    RefreshOrigin::Cache,
                    self.cache.load()?.unwrap_or_default(),
                )
            }
        };

        let (bins, report) = deduplicate_bins_with_report(fetched);
        if report.removed() > 0 {
            tracing::warn!(
                received = report.input,
                published = report.output,
                missing_id = report.dropped_missing_id,
                duplicate_address = report.dropped_duplicates,
                superseded = report.superseded,
                same_id = report.replaced,
                "duplicate bins removed"
            );
        }

        if origin == RefreshOrigin::Backend {
            self.persist(&bins);
        }

        let summary = RefreshSummary::from_report(origin, &report);
        self.publish(bins)?;

        tracing::debug!(origin = ?summary.origin, published = summary.published, "bin list refreshed");
        Ok(summary)
    }

    fn save_bin(&self, bin: BinRecord) -> Result<BinRecord, ServiceError> {
        let result = if bin.has_backend_id() {
            self.source.update_bin(&bin)
        } else {
            self.source.create_bin(&bin)
        };

        let saved = match result {
            Ok(saved) => saved,
            Err(BinSourceError::Unauthenticated) => {
                tracing::info!(bin_id = %bin.id, "no valid credentials, saving bin locally only");
                with_local_id(bin)
            }
            Err(BinSourceError::Duplicate(message)) => {
                if let Some(existing) = self.find_by_address(&bin)? {
                    tracing::info!(bin_id = %existing.id, "backend reported duplicate, returning existing bin");
                    return Ok(existing);
                }
                return Err(BinSourceError::Duplicate(message).into());
            }
            Err(error) => return Err(error.into()),
        };

        let (merged, applied) = {
            let mut canonical = self.canonical()?;
            let merged = add_or_update_bin(std::mem::take(&mut *canonical), saved.clone());
            let applied = merged.iter().any(|bin| bin.id == saved.id);
            *canonical = merged.clone();
            (merged, applied)
        };

        if !applied {
            let Some(kept) = self.find_by_address(&saved)? else {
                return Err(ServiceError::NotApplied { id: saved.id });
            };
            tracing::warn!(
                bin_id = %saved.id,
                kept_id = %kept.id,
                "saved bin lost to a richer record at the same address"
            );
            return Ok(kept);
        }

        self.persist(&merged);

        tracing::info!(bin_id = %saved.id, bins = merged.len(), "bin saved");
        Ok(saved)
    }
}

fn with_local_id(mut bin: BinRecord) -> BinRecord {
    if !bin.has_identity() {
        bin.id = format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4());
    }
    bin
}
