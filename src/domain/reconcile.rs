use std::collections::HashMap;

use crate::domain::bin_record::BinRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Inserted,
    /// Same id seen again; the newer record replaced the stored one in place.
    Replaced,
    /// The record shared an address with a poorer record under another id,
    /// which was removed in its favour.
    Superseded { evicted_id: String },
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingId,
    DuplicateAddress { kept_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub input: usize,
    pub output: usize,
    pub dropped_missing_id: usize,
    pub dropped_duplicates: usize,
    pub replaced: usize,
    pub superseded: usize,
}

impl ReconcileReport {
    pub fn removed(&self) -> usize {
        self.input - self.output
    }
}

/// Order-stable merge of bin records into one record per id and per
/// non-empty normalized address.
///
/// Slots are kept in first-seen order; evicted slots become `None` so that
/// indices held by the lookup maps stay valid.
#[derive(Debug, Default)]
pub struct Reconciler {
    slots: Vec<Option<BinRecord>>,
    by_id: HashMap<String, usize>,
    by_address: HashMap<String, usize>,
    report: ReconcileReport,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, bin: BinRecord) -> Observation {
        self.report.input += 1;

        let observation = self.apply(bin);
        match &observation {
            Observation::Inserted => {}
            Observation::Replaced => self.report.replaced += 1,
            Observation::Superseded { .. } => self.report.superseded += 1,
            Observation::Dropped(DropReason::MissingId) => self.report.dropped_missing_id += 1,
            Observation::Dropped(DropReason::DuplicateAddress { .. }) => {
                self.report.dropped_duplicates += 1;
            }
        }

        observation
    }

    pub fn finish(self) -> Vec<BinRecord> {
        self.slots.into_iter().flatten().collect()
    }

    pub fn finish_with_report(self) -> (Vec<BinRecord>, ReconcileReport) {
        let mut report = self.report;
        let bins = self.finish();
        report.output = bins.len();
        (bins, report)
    }

    fn apply(&mut self, bin: BinRecord) -> Observation {
        if !bin.has_identity() {
            return Observation::Dropped(DropReason::MissingId);
        }

        let own_slot = self.by_id.get(&bin.id).copied();
        let address_key = bin.normalized_address();

        let conflicting_slot = address_key
            .as_ref()
            .and_then(|key| self.by_address.get(key).copied())
            .filter(|slot| Some(*slot) != own_slot);

        let mut evicted_id = None;
        if let Some(slot) = conflicting_slot
            && let Some(existing) = self.slots[slot].as_ref()
        {
            if bin.has_richness_signal() && !existing.has_richness_signal() {
                evicted_id = Some(self.evict(slot));
            } else {
                return Observation::Dropped(DropReason::DuplicateAddress {
                    kept_id: existing.id.clone(),
                });
            }
        }

        self.accept(bin, own_slot, address_key, evicted_id)
    }

    fn accept(
        &mut self,
        bin: BinRecord,
        own_slot: Option<usize>,
        address_key: Option<String>,
        evicted_id: Option<String>,
    ) -> Observation {
        let (slot, replaced) = match own_slot {
            Some(slot) => {
                self.release_address(slot);
                self.slots[slot] = Some(bin);
                (slot, true)
            }
            None => {
                let slot = self.slots.len();
                self.by_id.insert(bin.id.clone(), slot);
                self.slots.push(Some(bin));
                (slot, false)
            }
        };

        if let Some(key) = address_key {
            self.by_address.insert(key, slot);
        }

        match (evicted_id, replaced) {
            (Some(evicted_id), _) => Observation::Superseded { evicted_id },
            (None, true) => Observation::Replaced,
            (None, false) => Observation::Inserted,
        }
    }

    fn evict(&mut self, slot: usize) -> String {
        self.release_address(slot);
        let evicted = self.slots[slot].take().map(|bin| bin.id).unwrap_or_default();
        self.by_id.remove(&evicted);
        evicted
    }

    fn release_address(&mut self, slot: usize) {
        let key = self.slots[slot]
            .as_ref()
            .and_then(BinRecord::normalized_address);

        if let Some(key) = key
            && self.by_address.get(&key) == Some(&slot)
        {
            self.by_address.remove(&key);
        }
    }
}

pub fn deduplicate_bins<I>(bins: I) -> Vec<BinRecord>
where
    I: IntoIterator<Item = BinRecord>,
{
    deduplicate_bins_with_report(bins).0
}

pub fn deduplicate_bins_with_report<I>(bins: I) -> (Vec<BinRecord>, ReconcileReport)
where
    I: IntoIterator<Item = BinRecord>,
{
    let mut reconciler = Reconciler::new();
    for bin in bins {
        reconciler.observe(bin);
    }
    reconciler.finish_with_report()
}

/// Applies `bin` as the latest write to `bins`: an existing record with the
/// same id is replaced in place, otherwise it is appended. Address conflicts
/// follow the same policy as [`deduplicate_bins`], so the result is always a
/// reconciler fixed point.
pub fn add_or_update_bin<I>(bins: I, bin: BinRecord) -> Vec<BinRecord>
where
    I: IntoIterator<Item = BinRecord>,
{
    let mut reconciler = Reconciler::new();
    for existing in deduplicate_bins(bins) {
        reconciler.observe(existing);
    }

    let bin_id = bin.id.clone();
    match reconciler.observe(bin) {
        Observation::Dropped(reason) => {
            tracing::debug!(bin_id = %bin_id, reason = ?reason, "bin write not applied");
        }
        Observation::Superseded { evicted_id } => {
            tracing::debug!(bin_id = %bin_id, evicted_id = %evicted_id, "bin write superseded duplicate");
        }
        Observation::Inserted | Observation::Replaced => {}
    }

    reconciler.finish()
}
