pub mod bin_payload;
pub mod bin_record;
pub mod bin_summary;
pub mod reconcile;
pub mod staleness;
pub mod timestamp;
