use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::domain::bin_record::BinRecord;
use crate::domain::staleness::is_camera_offline;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinSummary {
    pub total_bins: usize,
    pub offline_cameras: usize,
    pub full_bins: usize,
    pub average_fill_level: Option<f64>,
}

pub fn summarize(bins: &[BinRecord], now: &DateTime<FixedOffset>) -> BinSummary {
    let fill_levels: Vec<f64> = bins.iter().filter_map(|bin| bin.fill_level).collect();
    let average_fill_level = if fill_levels.is_empty() {
        None
    } else {
        Some(fill_levels.iter().sum::<f64>() / fill_levels.len() as f64)
    };

    BinSummary {
        total_bins: bins.len(),
        offline_cameras: bins
            .iter()
            .filter(|bin| is_camera_offline(bin, now))
            .count(),
        full_bins: bins.iter().filter(|bin| bin.is_full == Some(true)).count(),
        average_fill_level,
    }
}
