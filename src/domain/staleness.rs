use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::domain::bin_record::BinRecord;
use crate::domain::timestamp::{TimestampMs, parse_legacy_label, parse_timestamp};

/// Ten hours without any sign of life marks a camera as offline.
pub const OFFLINE_THRESHOLD_MS: i64 = 10 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl CameraStatus {
    pub fn for_bin(bin: &BinRecord, now: &DateTime<FixedOffset>) -> Self {
        if is_camera_offline(bin, now) {
            Self::Offline
        } else {
            Self::Online
        }
    }

    /// Label shown on the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            Self::Online => "Kamera ishlayapti",
            Self::Offline => "Kamera ishlamayabdi",
        }
    }
}

/// Most recent of the analysis timestamp and the device ping that could be parsed.
pub fn effective_last_seen(bin: &BinRecord, now: &DateTime<FixedOffset>) -> Option<TimestampMs> {
    let local = now.offset();
    let analysed_at = bin
        .last_analysis
        .as_deref()
        .and_then(|raw| parse_timestamp(raw, local).or_else(|| parse_legacy_label(raw, now)));
    let pinged_at = bin.last_ping().and_then(|raw| parse_timestamp(raw, local));

    match (analysed_at, pinged_at) {
        (Some(analysed_at), Some(pinged_at)) => Some(analysed_at.max(pinged_at)),
        (analysed_at, pinged_at) => analysed_at.or(pinged_at),
    }
}

pub fn is_camera_offline(bin: &BinRecord, now: &DateTime<FixedOffset>) -> bool {
    let Some(last_seen) = effective_last_seen(bin, now) else {
        return true;
    };

    now.timestamp_millis() - last_seen.0 > OFFLINE_THRESHOLD_MS
}
