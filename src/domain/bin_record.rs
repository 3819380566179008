use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Reported state of one waste container and its sensing device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub fill_level: Option<f64>,
    #[serde(
        default,
        rename = "lastAnalysis",
        alias = "lastAnalysisTimestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_health: Option<DeviceHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_full: Option<bool>,
    /// Backend fields this service does not interpret, kept for round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BinRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Trimmed, lowercased address; `None` when absent or blank.
    pub fn normalized_address(&self) -> Option<String> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
    }

    /// True when the record carries observed data: an image, an analysis
    /// timestamp or a fill level.
    pub fn has_richness_signal(&self) -> bool {
        is_non_empty(self.image_url.as_deref())
            || is_non_empty(self.last_analysis.as_deref())
            || self.fill_level.is_some()
    }

    /// Backend-issued ids are hyphenated UUIDs; anything else was assigned locally.
    pub fn has_backend_id(&self) -> bool {
        self.id.len() == 36 && uuid::Uuid::try_parse(&self.id).is_ok()
    }

    pub fn last_ping(&self) -> Option<&str> {
        self.device_health
            .as_ref()
            .and_then(|health| health.last_ping.as_deref())
    }
}

fn is_non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.is_empty())
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|level| level.is_finite()))
}
