use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;
use thiserror::Error;

use crate::domain::bin_payload::{ParseError, parse_bin, parse_bin_list};
use crate::domain::bin_record::BinRecord;

const BINS_PATH: &str = "waste-bins";
const DUPLICATE_MARKERS: &[&str] = &["already exists", "duplicate"];

pub trait BinSource: Send + Sync + 'static {
    fn fetch_bins(&self) -> Result<Vec<BinRecord>, BinSourceError>;
    fn create_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError>;
    fn update_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError>;
}

#[derive(Debug, Error)]
pub enum BinSourceError {
    #[error("no credentials available for the bins backend")]
    Unauthenticated,
    #[error("bins backend request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("bins backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("bins backend rejected a duplicate bin: {0}")]
    Duplicate(String),
    #[error("failed to read bins payload as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected bins payload: {0}")]
    Payload(#[from] ParseError),
    #[error("bins backend returned a record that could not be read")]
    InvalidRecord,
    #[error("bin source I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct HttpBinSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBinSource {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BinSourceError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|value| !value.trim().is_empty()),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{BINS_PATH}", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{BINS_PATH}/{id}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, BinSourceError> {
        let token = self.token.as_deref().ok_or(BinSourceError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    fn send(&self, request: RequestBuilder) -> Result<Value, BinSourceError> {
        let response = self.authorized(request)?.send()?;
        read_json(response)
    }
}

impl BinSource for HttpBinSource {
    fn fetch_bins(&self) -> Result<Vec<BinRecord>, BinSourceError> {
        let payload = self.send(self.client.get(self.collection_url()))?;
        let parsed = parse_bin_list(&payload)?;

        if parsed.skipped > 0 {
            tracing::warn!(
                skipped = parsed.skipped,
                received = parsed.bins.len() + parsed.skipped,
                "bins backend returned unreadable records"
            );
        }

        Ok(parsed.bins)
    }

    fn create_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        let mut body = serde_json::to_value(bin)?;
        if let Some(object) = body.as_object_mut() {
            object.remove("id");
        }

        let payload = self.send(self.client.post(self.collection_url()).json(&body))?;
        parse_bin(&unwrap_data(payload)).ok_or(BinSourceError::InvalidRecord)
    }

    fn update_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        let payload = self.send(self.client.put(self.item_url(&bin.id)).json(bin))?;
        parse_bin(&unwrap_data(payload)).ok_or(BinSourceError::InvalidRecord)
    }
}

fn read_json(response: Response) -> Result<Value, BinSourceError> {
    let status = response.status();
    let body = if status.is_success() {
        response.text()?
    } else {
        response.text().unwrap_or_default()
    };

    decode_response(status, body)
}

/// Turns a backend status and raw body into JSON or the matching error.
/// Shared by the HTTP client and the fixture replay source.
pub(crate) fn decode_response(status: StatusCode, body: String) -> Result<Value, BinSourceError> {
    if status.is_success() {
        return serde_json::from_str(&body).map_err(BinSourceError::from);
    }

    Err(classify_failure(status, body))
}

fn classify_failure(status: StatusCode, body: String) -> BinSourceError {
    if status == StatusCode::UNAUTHORIZED {
        return BinSourceError::Unauthenticated;
    }

    let lowered = body.to_lowercase();
    if status == StatusCode::BAD_REQUEST
        && DUPLICATE_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
    {
        return BinSourceError::Duplicate(body);
    }

    BinSourceError::Status {
        status: status.as_u16(),
        body,
    }
}

pub(crate) fn unwrap_data(payload: Value) -> Value {
    match payload {
        Value::Object(mut object) if object.get("data").is_some_and(Value::is_object) => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
