use std::collections::VecDeque;
use std::fs;
use std::io;
use std::sync::{Mutex, MutexGuard};

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::bin_source::{BinSource, BinSourceError, decode_response, unwrap_data};
use crate::domain::bin_payload::{parse_bin, parse_bin_list};
use crate::domain::bin_record::BinRecord;
use crate::domain::reconcile::add_or_update_bin;

const EXHAUSTED_STATUS: u16 = 503;

#[derive(Debug, Clone, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    repeat: bool,
    fetches: Vec<ScriptedResponse>,
    #[serde(default)]
    writes: Vec<ScriptedResponse>,
}

/// One canned backend answer. A string body is sent as raw text, anything
/// else as JSON.
#[derive(Debug, Clone, Deserialize)]
struct ScriptedResponse {
    #[serde(default = "ok_status")]
    status: u16,
    #[serde(default)]
    body: Value,
}

fn ok_status() -> u16 {
    200
}

impl ScriptedResponse {
    fn status_code(&self) -> Result<StatusCode, BinSourceError> {
        StatusCode::from_u16(self.status).map_err(|_| {
            BinSourceError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("fixture status {} is not a valid HTTP status", self.status),
            ))
        })
    }

    fn decode(self) -> Result<Value, BinSourceError> {
        let status = self.status_code()?;
        let body = match self.body {
            Value::String(text) => text,
            other => other.to_string(),
        };
        decode_response(status, body)
    }
}

#[derive(Debug)]
struct Replay {
    fetches: VecDeque<ScriptedResponse>,
    writes: VecDeque<ScriptedResponse>,
    written: Vec<BinRecord>,
}

/// Dev-mode stand-in for the bins backend: replays scripted responses from a
/// JSON file through the same decoding as the HTTP client. Accepted writes
/// are overlaid on every later fetch.
#[derive(Debug)]
pub struct FixtureFileBinSource {
    repeat: bool,
    replay: Mutex<Replay>,
}

impl FixtureFileBinSource {
    pub fn from_file(path: &str) -> Result<Self, BinSourceError> {
        let fixture: FixtureFile = serde_json::from_str(&fs::read_to_string(path)?)?;

        if fixture.fetches.is_empty() {
            return Err(BinSourceError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "fixture file needs at least one scripted fetch",
            )));
        }
        for response in fixture.fetches.iter().chain(&fixture.writes) {
            response.status_code()?;
        }

        Ok(Self {
            repeat: fixture.repeat,
            replay: Mutex::new(Replay {
                fetches: fixture.fetches.into(),
                writes: fixture.writes.into(),
                written: Vec::new(),
            }),
        })
    }

    fn replay(&self) -> Result<MutexGuard<'_, Replay>, BinSourceError> {
        self.replay
            .lock()
            .map_err(|_| BinSourceError::Io(io::Error::other("fixture replay lock poisoned")))
    }

    /// Scripted write answer, or `None` when writes are simply accepted.
    fn next_write(&self) -> Result<Option<BinRecord>, BinSourceError> {
        let Some(response) = self.replay()?.writes.pop_front() else {
            return Ok(None);
        };

        let payload = response.decode()?;
        parse_bin(&unwrap_data(payload))
            .map(Some)
            .ok_or(BinSourceError::InvalidRecord)
    }

    fn remember(&self, bin: BinRecord) -> Result<BinRecord, BinSourceError> {
        let mut replay = self.replay()?;
        let written = std::mem::take(&mut replay.written);
        replay.written = add_or_update_bin(written, bin.clone());
        Ok(bin)
    }
}

impl BinSource for FixtureFileBinSource {
    fn fetch_bins(&self) -> Result<Vec<BinRecord>, BinSourceError> {
        let (response, written) = {
            let mut replay = self.replay()?;
            let response = replay.fetches.pop_front();
            if self.repeat
                && let Some(response) = &response
            {
                replay.fetches.push_back(response.clone());
            }
            (response, replay.written.clone())
        };

        let Some(response) = response else {
            return Err(BinSourceError::Status {
                status: EXHAUSTED_STATUS,
                body: "fixture replay finished".to_string(),
            });
        };

        let bins = parse_bin_list(&response.decode()?)?.bins;
        Ok(written.into_iter().fold(bins, add_or_update_bin))
    }

    fn create_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        let created = match self.next_write()? {
            Some(created) => created,
            None => BinRecord {
                id: uuid::Uuid::new_v4().to_string(),
                ..bin.clone()
            },
        };
        self.remember(created)
    }

    fn update_bin(&self, bin: &BinRecord) -> Result<BinRecord, BinSourceError> {
        let updated = self.next_write()?.unwrap_or_else(|| bin.clone());
        self.remember(updated)
    }
}
