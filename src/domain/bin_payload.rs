use serde_json::Value;
use thiserror::Error;

use crate::domain::bin_record::BinRecord;

const WRAPPER_KEYS: &[&str] = &["data", "bins", "items"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBins {
    pub bins: Vec<BinRecord>,
    pub skipped: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("payload must be a JSON array of bins")]
    InvalidPayloadType,
}

pub fn parse_bin_list(payload: &Value) -> Result<ParsedBins, ParseError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(object) => WRAPPER_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .ok_or(ParseError::InvalidPayloadType)?,
        _ => return Err(ParseError::InvalidPayloadType),
    };

    let mut bins = Vec::with_capacity(items.len());
    let mut skipped = 0_usize;

    for item in items {
        match parse_bin(item) {
            Some(bin) => bins.push(bin),
            None => skipped += 1,
        }
    }

    Ok(ParsedBins { bins, skipped })
}

pub fn parse_bin(item: &Value) -> Option<BinRecord> {
    if !item.is_object() {
        return None;
    }

    match serde_json::from_value::<BinRecord>(item.clone()) {
        Ok(bin) => Some(bin),
        Err(error) => {
            tracing::debug!(error = %error, "skipping malformed bin record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ParseError, parse_bin_list};

    #[test]
    fn parses_top_level_array() {
        let payload = json!([
            {"id": "1", "address": "A"},
            {"id": "2", "fillLevel": 30}
        ]);

        let parsed = parse_bin_list(&payload).expect("list should parse");

        assert_eq!(parsed.bins.len(), 2);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.bins[1].fill_level, Some(30.0));
    }

    #[test]
    fn unwraps_data_envelope() {
        let payload = json!({"data": [{"id": "1"}], "total": 1});

        let parsed = parse_bin_list(&payload).expect("list should parse");

        assert_eq!(parsed.bins.len(), 1);
        assert_eq!(parsed.bins[0].id, "1");
    }

    #[test]
    fn skips_non_record_values() {
        let payload = json!([
            null,
            42,
            "bin",
            {"id": "1"},
            {"id": "2", "deviceHealth": "broken"}
        ]);

        let parsed = parse_bin_list(&payload).expect("list should parse");

        assert_eq!(parsed.bins.len(), 1);
        assert_eq!(parsed.bins[0].id, "1");
        assert_eq!(parsed.skipped, 4);
    }

    #[test]
    fn keeps_records_without_id_for_reconciler_to_drop() {
        let payload = json!([{"address": "A"}]);

        let parsed = parse_bin_list(&payload).expect("list should parse");

        assert_eq!(parsed.bins.len(), 1);
        assert!(!parsed.bins[0].has_identity());
    }

    #[test]
    fn rejects_scalar_and_unwrapped_objects() {
        assert_eq!(
            parse_bin_list(&json!("bins")),
            Err(ParseError::InvalidPayloadType)
        );
        assert_eq!(
            parse_bin_list(&json!({"id": "1"})),
            Err(ParseError::InvalidPayloadType)
        );
    }
}
