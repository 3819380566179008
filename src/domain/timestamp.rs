use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub fn from_datetime<Tz: TimeZone>(value: &DateTime<Tz>) -> Self {
        Self(value.timestamp_millis())
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a standard date-time string. Date-times without an offset are read
/// in `local`; a bare date is UTC midnight.
pub fn parse_timestamp(raw: &str, local: &FixedOffset) -> Option<TimestampMs> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(TimestampMs::from_datetime(&parsed));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(TimestampMs::from_datetime(&parsed));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return local
                .from_local_datetime(&parsed)
                .single()
                .map(|value| TimestampMs::from_datetime(&value));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| TimestampMs(midnight.and_utc().timestamp_millis()))
}

/// Finds the leftmost `H:MM:SS` or `HH:MM:SS` run in a free-form label.
pub fn extract_time_of_day(label: &str) -> Option<NaiveTime> {
    let bytes = label.as_bytes();

    (0..bytes.len()).find_map(|start| {
        [2_usize, 1].iter().find_map(|&hour_digits| {
            let hour = read_digits(bytes, start, hour_digits)?;
            let mut cursor = start + hour_digits;
            expect_byte(bytes, cursor, b':')?;
            cursor += 1;
            let minute = read_digits(bytes, cursor, 2)?;
            cursor += 2;
            expect_byte(bytes, cursor, b':')?;
            cursor += 1;
            let second = read_digits(bytes, cursor, 2)?;
            Some((hour, minute, second))
        })
    })
    .and_then(|(hour, minute, second)| NaiveTime::from_hms_opt(hour, minute, second))
}

/// Legacy labels never carry a date, so the time of day is placed on the
/// reference's calendar date in the reference's offset.
pub fn parse_legacy_label(label: &str, reference: &DateTime<FixedOffset>) -> Option<TimestampMs> {
    let time_of_day = extract_time_of_day(label)?;
    let local = reference.date_naive().and_time(time_of_day);

    reference
        .offset()
        .from_local_datetime(&local)
        .single()
        .map(|value| TimestampMs::from_datetime(&value))
}

pub fn timestamp_to_iso8601(timestamp: TimestampMs) -> String {
    let datetime = DateTime::<Utc>::from_timestamp_millis(timestamp.0)
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn read_digits(bytes: &[u8], start: usize, count: usize) -> Option<u32> {
    let digits = bytes.get(start..start + count)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    Some(
        digits
            .iter()
            .fold(0_u32, |acc, digit| acc * 10 + u32::from(digit - b'0')),
    )
}

fn expect_byte(bytes: &[u8], index: usize, expected: u8) -> Option<()> {
    (bytes.get(index) == Some(&expected)).then_some(())
}
