use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// A date as it arrives from the document store.
///
/// Exports carry epoch milliseconds, ISO strings, or wrapped
/// `{ seconds, nanoseconds }` objects depending on which client wrote the
/// document. Everything else lands in `Other` so one odd field never fails
/// the surrounding document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(f64),
    Text(String),
    Wrapped {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Other(serde_json::Value),
}

impl RawTimestamp {
    pub fn normalize(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(millis) => from_millis(*millis),
            RawTimestamp::Text(text) => parse_text(text),
            RawTimestamp::Wrapped {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            RawTimestamp::Other(_) => None,
        }
    }
}

/// Converts an optional raw date into the canonical instant, `None` when it
/// is missing or unreadable.
pub fn normalize_timestamp(raw: Option<&RawTimestamp>) -> Option<DateTime<Utc>> {
    raw.and_then(RawTimestamp::normalize)
}

fn from_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64)
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Offset-less timestamps are taken as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawTimestamp {
        serde_json::from_value(value).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn all_three_shapes_normalize_to_the_same_instant() {
        let expected = utc(2024, 3, 3, 10);
        let millis = expected.timestamp_millis();

        assert_eq!(raw(json!(millis)).normalize(), Some(expected));
        assert_eq!(raw(json!("2024-03-03T10:00:00Z")).normalize(), Some(expected));
        assert_eq!(
            raw(json!({ "seconds": expected.timestamp(), "nanoseconds": 0 })).normalize(),
            Some(expected)
        );
        assert_eq!(
            raw(json!({ "_seconds": expected.timestamp(), "_nanoseconds": 0 })).normalize(),
            Some(expected)
        );
    }

    #[test]
    fn offsets_and_plain_dates_are_read_as_utc() {
        assert_eq!(
            raw(json!("2024-03-03T05:00:00-05:00")).normalize(),
            Some(utc(2024, 3, 3, 10))
        );
        assert_eq!(raw(json!("2024-03-03T10:00:00")).normalize(), Some(utc(2024, 3, 3, 10)));
        assert_eq!(raw(json!("2024-03-03")).normalize(), Some(utc(2024, 3, 3, 0)));
    }

    #[test]
    fn garbage_becomes_none() {
        assert_eq!(raw(json!("next tuesday")).normalize(), None);
        assert_eq!(raw(json!("")).normalize(), None);
        assert_eq!(raw(json!(true)).normalize(), None);
        assert_eq!(raw(json!({ "when": "later" })).normalize(), None);
        assert_eq!(normalize_timestamp(None), None);
    }
}
