//! Serde codec for registry timestamps.
//!
//! Written as RFC 3339 with as many sub-second digits as needed, so a save/load
//! cycle is lossless. Naive timestamps from older registry files are read as UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(value: &DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn parse(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts);
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|err| format!("invalid timestamp `{trimmed}`: {err}"))
}

pub fn serialize<S: Serializer>(value: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

pub mod option {
    use super::{format, parse};
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<FixedOffset>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_some(&format(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw {
            Some(text) if !text.trim().is_empty() => {
                parse(&text).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}
