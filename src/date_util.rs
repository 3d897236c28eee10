use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format for creation/modification timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format used for window tags in report payloads.
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y";

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| Error::InvalidRecord(format!("invalid date '{s}': {e}")))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts the storage format, ISO `T`-separated
/// values, fractional seconds, and bare dates (taken as midnight).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    parse_date(s)
        .map(start_of_day)
        .map_err(|_| Error::InvalidRecord(format!("invalid timestamp '{s}'")))
}

pub fn start_of_day(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

/// Midnight at the start of the day after `d`. Used as the inclusive upper
/// bound when comparing timestamps against a date so that records created
/// during `d` are not cut off.
pub fn end_of_day_bound(d: NaiveDate) -> NaiveDateTime {
    start_of_day(d + Duration::days(1))
}

/// Serde adapter for timestamps: writes the storage format and reads
/// anything [`parse_timestamp`] accepts.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

pub mod timestamp_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&super::format_timestamp(*ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        s.map(|s| super::parse_timestamp(&s))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

/// Serialize a date as `dd-mm-yyyy`.
pub mod display_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DISPLAY_DATE_FORMAT;

    pub fn serialize<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&d.format(DISPLAY_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDate::parse_from_str(&s, DISPLAY_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Like [`display_date`] for optional dates.
pub mod display_date_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DISPLAY_DATE_FORMAT;

    pub fn serialize<S: Serializer>(d: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.format(DISPLAY_DATE_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        s.map(|s| NaiveDate::parse_from_str(&s, DISPLAY_DATE_FORMAT))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
