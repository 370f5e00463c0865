//! Timestamp helpers shared by the history, config, and export modules.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use std::sync::OnceLock;

use time::{Duration, OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Record the local UTC offset used by [`now`].
///
/// The offset can only be read reliably while the process has a single
/// thread, so call this at the top of `main`, before any runtime starts.
/// Without it, or where the offset cannot be read, timestamps are in UTC.
pub fn capture_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// The current time in the offset recorded by [`capture_local_offset`], else UTC.
pub fn now() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// Render `datetime` as `YYYY-MM-DD HH:MM:SS`.
pub fn display(datetime: &OffsetDateTime) -> String {
    datetime
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| datetime.to_string())
}

/// Render `datetime` as `YYYYMMDD_HHMMSS` for use inside file names.
pub fn file_stamp(datetime: &OffsetDateTime) -> String {
    datetime
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

/// Render an elapsed duration as `H:MM:SS`, dropping fractional seconds.
pub fn elapsed(duration: Duration) -> String {
    let total = duration.whole_seconds().max(0);
    format!(
        "{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
