use chrono::{NaiveDate, NaiveDateTime};

/// Local wall-clock timestamp in the ISO-8601 form the extension also uses
/// (`2025-01-01T10:00:00.123456`), so `DATE(...)` groups both the same way.
pub fn iso_timestamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Key compared against `DATE(column)` in SQLite.
pub fn date_key(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}
