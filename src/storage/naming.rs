//! File naming shared by the batch writer and the compactor.
//!
//! Everything lives side by side in one flat directory and is told apart by
//! name alone:
//!
//! ```text
//! data-1704103200-<uuid>.parquet.temp   open batch, not yet committed
//! data-2024-01-01T10:00:00Z.parquet     sealed batch
//! data-2024-01-01T10:00:00Z.parquet.merged
//! day-2024-01-01.parquet                compacted day
//! ```
//!
//! All instants are UTC so that the seal instant and the compactor's day
//! truncation agree.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const SEALED_PREFIX: &str = "data-";
pub const DAILY_PREFIX: &str = "day-";
pub const TEMP_SUFFIX: &str = ".temp";
pub const MERGED_SUFFIX: &str = ".merged";

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const INSTANT_OFFSET: usize = SEALED_PREFIX.len();
const INSTANT_LEN: usize = 20;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("not a sealed batch file name")]
    NotSealed,

    #[error("expected {expected} bytes, found {found}")]
    Length { expected: usize, found: usize },

    #[error("unparseable instant '{0}'")]
    Instant(String),
}

/// Working name for a batch opened at `opened_at`.
pub fn temp_batch_name(opened_at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}{}-{}.{}{}",
        SEALED_PREFIX,
        opened_at.timestamp(),
        Uuid::new_v4().simple(),
        extension,
        TEMP_SUFFIX
    )
}

pub fn sealed_batch_name(sealed_at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}{}.{}",
        SEALED_PREFIX,
        sealed_at.format(INSTANT_FORMAT),
        extension
    )
}

pub fn daily_name(day: NaiveDate, extension: &str) -> String {
    format!("{}{}.{}", DAILY_PREFIX, day.format(DATE_FORMAT), extension)
}

pub fn merged_name(file_name: &str) -> String {
    format!("{}{}", file_name, MERGED_SUFFIX)
}

pub fn temp_name(file_name: &str) -> String {
    format!("{}{}", file_name, TEMP_SUFFIX)
}

/// True for `data-*.<ext>`; temp and merged files never match.
pub fn is_sealed_candidate(file_name: &str, extension: &str) -> bool {
    file_name.starts_with(SEALED_PREFIX)
        && file_name
            .strip_suffix(extension)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// True for working files of this format left by a batch writer.
pub fn is_temp_batch(file_name: &str, extension: &str) -> bool {
    file_name.starts_with(SEALED_PREFIX)
        && file_name
            .strip_suffix(TEMP_SUFFIX)
            .and_then(|rest| rest.strip_suffix(extension))
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Parse the seal instant out of a sealed batch file name.
///
/// The instant occupies a fixed substring right after the `data-` prefix.
pub fn parse_sealed_instant(file_name: &str, extension: &str) -> Result<DateTime<Utc>, NameError> {
    if !is_sealed_candidate(file_name, extension) {
        return Err(NameError::NotSealed);
    }

    let expected = INSTANT_OFFSET + INSTANT_LEN + 1 + extension.len();
    if file_name.len() != expected {
        return Err(NameError::Length {
            expected,
            found: file_name.len(),
        });
    }

    let raw = file_name
        .get(INSTANT_OFFSET..INSTANT_OFFSET + INSTANT_LEN)
        .ok_or_else(|| NameError::Instant(file_name.to_string()))?;

    NaiveDateTime::parse_from_str(raw, INSTANT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| NameError::Instant(raw.to_string()))
}

/// Calendar day an instant belongs to.
pub fn day_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Midnight at the start of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    day_of(now).and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Whether a batch sealed at `instant` belongs to a day that is already over.
pub fn is_before_today(instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    instant < start_of_day(now)
}

/// Path under `dir` to publish a batch sealed at `sealed_at`.
///
/// Two seals within the same second would collide on name, so the instant is
/// moved forward a second at a time until the name is free. The name never
/// leaves the day of `sealed_at`: once stepping forward would cross midnight,
/// the search continues backward from just before `sealed_at`.
pub fn next_free_sealed_path(dir: &Path, sealed_at: DateTime<Utc>, extension: &str) -> PathBuf {
    let day = day_of(sealed_at);
    let mut step = Duration::seconds(1);
    let mut instant = sealed_at;
    loop {
        let candidate = dir.join(sealed_batch_name(instant, extension));
        if !candidate.exists() {
            return candidate;
        }
        instant += step;
        if day_of(instant) != day && step > Duration::zero() {
            step = Duration::seconds(-1);
            instant = sealed_at + step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sealed_name_round_trip() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let name = sealed_batch_name(t, "parquet");
        assert_eq!(name, "data-2024-01-01T10:00:00Z.parquet");
        assert_eq!(parse_sealed_instant(&name, "parquet"), Ok(t));

        let name = sealed_batch_name(t, "json.gz");
        assert_eq!(name, "data-2024-01-01T10:00:00Z.json.gz");
        assert_eq!(parse_sealed_instant(&name, "json.gz"), Ok(t));
    }

    #[test]
    fn test_seal_instant_drops_subseconds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
            + Duration::milliseconds(750);
        let name = sealed_batch_name(t, "parquet");
        assert_eq!(name, "data-2024-01-01T10:00:00Z.parquet");
    }

    #[test]
    fn test_temp_and_merged_names_are_not_sealed() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let temp = temp_batch_name(t, "parquet");
        assert!(temp.starts_with("data-1704103200-"));
        assert!(temp.ends_with(".parquet.temp"));
        assert!(!is_sealed_candidate(&temp, "parquet"));
        assert!(is_temp_batch(&temp, "parquet"));
        assert!(!is_temp_batch(&temp, "json.gz"));

        let merged = merged_name("data-2024-01-01T10:00:00Z.parquet");
        assert!(!is_sealed_candidate(&merged, "parquet"));
        assert_eq!(
            parse_sealed_instant(&merged, "parquet"),
            Err(NameError::NotSealed)
        );
    }

    #[test]
    fn test_other_format_is_not_a_candidate() {
        assert!(!is_sealed_candidate("data-2024-01-01T10:00:00Z.json.gz", "parquet"));
        assert!(!is_sealed_candidate("day-2024-01-01.parquet", "parquet"));
        // "xparquet" must not satisfy the ".parquet" suffix
        assert!(!is_sealed_candidate("data-2024-01-01T10:00:00Zxparquet", "parquet"));
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(matches!(
            parse_sealed_instant("data-1700000000.parquet", "parquet"),
            Err(NameError::Length { .. })
        ));
        assert!(matches!(
            parse_sealed_instant("data-2024-13-01T10:00:00Z.parquet", "parquet"),
            Err(NameError::Instant(_))
        ));
    }

    #[test]
    fn test_daily_name() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(daily_name(day, "parquet"), "day-2024-01-01.parquet");
        assert_eq!(temp_name(&daily_name(day, "json.gz")), "day-2024-01-01.json.gz.temp");
    }

    #[test]
    fn test_day_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 30, 0).unwrap();
        assert_eq!(start_of_day(now), Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        let yesterday_late = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(is_before_today(yesterday_late, now));
        assert!(!is_before_today(midnight, now));
        assert_eq!(day_of(yesterday_late), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_next_free_sealed_path_skips_taken_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        let first = next_free_sealed_path(dir.path(), t, "parquet");
        assert!(first.ends_with("data-2024-01-01T10:00:00Z.parquet"));
        std::fs::write(&first, b"x").unwrap();

        let second = next_free_sealed_path(dir.path(), t, "parquet");
        assert!(second.ends_with("data-2024-01-01T10:00:01Z.parquet"));
    }

    #[test]
    fn test_next_free_sealed_path_stays_in_day_at_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        std::fs::write(dir.path().join("data-2024-01-01T23:59:59Z.json.gz"), b"x").unwrap();

        let path = next_free_sealed_path(dir.path(), t, "json.gz");
        assert!(path.ends_with("data-2024-01-01T23:59:58Z.json.gz"));
        std::fs::write(&path, b"x").unwrap();

        let path = next_free_sealed_path(dir.path(), t, "json.gz");
        assert!(path.ends_with("data-2024-01-01T23:59:57Z.json.gz"));
    }
}
