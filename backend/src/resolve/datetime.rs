//! Normalization of `local_datetime` / `utc_datetime` attributes.
//!
//! Accepted layouts:
//!
//! | Attribute        | Value                     | timeloc |
//! |------------------|---------------------------|---------|
//! | `utc_datetime`   | `2020-05-01` / `2020-05-01Z` | 9    |
//! | `utc_datetime`   | `2020-05-01T10:00:00Z`    | 1       |
//! | `local_datetime` | `2020-05-01`              | 9       |
//! | `local_datetime` | `2020-05-01T10:00:00`     | 1       |
//!
//! Local values are read in the time zone of the node's resolved site and
//! converted to UTC. Every successful value gets `dateloc = 5`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqliteConnection;

use crate::document::Overrides;
use crate::error::DateError;
use crate::models::{ResolvedDate, DATELOC_EXACT_DATE, LOC_UNSPECIFIED, TIMELOC_EXACT_TIME};
use crate::store::site_time_zone;

static UTC_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})Z?$").unwrap());
static UTC_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap());
static LOCAL_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static LOCAL_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$").unwrap());
static OFFSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").unwrap());

/// Where the date attributes were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateScope {
    /// On a group's `defaults`.
    Defaults { descendants_specify_site: bool },
    /// On a trait node.
    Trait,
}

/// Normalize the node's date attributes, if it has any.
///
/// `site_id` is the site in effect for the node after its own references
/// were merged.
pub async fn normalize_date(
    conn: &mut SqliteConnection,
    overrides: &Overrides,
    site_id: Option<i64>,
    scope: DateScope,
) -> Result<Option<ResolvedDate>, DateError> {
    match (&overrides.local_datetime, &overrides.utc_datetime) {
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(DateError::BothGiven),
        (None, Some(utc)) => parse_utc(utc).map(Some),
        (Some(local), None) => {
            if let DateScope::Defaults { descendants_specify_site: true } = scope {
                return Err(DateError::AmbiguousSite);
            }
            let site_id = site_id.ok_or(DateError::MissingSite)?;
            let zone = site_time_zone(conn, site_id)
                .await?
                .ok_or(DateError::MissingTimeZone(site_id))?;
            let offset = parse_offset(&zone).ok_or_else(|| DateError::BadTimeZone {
                site_id,
                value: zone.clone(),
            })?;
            parse_local(local, offset).map(Some)
        }
    }
}

/// Parse a `utc_datetime` value.
pub fn parse_utc(value: &str) -> Result<ResolvedDate, DateError> {
    let malformed = || DateError::Malformed {
        attribute: "utc_datetime",
        value: value.to_string(),
    };

    if let Some(captures) = UTC_DATE.captures(value) {
        let date = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").map_err(|_| malformed())?;
        return Ok(ResolvedDate {
            timestamp: Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
            dateloc: DATELOC_EXACT_DATE,
            timeloc: LOC_UNSPECIFIED,
        });
    }

    if UTC_FULL.is_match(value) {
        let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| malformed())?;
        return Ok(ResolvedDate {
            timestamp: parsed.with_timezone(&Utc),
            dateloc: DATELOC_EXACT_DATE,
            timeloc: TIMELOC_EXACT_TIME,
        });
    }

    Err(malformed())
}

/// Parse a `local_datetime` value observed at `offset`.
pub fn parse_local(value: &str, offset: FixedOffset) -> Result<ResolvedDate, DateError> {
    let malformed = || DateError::Malformed {
        attribute: "local_datetime",
        value: value.to_string(),
    };

    let (naive, timeloc) = if LOCAL_DATE.is_match(value) {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| malformed())?;
        (date.and_time(NaiveTime::MIN), LOC_UNSPECIFIED)
    } else if LOCAL_FULL.is_match(value) {
        let datetime =
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map_err(|_| malformed())?;
        (datetime, TIMELOC_EXACT_TIME)
    } else {
        return Err(malformed());
    };

    let local = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(malformed)?;

    Ok(ResolvedDate {
        timestamp: local.with_timezone(&Utc),
        dateloc: DATELOC_EXACT_DATE,
        timeloc,
    })
}

/// Parse a stored site time zone (`+HH:MM`, `-HHMM`, `Z`, `UTC`).
pub fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim();
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return FixedOffset::east_opt(0);
    }

    let captures = OFFSET.captures(zone)?;
    let hours: i32 = captures[2].parse().ok()?;
    let minutes: i32 = captures[3].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    let seconds = hours * 3600 + minutes * 60;
    match &captures[1] {
        "-" => FixedOffset::west_opt(seconds),
        _ => FixedOffset::east_opt(seconds),
    }
}
