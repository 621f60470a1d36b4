use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::ConfigError;

const MAX_OFFSET_SECS: i32 = 14 * 3600;

/// Common abbreviations accepted in place of a numeric offset.
const ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("BST", 3600),
    ("CET", 3600),
    ("CEST", 2 * 3600),
    ("EET", 2 * 3600),
    ("EEST", 3 * 3600),
    ("MSK", 3 * 3600),
    ("IST", 5 * 3600 + 1800),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
    ("JST", 9 * 3600),
    ("KST", 9 * 3600),
    ("AEST", 10 * 3600),
    ("AEDT", 11 * 3600),
    ("NZST", 12 * 3600),
];

/// A guild's default time zone, persisted under the `timezone` setting.
///
/// The serialized form is whatever [`fmt::Display`] produces: the abbreviation
/// when the zone was given as one, otherwise `UTC±HH:MM`. Both forms parse
/// back to the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZoneSetting {
    abbreviation: Option<&'static str>,
    offset: FixedOffset,
}

impl TimeZoneSetting {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::TimeZoneUnspecified);
        }
        let invalid = || ConfigError::InvalidTimeZone(trimmed.to_string());
        let upper = trimmed.to_ascii_uppercase();

        if let Some(&(abbreviation, secs)) = ABBREVIATIONS.iter().find(|(a, _)| *a == upper) {
            let offset = FixedOffset::east_opt(secs).ok_or_else(invalid)?;
            // Plain UTC spellings normalize to the numeric form.
            let abbreviation =
                (!matches!(abbreviation, "UTC" | "GMT" | "Z")).then_some(abbreviation);
            return Ok(Self { abbreviation, offset });
        }

        let rest = ["UTC", "GMT"]
            .iter()
            .find_map(|base| upper.strip_prefix(base))
            .unwrap_or(upper.as_str())
            .trim();
        let secs = parse_offset(rest).ok_or_else(invalid)?;
        let offset = FixedOffset::east_opt(secs).ok_or_else(invalid)?;
        Ok(Self { abbreviation: None, offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset())
    }
}

impl fmt::Display for TimeZoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(abbreviation) = self.abbreviation {
            return f.write_str(abbreviation);
        }
        let secs = self.offset.local_minus_utc();
        let sign = if secs < 0 { '-' } else { '+' };
        let secs = secs.abs();
        write!(f, "UTC{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
    }
}

/// `+2`, `-5:30`, `+0100`, `+01:00`. Returns seconds east of UTC.
fn parse_offset(raw: &str) -> Option<i32> {
    let (sign, digits) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => return None,
    };
    // Byte-offset splitting below assumes one byte per character.
    if !digits.is_ascii() {
        return None;
    }

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !minutes.chars().all(|c| c.is_ascii_digit()) || minutes.len() > 2 {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    let secs = hours * 3600 + minutes * 60;
    (secs <= MAX_OFFSET_SECS).then_some(sign * secs)
}
