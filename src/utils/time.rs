use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parses a backend timestamp. The session API answers either RFC 3339 or a
/// compact UTC form `YYYYMMDDHHMMSS` with optional trailing milliseconds.
pub fn parse_backend_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let digits = value.trim();
    if digits.len() < 14 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("unrecognised backend datetime '{value}'"));
    }

    let field = |range: std::ops::Range<usize>| -> Result<u32> {
        digits[range]
            .parse::<u32>()
            .with_context(|| format!("invalid digits in '{value}'"))
    };

    let year = digits[0..4]
        .parse::<i32>()
        .with_context(|| format!("invalid year in '{value}'"))?;
    let millis = if digits.len() >= 17 { field(14..17)? } else { 0 };

    let naive: NaiveDateTime = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)
        .and_then(|date| {
            date.and_hms_milli_opt(field(8..10).ok()?, field(10..12).ok()?, field(12..14).ok()?, millis)
        })
        .ok_or_else(|| anyhow!("out-of-range backend datetime '{value}'"))?;

    Ok(naive.and_utc())
}

/// `MM:SS`, minutes keep growing past 59.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
