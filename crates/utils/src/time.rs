//! Relative time offsets for deadlines and expirations.
//!
//! Task definitions express times as offsets like `"1 day"` or
//! `"2 hours 30 minutes"` relative to task creation.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use kindling_core::{Error, Result};

/// Parse an offset such as `"90 seconds"`, `"2 hours"`, `"1 month"`.
/// Multiple clauses accumulate; a bare negative count is rejected.
pub fn parse_time_offset(input: &str) -> Result<Duration> {
    let mut total = Duration::zero();
    let mut tokens = input.split_whitespace().peekable();
    if tokens.peek().is_none() {
        return Err(Error::config(format!("empty time offset '{input}'")));
    }
    while let Some(count_token) = tokens.next() {
        let count: i64 = count_token
            .parse()
            .map_err(|_| Error::config(format!("bad count '{count_token}' in offset '{input}'")))?;
        if count < 0 {
            return Err(Error::config(format!("negative offset '{input}'")));
        }
        let unit = tokens
            .next()
            .ok_or_else(|| Error::config(format!("missing unit in offset '{input}'")))?;
        let unit = unit.trim_end_matches('s');
        total = total
            + match unit {
                "second" | "sec" => Duration::seconds(count),
                "minute" | "min" => Duration::minutes(count),
                "hour" => Duration::hours(count),
                "day" => Duration::days(count),
                "week" => Duration::weeks(count),
                "month" => Duration::days(count * 30),
                "year" => Duration::days(count * 365),
                other => {
                    return Err(Error::config(format!(
                        "unknown unit '{other}' in offset '{input}'"
                    )))
                }
            };
    }
    Ok(total)
}

/// RFC 3339 timestamp `offset` from `base`.
pub fn json_time_from(base: DateTime<Utc>, offset: &str) -> Result<String> {
    let duration = parse_time_offset(offset)?;
    Ok((base + duration).to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// RFC 3339 timestamp `offset` from now.
pub fn json_time_from_now(offset: &str) -> Result<String> {
    json_time_from(Utc::now(), offset)
}

/// RFC 3339 timestamp for the current instant.
pub fn current_json_time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
