//! HTTP-date handling.
//!
//! # Responsibilities
//! - Parse and format IMF-fixdate values (`Date`, `Expires`)
//! - Extract the warn-date embedded in a `Warning` value
//!
//! Formatting is range-checked: `httpdate` only represents instants between
//! the Unix epoch and the end of year 9999.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use httpdate::HttpDate;
use thiserror::Error;

/// First second that no longer fits a four-digit year.
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_800;

/// Errors raised while turning an instant into an HTTP-date.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("instant {0:?} is outside the HTTP-date range")]
    OutOfRange(SystemTime),
}

/// Parse an HTTP-date, tolerating surrounding whitespace.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Convert an instant to second-precision `HttpDate`.
pub fn to_http_date(instant: SystemTime) -> Result<HttpDate, DateError> {
    match instant.duration_since(UNIX_EPOCH) {
        Ok(since) if since.as_secs() < MAX_HTTP_DATE_SECS => Ok(HttpDate::from(instant)),
        _ => Err(DateError::OutOfRange(instant)),
    }
}

/// Format an instant as an IMF-fixdate.
pub fn format_http_date(instant: SystemTime) -> Result<String, DateError> {
    to_http_date(instant).map(|date| date.to_string())
}

/// Signed difference `later - earlier` in milliseconds.
pub fn millis_between(earlier: SystemTime, later: SystemTime) -> i64 {
    match later.duration_since(earlier) {
        Ok(ahead) => clamp_millis(ahead),
        Err(behind) => -clamp_millis(behind.duration()),
    }
}

fn clamp_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Warn-date of a `Warning` value, if it carries a parseable one.
///
/// Grammar: `warn-code SP warn-agent SP warn-text [ SP warn-date ]` where both
/// warn-text and warn-date are quoted strings.
pub fn parse_warning_date(value: &str) -> Option<SystemTime> {
    let mut quoted = QuotedStrings::new(value);
    quoted.next()?;
    let date = quoted.next()?;
    parse_http_date(&date)
}

/// Iterator over the quoted-string tokens of a header value.
struct QuotedStrings<'a> {
    chars: std::str::Chars<'a>,
}

impl<'a> QuotedStrings<'a> {
    fn new(value: &'a str) -> Self {
        Self { chars: value.chars() }
    }
}

impl Iterator for QuotedStrings<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        // Skip to the opening quote.
        self.chars.by_ref().find(|c| *c == '"')?;
        let mut token = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => return Some(token),
                '\\' => token.push(self.chars.next()?),
                other => token.push(other),
            }
        }
        // Unterminated quoted string.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

    #[test]
    fn round_trips_imf_fixdate() {
        let parsed = parse_http_date(SAMPLE).unwrap();
        assert_eq!(format_http_date(parsed).unwrap(), SAMPLE);
        assert_eq!(parse_http_date("  Wed, 21 Oct 2015 07:28:00 GMT "), Some(parsed));
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(parse_http_date("yesterday"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn format_out_of_range_is_an_error() {
        let before_epoch = UNIX_EPOCH - Duration::from_secs(1);
        assert!(format_http_date(before_epoch).is_err());

        let far_future = UNIX_EPOCH + Duration::from_secs(MAX_HTTP_DATE_SECS);
        assert_eq!(
            format_http_date(far_future),
            Err(DateError::OutOfRange(far_future))
        );
    }

    #[test]
    fn signed_millis() {
        let a = UNIX_EPOCH + Duration::from_secs(100);
        let b = UNIX_EPOCH + Duration::from_secs(160);
        assert_eq!(millis_between(a, b), 60_000);
        assert_eq!(millis_between(b, a), -60_000);
    }

    #[test]
    fn extracts_warn_date() {
        let value = format!("110 proxy.example \"Response is \\\"stale\\\"\" \"{SAMPLE}\"");
        assert_eq!(parse_warning_date(&value), parse_http_date(SAMPLE));
    }

    #[test]
    fn warning_without_date() {
        assert_eq!(parse_warning_date("199 - \"Miscellaneous warning\""), None);
        assert_eq!(parse_warning_date("199 - \"unterminated"), None);
        assert_eq!(parse_warning_date("not a warning"), None);
        assert_eq!(parse_warning_date("110 - \"stale\" \"not a date\""), None);
    }
}
