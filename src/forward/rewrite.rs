//! Outbound header rewriting.
//!
//! Runs at send time, never at construction: callers may still change the
//! headers or the body of a response after it was built.
//!
//! | header              | rule                                            |
//! |---------------------|-------------------------------------------------|
//! | `content-type`      | dropped when a body is present (body owns it)   |
//! | `date`              | recomputed, emitted exactly once                |
//! | `warning`           | kept only if its warn-date matches `date`       |
//! | `transfer-encoding` | always dropped (framing is decided later)       |
//! | anything else       | passed through byte for byte, same multiplicity |

use std::time::{SystemTime, UNIX_EPOCH};

use http::header;
use httpdate::HttpDate;

use crate::http::date::{parse_http_date, parse_warning_date, to_http_date};
use crate::http::headers::Headers;
use crate::observability::metrics;

/// Compute the headers to send downstream.
///
/// `now` is used when the response carries no valid `Date`.
pub fn rewrite(headers: &Headers, has_body: bool, now: SystemTime) -> Headers {
    let date = effective_date(headers, now);
    let mut outbound = Headers::new();
    outbound.add(header::DATE, date.to_string());

    let effective = SystemTime::from(date);
    let mut dropped = 0usize;
    for (_, warning) in headers.iter().filter(|(name, _)| **name == header::WARNING) {
        let warned = std::str::from_utf8(warning.as_bytes())
            .ok()
            .and_then(parse_warning_date);
        match warned {
            Some(warned) if warned != effective => dropped += 1,
            _ => {
                outbound.add(header::WARNING, warning.clone());
            }
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, date = %date, "Dropped warnings with a stale warn-date");
    }

    let passed = headers.iter().filter(|(name, _)| {
        let suppressed = (has_body && **name == header::CONTENT_TYPE)
            || **name == header::DATE
            || **name == header::WARNING
            || **name == header::TRANSFER_ENCODING;
        !suppressed
    });
    outbound.extend(passed.map(|(name, value)| (name.clone(), value.clone())));
    outbound
}

/// The `Date` to advertise: the response's own when it parses, else `now`.
///
/// A value that cannot be represented is reported and replaced by the
/// current time.
pub fn effective_date(headers: &Headers, now: SystemTime) -> HttpDate {
    let candidate = headers
        .get("date")
        .and_then(parse_http_date)
        .unwrap_or(now);
    match to_http_date(candidate) {
        Ok(date) => date,
        Err(err) => {
            tracing::warn!(error = %err, "Cannot format Date header, falling back to the current time");
            metrics::record_date_fallback();
            to_http_date(SystemTime::now()).unwrap_or_else(|_| HttpDate::from(UNIX_EPOCH))
        }
    }
}
