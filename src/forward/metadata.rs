//! Caching metadata derived from an origin response.

use crate::http::cache_control::CacheControl;
use crate::http::date::{millis_between, parse_http_date};
use crate::http::headers::Headers;

/// What a cache layer needs to know about a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    /// `Cache-Control` carried `public`.
    pub public_cache_control: bool,
    /// Freshness lifetime in milliseconds; negative means already expired,
    /// `None` means it could not be determined.
    pub max_age: Option<i64>,
    /// Raw `ETag` value.
    pub etag: Option<String>,
}

impl CacheMetadata {
    /// Derive metadata from origin headers.
    ///
    /// Only `public` responses get a lifetime: `max-age` when positive,
    /// otherwise `Expires - Date` when both parse.
    pub fn from_headers(headers: &Headers) -> Self {
        let etag = headers.get("etag").map(str::to_string);
        let Some(cc) = headers.get("cache-control").map(CacheControl::parse) else {
            return Self {
                etag,
                ..Self::default()
            };
        };
        if !cc.is_public() {
            return Self {
                etag,
                ..Self::default()
            };
        }

        let max_age = if cc.max_age_seconds() > 0 {
            Some(i64::from(cc.max_age_seconds()) * 1000)
        } else {
            let date = headers.get("date").and_then(parse_http_date);
            let expires = headers.get("expires").and_then(parse_http_date);
            match (date, expires) {
                (Some(date), Some(expires)) => Some(millis_between(date, expires)),
                _ => None,
            }
        };

        Self {
            public_cache_control: true,
            max_age,
            etag,
        }
    }
}
