//! `Cache-Control` response directive parsing.
//!
//! # Design Decisions
//! - Lenient: unknown or malformed directives are skipped, never fatal
//! - Directive names are case-insensitive, values may be quoted
//! - If a directive repeats, the first occurrence wins

/// Parsed response directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    public: bool,
    private: bool,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    max_age: Option<u32>,
    s_maxage: Option<u32>,
}

impl CacheControl {
    /// Parse a raw header value. An empty or garbage value yields the empty
    /// directive set.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        for directive in value.split(',') {
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(unquote(arg.trim()))),
                None => (directive.trim(), None),
            };
            if name.is_empty() {
                continue;
            }
            match name.to_ascii_lowercase().as_str() {
                "public" => cc.public = true,
                "private" => cc.private = true,
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "must-revalidate" => cc.must_revalidate = true,
                "max-age" => {
                    if cc.max_age.is_none() {
                        cc.max_age = arg.and_then(parse_seconds);
                    }
                }
                "s-maxage" => {
                    if cc.s_maxage.is_none() {
                        cc.s_maxage = arg.and_then(parse_seconds);
                    }
                }
                other => {
                    tracing::trace!(directive = other, "Ignoring cache-control directive");
                }
            }
        }
        cc
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn is_no_store(&self) -> bool {
        self.no_store
    }

    pub fn must_revalidate(&self) -> bool {
        self.must_revalidate
    }

    /// `max-age` in seconds, `0` when absent or invalid.
    pub fn max_age_seconds(&self) -> u32 {
        self.max_age.unwrap_or(0)
    }

    /// `s-maxage` in seconds, `0` when absent or invalid.
    pub fn s_maxage_seconds(&self) -> u32 {
        self.s_maxage.unwrap_or(0)
    }
}

fn unquote(arg: &str) -> &str {
    arg.strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg)
}

// Delta-seconds: digits only; overflow saturates like RFC 9111 asks.
fn parse_seconds(arg: &str) -> Option<u32> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(arg.parse::<u32>().unwrap_or(u32::MAX))
}
