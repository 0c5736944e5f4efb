use http::HeaderMap;

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Rate-limit counters reported on a response
///
/// `limit` is kept verbatim since it may exceed any integer type. `remaining`
/// and `reset` are `None` when missing or unparseable; a bad value never fails
/// the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: String,
    pub remaining: Option<i64>,
    pub reset: Option<i64>,
}

impl RateLimitSnapshot {
    /// Snapshot from response headers; `None` without a limit header
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = headers.get(RATE_LIMIT_LIMIT)?;
        let limit = String::from_utf8_lossy(limit.as_bytes()).into_owned();

        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_leading_int)
        };

        Some(Self {
            limit,
            remaining: parse(RATE_LIMIT_REMAINING),
            reset: parse(RATE_LIMIT_RESET),
        })
    }
}

/// Base-10 integer prefix of `value`: leading whitespace and one sign allowed,
/// trailing characters ignored. A digit run wider than `i64` is unparseable.
fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
