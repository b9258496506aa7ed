//! Classification of raw channel errors

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a failed send means for the pass and the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Abort the pass and cool down
    RateLimited,
    NetworkTransient,
    AuthInvalid,
    DestinationForbidden,
    MalformedRequest,
    DestinationNotFound,
    /// Treated as transient
    Unknown,
}

impl ErrorKind {
    /// Errors that will not succeed on retry without outside intervention.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::AuthInvalid
                | Self::DestinationForbidden
                | Self::MalformedRequest
                | Self::DestinationNotFound
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NetworkTransient => "network_transient",
            Self::AuthInvalid => "auth_invalid",
            Self::DestinationForbidden => "destination_forbidden",
            Self::MalformedRequest => "malformed_request",
            Self::DestinationNotFound => "destination_not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// First match wins
static PATTERNS: LazyLock<Vec<(Regex, ErrorKind)>> = LazyLock::new(|| {
    [
        (r"\b429\b|too many requests|retry_after|retry after", ErrorKind::RateLimited),
        (r"\b401\b|unauthorized", ErrorKind::AuthInvalid),
        (r"\b403\b|forbidden", ErrorKind::DestinationForbidden),
        (r"\b404\b|not found", ErrorKind::DestinationNotFound),
        (r"\b400\b|bad request", ErrorKind::MalformedRequest),
        (r"network|timeout|timed out|connection", ErrorKind::NetworkTransient),
    ]
    .into_iter()
    .map(|(pattern, kind)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("Invalid classifier pattern");
        (regex, kind)
    })
    .collect()
});

static RETRY_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"retry_after"\s*:\s*(\d+)|retry[ -]after:?\s*(\d+)"#)
        .expect("Invalid retry-after pattern")
});

/// Classify a raw transport error string.
#[must_use]
pub fn classify(raw: &str) -> ErrorKind {
    PATTERNS
        .iter()
        .find(|(regex, _)| regex.is_match(raw))
        .map_or(ErrorKind::Unknown, |(_, kind)| *kind)
}

/// Server-declared wait carried by a rate-limit error, if any.
#[must_use]
pub fn retry_after_hint(raw: &str) -> Option<Duration> {
    let captures = RETRY_AFTER.captures(raw)?;
    let seconds = captures
        .get(1)
        .or_else(|| captures.get(2))?
        .as_str()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes_and_phrases() {
        let cases = [
            ("429: {\"ok\":false}", ErrorKind::RateLimited),
            ("Too Many Requests", ErrorKind::RateLimited),
            ("401: Unauthorized", ErrorKind::AuthInvalid),
            ("403: Forbidden: bot was blocked", ErrorKind::DestinationForbidden),
            ("404: Not Found", ErrorKind::DestinationNotFound),
            ("400: Bad Request: message text is empty", ErrorKind::MalformedRequest),
            ("network error: connection refused", ErrorKind::NetworkTransient),
            ("timeout: deadline elapsed", ErrorKind::NetworkTransient),
            ("operation timed out", ErrorKind::NetworkTransient),
            ("something odd happened", ErrorKind::Unknown),
        ];

        for (raw, expected) in cases {
            assert_eq!(classify(raw), expected, "{raw}");
        }
    }

    #[test]
    fn rate_limit_wins_over_other_codes() {
        assert_eq!(
            classify("400: Bad Request: retry after 5"),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn status_codes_need_word_boundaries() {
        assert_eq!(classify("message 14290 failed"), ErrorKind::Unknown);
        assert_eq!(classify("id 4011"), ErrorKind::Unknown);
    }

    #[test]
    fn extracts_retry_after_hints() {
        assert_eq!(
            retry_after_hint(r#"429: {"parameters":{"retry_after": 35}}"#),
            Some(Duration::from_secs(35))
        );
        assert_eq!(
            retry_after_hint("Too Many Requests: retry after 7"),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            retry_after_hint("Retry-After: 12"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(retry_after_hint("429: Too Many Requests"), None);
    }

    #[test]
    fn permanent_kinds() {
        assert!(ErrorKind::MalformedRequest.is_permanent());
        assert!(ErrorKind::AuthInvalid.is_permanent());
        assert!(!ErrorKind::RateLimited.is_permanent());
        assert!(!ErrorKind::NetworkTransient.is_permanent());
        assert!(!ErrorKind::Unknown.is_permanent());
    }
}
