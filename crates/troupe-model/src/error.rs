// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

/// Typed failures of a provider call.
///
/// Every driver maps its transport and HTTP-status failures onto these
/// variants so the engines can apply one error policy regardless of
/// provider flavor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Transport-level failure: DNS, connect, TLS, or a dropped connection.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the configured credential (HTTP 401/403).
    #[error("provider rejected credentials")]
    AuthRejected,

    /// The provider throttled the request (HTTP 429), possibly suggesting
    /// a backoff interval.
    #[error("rate limited by provider{}", backoff_hint(.retry_after))]
    RateLimited {
        retry_after: Option<Duration>,
    },

    /// Total wall time exceeded the provider-configured ceiling.
    #[error("provider call timed out")]
    Timeout,

    /// The provider answered, but the body was not a valid completion.
    #[error("malformed provider response: {0}")]
    Protocol(String),
}

fn backoff_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl ModelError {
    /// Map a reqwest transport error onto the matching variant.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }

    /// Map a non-success HTTP status (plus its body and headers) onto the
    /// matching variant.  `retry_after` is the parsed `retry-after` header
    /// in seconds, when the provider sent one.
    pub fn from_status(status: reqwest::StatusCode, body: String, retry_after: Option<u64>) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthRejected,
            429 => Self::RateLimited {
                retry_after: retry_after.map(Duration::from_secs),
            },
            _ => Self::Protocol(format!("HTTP {status}: {body}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_maps_to_auth_rejected() {
        let e = ModelError::from_status(reqwest::StatusCode::UNAUTHORIZED, "nope".into(), None);
        assert!(matches!(e, ModelError::AuthRejected));
    }

    #[test]
    fn status_429_carries_retry_after() {
        let e = ModelError::from_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            String::new(),
            Some(30),
        );
        match e {
            ModelError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_500_maps_to_protocol() {
        let e = ModelError::from_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "boom".into(),
            None,
        );
        match e {
            ModelError::Protocol(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_display_includes_backoff() {
        let e = ModelError::RateLimited { retry_after: Some(Duration::from_secs(12)) };
        assert!(e.to_string().contains("12s"));
        let e = ModelError::RateLimited { retry_after: None };
        assert!(!e.to_string().contains("retry after"));
    }
}
