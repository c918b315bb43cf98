//! The error taxonomy surfaced by the core (§7).
//!
//! The teacher crate models its errors as `Box<dyn std::error::Error + Send +
//! Sync>` everywhere, which is fine for a binary's `main` but erases the
//! distinctions callers of a library need to act on (is this worth retrying
//! later? should this be shown to the end user verbatim?). This crate follows
//! the agentgateway example's lead and defines a closed, typed enum instead.

use std::time::SystemTime;

/// A request-level failure. Exactly one variant per row of the taxonomy in
/// spec.md §7.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The credential's budget for this endpoint is exhausted. Non-fatal;
    /// the core does not retry on the caller's behalf. `retry_at` carries the
    /// upstream-declared reset time when known.
    #[error("rate limit exceeded{}", format_retry_at(.retry_at))]
    RateLimit { retry_at: Option<SystemTime> },

    /// The upstream responded with a 4xx status.
    #[error("upstream rejected the request with {status}: {body_prefix}")]
    BadRequest { status: u16, body_prefix: String },

    /// The upstream responded with a 5xx status.
    #[error("upstream responded with {status}: {body_prefix}")]
    Upstream { status: u16, body_prefix: String },

    /// The request never produced a response (DNS, TLS, socket failure).
    /// A finer split of the "Upstream" bucket, carried over from the
    /// original Go implementation's `twitterConnectionError`.
    #[error("connection to upstream failed: {0}")]
    Connection(String),

    /// The upstream responded successfully but a rate-limit header could not
    /// be parsed. Still surfaced after `finalize` has run, so a probe's latch
    /// is never left held because of a malformed header.
    #[error("upstream returned an unparseable {header} header: {value}")]
    BadResponse { header: &'static str, value: String },

    /// Request signing failed: RNG failure, or an internal parameter-set
    /// conflict (a bug, not a runtime condition a caller can work around).
    #[error("failed to sign request: {0}")]
    Signing(String),

    /// The caller-supplied deadline expired before admission or the upstream
    /// round trip completed.
    #[error("request timed out")]
    Timeout,
}

impl Error {
    /// The `resets_at` hint a caller can use to decide when to retry, if this
    /// error carries one.
    pub fn retry_at(&self) -> Option<SystemTime> {
        match self {
            Error::RateLimit { retry_at } => *retry_at,
            _ => None,
        }
    }
}

fn format_retry_at(retry_at: &Option<SystemTime>) -> String {
    match retry_at {
        Some(_) => " (retry hint available)".to_string(),
        None => String::new(),
    }
}
