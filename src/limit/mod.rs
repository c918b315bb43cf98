//! RateCoord: the process-wide, concurrency-safe rate-limit coordinator
//! (spec.md §3–§4.3, §5). A `Coordinator` maps an access token to a
//! `CredSession`, which maps an endpoint key to a [`LimitCell`].
//!
//! Grounded on the original Go implementation's `proxy/session.go`
//! (`sessions`/`session`/`rateLimit` types) for the two-level map shape;
//! translated from `sync.Mutex`-guarded maps to `std::sync::Mutex` ones,
//! matching spec.md §5's "short-critical-section locks covering only
//! lookup-or-insert" — these locks are never held across an `.await`, so a
//! synchronous `std::sync::Mutex` is correct and cheaper than
//! `tokio::sync::Mutex` here.

pub mod cell;
pub mod clock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

pub use cell::{AdmitResult, FinalizeUpdate, LimitCell, Quota, DEFAULT_STUCK_GUARD};
pub use clock::{Clock, FakeClock, SystemClock};

use crate::config::RateLimitConfig;
use crate::error::Error;

/// All cells belonging to one credential's access token, created lazily on
/// first reference.
struct CredSession {
    cells: Mutex<HashMap<String, Arc<LimitCell>>>,
    assume_next: bool,
    stuck_guard: Duration,
}

impl CredSession {
    fn new(assume_next: bool, stuck_guard: Duration) -> Self {
        Self { cells: Mutex::new(HashMap::new()), assume_next, stuck_guard }
    }

    fn cell(&self, endpoint_key: &str) -> Arc<LimitCell> {
        let mut cells = self.cells.lock().expect("cell map mutex poisoned");
        if let Some(cell) = cells.get(endpoint_key) {
            return cell.clone();
        }
        let cell = Arc::new(LimitCell::with_stuck_guard(self.assume_next, self.stuck_guard));
        cells.insert(endpoint_key.to_string(), cell.clone());
        cell
    }
}

/// The process-wide rate-limit coordinator. One instance is shared across
/// every caller in the process; it has no knowledge of the RPC transport or
/// any particular endpoint, it only ever sees `(session_key, endpoint_key)`
/// string pairs handed to it by [`crate::pipeline::UpstreamPipeline`].
pub struct RateCoord {
    sessions: Mutex<HashMap<String, Arc<CredSession>>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateCoord {
    /// Creates a coordinator using the real system clock. `config.assume_next`
    /// controls whether every session under this coordinator carries its
    /// observed limit across a reset (see spec.md's `assume_next` glossary
    /// entry); `config.stuck_guard` is the fallback reset horizon from
    /// §4.3 step 2.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// As [`RateCoord::new`], but with an explicit clock source — used by
    /// tests to exercise the 20-minute fallback without a real sleep.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), config, clock }
    }

    fn session(&self, session_key: &str) -> Arc<CredSession> {
        let mut sessions = self.sessions.lock().expect("session map mutex poisoned");
        if let Some(session) = sessions.get(session_key) {
            return session.clone();
        }
        let session = Arc::new(CredSession::new(self.config.assume_next, self.config.stuck_guard));
        sessions.insert(session_key.to_string(), session.clone());
        session
    }

    /// Looks up (creating if necessary) the cell for `(session_key,
    /// endpoint_key)`. Exposed so `finalize` can be called against the same
    /// cell an earlier `admit` returned, without a caller having to hold a
    /// guard object across the upstream round trip.
    fn cell(&self, session_key: &str, endpoint_key: &str) -> Arc<LimitCell> {
        self.session(session_key).cell(endpoint_key)
    }

    /// Admits a caller for `(session_key, endpoint_key)`, waiting up to
    /// `deadline` if the cell is currently `resolving`. On timeout, the cell
    /// is left exactly as it was found — no half-acquired slot to release.
    pub async fn admit(
        &self,
        session_key: &str,
        endpoint_key: &str,
        deadline: Duration,
    ) -> Result<AdmitResult, Error> {
        let cell = self.cell(session_key, endpoint_key);
        let clock = self.clock.clone();
        timeout(deadline, async move { cell.admit(clock.as_ref()).await }).await.map_err(|_| Error::Timeout)
    }

    /// Releases the cell after the matching `admit` call's upstream
    /// interaction ends. Must be called exactly once per `Go`/`Probe`
    /// returned by `admit`, and is safe to call with an all-default `update`
    /// when the upstream call failed before headers were available.
    pub async fn finalize(&self, session_key: &str, endpoint_key: &str, update: FinalizeUpdate) {
        let cell = self.cell(session_key, endpoint_key);
        cell.finalize(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[tokio::test]
    async fn distinct_sessions_have_independent_budgets() {
        let coord = RateCoord::new(RateLimitConfig::default());

        coord.finalize("user-a", "singleton:x", FinalizeUpdate {
            current: Some(0),
            next: None,
            resets_at: Some(SystemTime::now() + Duration::from_secs(60)),
            force_sync: true,
        }).await;

        let a = coord.admit("user-a", "singleton:x", Duration::from_secs(1)).await.unwrap();
        assert!(matches!(a, AdmitResult::Retry(Some(_))));

        // A different session's budget for the same endpoint key is untouched.
        let b = coord.admit("user-b", "singleton:x", Duration::from_secs(1)).await.unwrap();
        assert_eq!(b, AdmitResult::Probe);
    }

    #[tokio::test]
    async fn distinct_endpoint_keys_within_a_session_are_independent() {
        let coord = RateCoord::new(RateLimitConfig::default());
        coord.finalize("user-a", "group:publish", FinalizeUpdate {
            current: Some(0),
            next: None,
            resets_at: Some(SystemTime::now() + Duration::from_secs(60)),
            force_sync: true,
        }).await;

        let publish = coord.admit("user-a", "group:publish", Duration::from_secs(1)).await.unwrap();
        assert!(matches!(publish, AdmitResult::Retry(_)));

        let other = coord.admit("user-a", "singleton:statuses/show.json", Duration::from_secs(1)).await.unwrap();
        assert_eq!(other, AdmitResult::Probe);
    }

    #[tokio::test]
    async fn admit_times_out_without_corrupting_cell() {
        let coord = RateCoord::new(RateLimitConfig::default());

        // Force the cell into `resolving` with no matching finalize.
        let probe = coord.admit("user-a", "singleton:x", Duration::from_secs(1)).await.unwrap();
        assert_eq!(probe, AdmitResult::Probe);

        let waiter = coord.admit("user-a", "singleton:x", Duration::from_millis(50)).await;
        assert!(matches!(waiter, Err(Error::Timeout)));

        // The cell is unchanged: finalizing the original probe still works
        // and the next admission after that sees a normal decision.
        coord.finalize("user-a", "singleton:x", FinalizeUpdate {
            current: Some(10),
            next: None,
            resets_at: Some(SystemTime::now() + Duration::from_secs(60)),
            force_sync: true,
        }).await;
        let after = coord.admit("user-a", "singleton:x", Duration::from_secs(1)).await.unwrap();
        assert_eq!(after, AdmitResult::Go);
    }
}
