//! `LimitCell`: the per-(credential, endpoint-bucket) rate-limit state
//! machine (spec.md §4.3). This is the hard part of the whole crate.
//!
//! Grounded on the original Go implementation's `proxy/session.go`
//! (`rateLimit.use`/`rateLimit.finish`) for the state transitions, and on
//! spec.md's own Design Notes §9 for the Rust encoding: one mutex guarding
//! cell data, plus a `Notify` standing in for the condition variable the
//! notes describe. New admits that find the cell `resolving` wait on the
//! `Notify` instead of spinning or taking a second "low priority" lock, which
//! gives `finalize` uncontended access to the data mutex without any explicit
//! priority scheme.

use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio::sync::Notify;

use super::clock::Clock;

/// The default stuck-guard duration: 20 minutes, matching the upstream's
/// nominal rate-limit window (spec.md §4.3, Design Notes open question). The
/// original Go source hard-codes this with no config knob; this crate takes
/// the spec's suggestion to expose it as a configurable bound without
/// changing any other observable behaviour.
pub const DEFAULT_STUCK_GUARD: Duration = Duration::from_secs(20 * 60);

/// A remaining-count field that is either unknown (never probed, or reset to
/// unknown) or a known value. Modelled as a tagged variant rather than
/// `Option<u32>` per the Design Notes, so "probe if unknown" is a plain
/// `match` arm instead of an `if let None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Unknown,
    Known(u32),
}

impl Quota {
    pub fn known(self) -> Option<u32> {
        match self {
            Quota::Known(n) => Some(n),
            Quota::Unknown => None,
        }
    }
}

/// The result of a successful `admit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitResult {
    /// The caller may proceed as an ordinary admitted request.
    Go,
    /// The caller may proceed as the single designated probe for an
    /// unknown-quota cell. Must still call `finalize` exactly once.
    Probe,
    /// The budget is exhausted; the caller should surface a rate-limit error.
    /// Carries the known reset time, if any.
    Retry(Option<SystemTime>),
}

/// The header-derived facts reported back to a cell after an upstream call
/// completes (or fails before headers could be parsed, in which case every
/// field is `None`/`false`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeUpdate {
    pub current: Option<u32>,
    pub next: Option<u32>,
    pub resets_at: Option<SystemTime>,
    pub force_sync: bool,
}

struct CellData {
    current: Quota,
    next: Quota,
    resets_at: Option<SystemTime>,
    resolving: bool,
}

impl CellData {
    fn new() -> Self {
        Self { current: Quota::Unknown, next: Quota::Unknown, resets_at: None, resolving: false }
    }
}

/// The bookkeeping unit for one `(credential, endpoint-bucket)` pair.
pub struct LimitCell {
    data: Mutex<CellData>,
    resolved: Notify,
    assume_next: bool,
    stuck_guard: Duration,
}

impl LimitCell {
    pub fn new(assume_next: bool) -> Self {
        Self::with_stuck_guard(assume_next, DEFAULT_STUCK_GUARD)
    }

    pub fn with_stuck_guard(assume_next: bool, stuck_guard: Duration) -> Self {
        Self { data: Mutex::new(CellData::new()), resolved: Notify::new(), assume_next, stuck_guard }
    }

    /// Attempts to admit one caller, blocking (without spinning) while
    /// another caller's probe is in flight. The decision is made against
    /// `clock.now()`, allowing tests to simulate the passage of time without
    /// a real sleep.
    pub async fn admit(&self, clock: &dyn Clock) -> AdmitResult {
        loop {
            let mut data = self.data.lock().await;

            if data.resolving {
                // Register as a waiter on the completion signal *before*
                // dropping the data lock, so a `finalize` that runs between
                // the check above and the await below cannot be missed.
                let notified = self.resolved.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                drop(data);
                notified.await;
                continue;
            }

            let now = clock.now();
            self.apply_reset(&mut data, now);

            return match data.current {
                Quota::Unknown => {
                    data.resolving = true;
                    AdmitResult::Probe
                }
                Quota::Known(0) => AdmitResult::Retry(data.resets_at),
                Quota::Known(remaining) => {
                    data.current = Quota::Known(remaining - 1);
                    AdmitResult::Go
                }
            };
        }
    }

    /// Applies the stuck-guard and window-rollover rules (spec.md §4.3 step 2)
    /// to `data` as of `now`. Caller holds the data lock.
    fn apply_reset(&self, data: &mut CellData, now: SystemTime) {
        match data.resets_at {
            None => {
                if data.current == Quota::Known(0) {
                    data.resets_at = Some(now + self.stuck_guard);
                }
            }
            Some(resets_at) if now > resets_at => {
                match data.next {
                    Quota::Known(n) => {
                        data.current = Quota::Known(n);
                        if !self.assume_next {
                            data.next = Quota::Unknown;
                        }
                    }
                    Quota::Unknown => {
                        data.current = Quota::Unknown;
                    }
                }
                data.resets_at = None;
            }
            Some(_) => {}
        }
    }

    /// Releases the cell after an upstream call, admitted via `Go` or
    /// `Probe`, completes. Always runs to completion, never blocks on a
    /// deadline, and is safe to call even when the caller's upstream attempt
    /// failed before any header could be parsed (`update` is then all-`None`).
    pub async fn finalize(&self, update: FinalizeUpdate) {
        let mut data = self.data.lock().await;

        let was_resolving = data.resolving;
        data.resolving = false;

        if update.force_sync || data.current == Quota::Unknown {
            if let Some(current) = update.current {
                data.current = Quota::Known(current);
            }
        }

        if let Some(next) = update.next {
            data.next = Quota::Known(next);
        }

        if let Some(resets_at) = update.resets_at {
            let advances = match data.resets_at {
                None => true,
                Some(existing) => resets_at > existing,
            };
            if advances {
                data.resets_at = Some(resets_at);
            }
        }

        drop(data);

        if was_resolving {
            self.resolved.notify_waiters();
        }
    }

    #[cfg(test)]
    async fn snapshot(&self) -> (Quota, Quota, Option<SystemTime>, bool) {
        let data = self.data.lock().await;
        (data.current, data.next, data.resets_at, data.resolving)
    }
}
