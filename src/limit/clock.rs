//! A small clock seam so the stuck-guard (P5) and monotone-reset (P3)
//! properties can be tested without a real 20-minute sleep.
//!
//! The teacher crate has no equivalent of this — it never needed to fake
//! time — but the same "trait at the seam, production impl vs. test double"
//! shape it uses for `PgPool`-taking functions applies directly here.

use std::sync::Mutex;
use std::time::SystemTime;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The production clock: `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// time-dependent rate-limit behaviour.
#[derive(Debug)]
pub struct FakeClock(Mutex<SystemTime>);

impl FakeClock {
    pub fn new(at: SystemTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: SystemTime) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut guard = self.0.lock().unwrap();
        *guard += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}
