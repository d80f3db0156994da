//! Fixed-window label rate limiting
//!
//! One limiter per logical counter. Admission state persists through a
//! [`CounterStore`] so a restart continues the same hour instead of
//! handing out a fresh budget.

use crate::counters::{CounterStore, RateWindow};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Hourly fixed-window admission
///
/// `admit` is the only gate and it counts admissions, not successful
/// prints: a unit that is admitted and later fails dispatch still consumed
/// quota. Denials never change the counter.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    limit: u32,
    window: RateWindow,
}

impl RateLimiter {
    pub fn new(name: &'static str, limit: u32, window: RateWindow) -> Self {
        Self {
            name,
            limit,
            window,
        }
    }

    /// Build from whatever the store holds, degrading to a fresh window on
    /// missing or unreadable state
    pub fn from_store(name: &'static str, limit: u32, store: &CounterStore) -> Self {
        let now = Utc::now();
        let window = match store.load_window() {
            Ok(Some(window)) => window,
            Ok(None) => Self::seed(name, store, now),
            Err(e) => {
                warn!(limiter = name, error = %e, "Window state unreadable, starting fresh");
                Self::seed(name, store, now)
            }
        };
        Self::new(name, limit, window)
    }

    fn seed(name: &'static str, store: &CounterStore, now: DateTime<Utc>) -> RateWindow {
        let fresh = RateWindow::fresh(now);
        if let Err(e) = store.save_window(&fresh) {
            warn!(limiter = name, error = %e, "Could not seed window state");
        }
        fresh
    }

    /// Admit one label into the current window
    ///
    /// Rolls the window over when its hour is up, then either counts the
    /// admission (true) or reports the budget spent (false).
    pub fn admit(&mut self, store: &CounterStore) -> bool {
        self.admit_at(store, Utc::now())
    }

    fn admit_at(&mut self, store: &CounterStore, now: DateTime<Utc>) -> bool {
        if self.window.is_expired(now) {
            info!(
                limiter = self.name,
                spent = self.window.count,
                "Hour window rolled over"
            );
            self.window = RateWindow::fresh(now);
            self.persist(store);
        }

        if self.window.count < self.limit {
            self.window.count += 1;
            self.persist(store);
            true
        } else {
            false
        }
    }

    /// Labels left in the current window
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.window.count)
    }

    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    fn persist(&self, store: &CounterStore) {
        // The in-memory window stays authoritative if the write fails
        if let Err(e) = store.save_window(&self.window) {
            warn!(limiter = self.name, error = %e, "Window state not persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn store() -> (TempDir, CounterStore) {
        let dir = TempDir::new().unwrap();
        let store = CounterStore::new(
            dir.path().join("estado_contador.txt"),
            dir.path().join("contador_id_numero.txt"),
        );
        (dir, store)
    }

    #[test]
    fn test_limit_never_exceeded() {
        let (_dir, store) = store();
        let mut limiter = RateLimiter::from_store("test", 5, &store);

        let admitted = (0..8).filter(|_| limiter.admit(&store)).count();
        assert_eq!(admitted, 5);
        assert_eq!(limiter.remaining(), 0);
        assert_eq!(store.load_window().unwrap().unwrap().count, 5);
    }

    #[test]
    fn test_denial_does_not_consume() {
        let (_dir, store) = store();
        let mut limiter = RateLimiter::from_store("test", 1, &store);

        assert!(limiter.admit(&store));
        assert!(!limiter.admit(&store));
        assert!(!limiter.admit(&store));
        assert_eq!(store.load_window().unwrap().unwrap().count, 1);
    }

    #[test]
    fn test_window_rollover_restores_budget() {
        let (_dir, store) = store();
        let aged = RateWindow {
            count: 3,
            started_at: Utc::now() - ChronoDuration::hours(2),
        };
        store.save_window(&aged).unwrap();

        let mut limiter = RateLimiter::from_store("test", 3, &store);
        assert!(limiter.admit(&store));

        let persisted = store.load_window().unwrap().unwrap();
        assert_eq!(persisted.count, 1);
        assert!(persisted.started_at > aged.started_at);
    }

    #[test]
    fn test_window_boundary() {
        let (_dir, store) = store();
        let start = Utc::now();
        let mut limiter = RateLimiter::new("test", 10, RateWindow::fresh(start));

        assert!(limiter.admit_at(&store, start + ChronoDuration::seconds(3599)));
        assert_eq!(limiter.window().started_at, start);

        assert!(limiter.admit_at(&store, start + ChronoDuration::seconds(3600)));
        assert_eq!(limiter.window().count, 1);
        assert!(limiter.window().started_at > start);
    }

    #[test]
    fn test_state_resumes_from_store() {
        let (_dir, store) = store();
        {
            let mut limiter = RateLimiter::from_store("test", 10, &store);
            limiter.admit(&store);
            limiter.admit(&store);
            limiter.admit(&store);
        }

        let limiter = RateLimiter::from_store("test", 10, &store);
        assert_eq!(limiter.remaining(), 7);
    }

    #[test]
    fn test_corrupt_state_starts_fresh() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("estado_contador.txt"), "garbage\n").unwrap();

        let limiter = RateLimiter::from_store("test", 10, &store);
        assert_eq!(limiter.remaining(), 10);
        // Seeded a valid file on the way
        assert!(store.load_window().unwrap().is_some());
    }
}
