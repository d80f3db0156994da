//! Durable counters: the hourly rate window and the ticket sequence
//!
//! Two tiny state files under the work directory. `estado_contador.txt`
//! holds the admission count and the window start on two lines;
//! `contador_id_numero.txt` holds the next ticket as a single integer.
//! The formats are pinned so an in-place upgrade of the deployment keeps
//! the running ticket sequence and the open window.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Length of the fixed admission window
pub const WINDOW_LENGTH_SECS: i64 = 3600;

/// Ticket value when no counter file exists yet
const FIRST_TICKET: u64 = 1;

/// Counter persistence errors
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("Counter file IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt counter file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type for counter operations
pub type CounterResult<T> = Result<T, CounterError>;

/// One fixed admission window: how many labels were admitted since when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub started_at: DateTime<Utc>,
}

impl RateWindow {
    /// Fresh window starting now
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            started_at: now,
        }
    }

    /// Whether the window has run its full hour
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.started_at) >= ChronoDuration::seconds(WINDOW_LENGTH_SECS)
    }
}

/// File-backed store for the rate window and the ticket sequence
///
/// Single-writer: the worker is the only process touching these files.
/// Callers degrade on failure (fresh defaults on unreadable state, keep
/// running on failed writes) instead of aborting.
#[derive(Debug, Clone)]
pub struct CounterStore {
    window_path: PathBuf,
    ticket_path: PathBuf,
}

impl CounterStore {
    pub fn new(window_path: impl Into<PathBuf>, ticket_path: impl Into<PathBuf>) -> Self {
        Self {
            window_path: window_path.into(),
            ticket_path: ticket_path.into(),
        }
    }

    /// Load the persisted window; `None` when no file exists yet
    pub fn load_window(&self) -> CounterResult<Option<RateWindow>> {
        if !self.window_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.window_path)?;
        let mut lines = raw.lines();

        let count = lines
            .next()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .ok_or_else(|| self.corrupt_window("missing or non-numeric count"))?;
        let started_at = lines
            .next()
            .and_then(|l| DateTime::parse_from_rfc3339(l.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| self.corrupt_window("missing or unparsable window start"))?;

        Ok(Some(RateWindow { count, started_at }))
    }

    /// Persist the window: count on line one, start on line two
    pub fn save_window(&self, window: &RateWindow) -> CounterResult<()> {
        let body = format!("{}\n{}\n", window.count, window.started_at.to_rfc3339());
        std::fs::write(&self.window_path, body)?;
        Ok(())
    }

    /// Current ticket value without advancing; a missing file reads as 1
    pub fn peek_ticket(&self) -> CounterResult<u64> {
        if !self.ticket_path.exists() {
            return Ok(FIRST_TICKET);
        }
        let raw = std::fs::read_to_string(&self.ticket_path)?;
        raw.trim().parse::<u64>().map_err(|e| CounterError::Corrupt {
            path: self.ticket_path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Read the current ticket, persist its successor, return what was read
    ///
    /// Values are strictly increasing by one across calls as long as this
    /// process is the only writer.
    pub fn next_ticket(&self) -> CounterResult<u64> {
        let current = self.peek_ticket()?;
        std::fs::write(&self.ticket_path, format!("{}\n", current + 1))?;
        Ok(current)
    }

    fn corrupt_window(&self, reason: &str) -> CounterError {
        CounterError::Corrupt {
            path: self.window_path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_ticket_sequence_starts_at_one() {
        let (_dir, store) = store();
        assert_eq!(store.next_ticket().unwrap(), 1);
        assert_eq!(store.next_ticket().unwrap(), 2);
        assert_eq!(store.next_ticket().unwrap(), 3);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let (_dir, store) = store();
        assert_eq!(store.peek_ticket().unwrap(), 1);
        assert_eq!(store.peek_ticket().unwrap(), 1);
        assert_eq!(store.next_ticket().unwrap(), 1);
        assert_eq!(store.peek_ticket().unwrap(), 2);
    }

    #[test]
    fn test_ticket_survives_reopen() {
        let (dir, store) = store();
        store.next_ticket().unwrap();
        store.next_ticket().unwrap();

        let reopened = CounterStore::new(
            dir.path().join("estado_contador.txt"),
            dir.path().join("contador_id_numero.txt"),
        );
        assert_eq!(reopened.peek_ticket().unwrap(), 3);
    }

    #[test]
    fn test_window_roundtrip() {
        let (_dir, store) = store();
        let window = RateWindow {
            count: 7,
            started_at: Utc::now(),
        };
        store.save_window(&window).unwrap();
        assert_eq!(store.load_window().unwrap(), Some(window));
    }

    #[test]
    fn test_window_missing_file() {
        let (_dir, store) = store();
        assert_eq!(store.load_window().unwrap(), None);
    }

    #[test]
    fn test_window_corrupt_file() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("estado_contador.txt"), "not a count\n").unwrap();
        assert!(matches!(
            store.load_window(),
            Err(CounterError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_window_expiry() {
        let now = Utc::now();
        let fresh = RateWindow::fresh(now);
        assert!(!fresh.is_expired(now));
        assert!(!fresh.is_expired(now + ChronoDuration::seconds(WINDOW_LENGTH_SECS - 1)));
        assert!(fresh.is_expired(now + ChronoDuration::seconds(WINDOW_LENGTH_SECS)));
    }
}
