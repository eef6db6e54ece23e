//! Last-request marker
//!
//! The marker is a plain text file holding one epoch timestamp in seconds. It lives outside
//! process memory so it survives restarts on the same host. Writers race freely; every write
//! is "now", so last-writer-wins is fine.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of wall-clock time, in seconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Reads and writes the last-request marker
#[derive(Clone)]
pub struct ActivityTracker {
    marker_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("marker_path", &self.marker_path)
            .finish()
    }
}

impl ActivityTracker {
    /// Tracker backed by the system clock
    pub fn new(marker_path: impl Into<PathBuf>) -> Self {
        Self::with_clock(marker_path, Arc::new(SystemClock))
    }

    pub fn with_clock(marker_path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            marker_path: marker_path.into(),
            clock,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Overwrite the marker with the current time
    ///
    /// A failed write is logged and swallowed; request handling must not fail because of it.
    pub fn record_activity(&self) {
        let now = self.clock.now();

        if let Some(parent) = self.marker_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(
                        "Failed to create marker directory {}: {}",
                        parent.display(),
                        e
                    );
                    return;
                }
            }
        }

        match fs::write(&self.marker_path, now.to_string()) {
            Ok(()) => debug!(timestamp = now, "Recorded request activity"),
            Err(e) => warn!(
                "Failed to write activity marker {}: {}",
                self.marker_path.display(),
                e
            ),
        }
    }

    /// Timestamp of the last recorded request
    ///
    /// `None` when the marker is missing, unreadable or does not hold a finite number.
    pub fn last_activity_time(&self) -> Option<f64> {
        let raw = fs::read_to_string(&self.marker_path).ok()?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|timestamp| timestamp.is_finite())
    }

    /// Minutes elapsed since the last recorded request
    pub fn idle_minutes(&self) -> Option<f64> {
        self.last_activity_time()
            .map(|last| (self.clock.now() - last) / 60.0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use std::sync::Mutex;

    /// Clock that only moves when told to
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<f64>,
    }

    impl ManualClock {
        pub fn at(now: f64) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn set(&self, now: f64) {
            *self.now.lock().unwrap() = now;
        }

        pub fn advance_minutes(&self, minutes: f64) {
            *self.now.lock().unwrap() += minutes * 60.0;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            *self.now.lock().unwrap()
        }
    }
}
