use crate::control::ControlState;
use crate::supervisor::{IdleWatchdog, WatchdogState};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Training guard, activity tracker and script layout
    pub control: Arc<ControlState>,

    /// Idle watchdog (absent when auto-shutdown is disabled)
    pub watchdog: Option<Arc<IdleWatchdog>>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(control: Arc<ControlState>, watchdog: Option<Arc<IdleWatchdog>>) -> Self {
        Self {
            control,
            watchdog,
            start_time: Utc::now(),
        }
    }

    /// Watchdog state, if a watchdog is attached
    pub fn watchdog_state(&self) -> Option<WatchdogState> {
        self.watchdog.as_ref().map(|w| w.state())
    }

    /// Get service uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
