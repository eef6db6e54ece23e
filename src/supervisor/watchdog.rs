//! Idle Watchdog
//!
//! Periodically checks how long ago the last request arrived and asks the process to
//! terminate once it has been idle longer than the configured threshold.

use crate::config::ShutdownConfig;
use crate::control::ActivityTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the idle watchdog
#[derive(Debug, Clone)]
pub struct IdleWatchdogConfig {
    /// Interval between idle checks (default: 60s)
    pub poll_interval: Duration,
    /// Idle minutes tolerated before termination (default: 60)
    pub idle_threshold_minutes: u64,
}

impl Default for IdleWatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            idle_threshold_minutes: 60,
        }
    }
}

impl From<&ShutdownConfig> for IdleWatchdogConfig {
    fn from(config: &ShutdownConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            idle_threshold_minutes: config.idle_threshold_minutes,
        }
    }
}

/// Watchdog lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Watching for idleness
    Running,
    /// Termination requested; terminal
    Terminating,
}

impl std::fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogState::Running => write!(f, "running"),
            WatchdogState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Action taken when the service has been idle for too long
#[cfg_attr(test, mockall::automock)]
pub trait Terminator: Send + Sync {
    fn terminate(&self, idle_minutes: f64);
}

/// Sends SIGTERM to the own process so the server shuts down through its normal path
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalTerminator;

impl Terminator for SignalTerminator {
    fn terminate(&self, idle_minutes: f64) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(
                "Sending SIGTERM to own process after {:.1} idle minutes",
                idle_minutes
            );
            if let Err(e) = kill(Pid::this(), Signal::SIGTERM) {
                error!("Failed to signal own process: {}", e);
            }
        }

        #[cfg(not(unix))]
        {
            info!(
                "Exiting after {:.1} idle minutes (no signal support on this platform)",
                idle_minutes
            );
            std::process::exit(0);
        }
    }
}

/// Idle watchdog for self-termination
pub struct IdleWatchdog {
    config: IdleWatchdogConfig,
    tracker: ActivityTracker,
    terminator: Arc<dyn Terminator>,
    terminating: AtomicBool,
    running: AtomicBool,
    stop_notify: Notify,
}

impl std::fmt::Debug for IdleWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleWatchdog")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .field("state", &self.state())
            .finish()
    }
}

impl IdleWatchdog {
    pub fn new(
        config: IdleWatchdogConfig,
        tracker: ActivityTracker,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            config,
            tracker,
            terminator,
            terminating: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Watchdog that signals the own process
    pub fn with_signal(config: IdleWatchdogConfig, tracker: ActivityTracker) -> Self {
        Self::new(config, tracker, Arc::new(SignalTerminator))
    }

    pub fn config(&self) -> &IdleWatchdogConfig {
        &self.config
    }

    pub fn state(&self) -> WatchdogState {
        if self.terminating.load(Ordering::SeqCst) {
            WatchdogState::Terminating
        } else {
            WatchdogState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one idle check
    ///
    /// Termination is requested at most once over the watchdog's lifetime.
    pub fn poll_once(&self) -> WatchdogState {
        if self.state() == WatchdogState::Terminating {
            return WatchdogState::Terminating;
        }

        let Some(idle_minutes) = self.tracker.idle_minutes() else {
            debug!("No activity recorded yet, nothing to check");
            return WatchdogState::Running;
        };

        if idle_minutes <= self.config.idle_threshold_minutes as f64 {
            debug!(idle_minutes, "Service is active");
            return WatchdogState::Running;
        }

        if self.terminating.swap(true, Ordering::SeqCst) {
            return WatchdogState::Terminating;
        }

        warn!(
            "No requests for {:.1} min (threshold {} min), shutting down service",
            idle_minutes, self.config.idle_threshold_minutes
        );
        self.terminator.terminate(idle_minutes);
        WatchdogState::Terminating
    }

    /// Start the periodic check loop
    ///
    /// The first check runs immediately. The loop keeps ticking after termination has been
    /// requested and relies on the host process exiting; [`IdleWatchdog::stop`] ends it.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Idle watchdog started (threshold: {} min, interval: {:?})",
            self.config.idle_threshold_minutes, self.config.poll_interval
        );

        let watchdog = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(watchdog.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while watchdog.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = interval.tick() => {
                        watchdog.poll_once();
                    }
                    _ = watchdog.stop_notify.notified() => break,
                }
            }

            watchdog.running.store(false, Ordering::SeqCst);
            info!("Idle watchdog stopped");
        })
    }

    /// Stop the check loop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_one();
    }
}
