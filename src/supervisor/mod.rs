//! Supervisor Layer for process lifecycle
//!
//! - Idle watchdog that terminates the service after a period without requests

pub mod watchdog;

pub use watchdog::{
    IdleWatchdog, IdleWatchdogConfig, SignalTerminator, Terminator, WatchdogState,
};
