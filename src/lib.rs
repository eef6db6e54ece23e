pub mod api;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod runner;
pub mod supervisor;

pub use api::{create_router, AppState};
pub use config::AppConfig;
pub use control::{
    ActivityTracker, Clock, CommandLayout, ControlState, RunStatus, SystemClock, TrainParams,
    TrainRequest, TrainResponse, TrainingGuard, ValidateRequest,
};
pub use error::{Result, ServiceError};
pub use runner::{run_and_capture, split_lines, ProcessResult};
pub use supervisor::{
    IdleWatchdog, IdleWatchdogConfig, SignalTerminator, Terminator, WatchdogState,
};
