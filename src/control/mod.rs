//! Control layer for the model scripts
//!
//! [`ControlState`] owns everything the request handlers share: the training guard, the
//! activity tracker and the command layout. It is passed to handlers explicitly, so several
//! independent instances can live in one process.

pub mod activity;
pub mod guard;

pub use activity::{ActivityTracker, Clock, SystemClock};
pub use guard::{TrainingGuard, TrainingPermit};

use crate::config::AppConfig;
use crate::runner::{run_and_capture, ProcessResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_N_NEIGHBORS: i64 = 10;
pub const DEFAULT_LATENT_DIM: i64 = 64;
pub const DEFAULT_EPOCHS: i64 = 30;
pub const DEFAULT_TFIDF_FEATURES: i64 = 300;
pub const DEFAULT_TEST_USER_COUNT: i64 = 100;

pub const BUSY_MESSAGE: &str = "Training already running, try again later.";

/// Training request; missing fields fall back to the defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrainRequest {
    pub n_neighbors: Option<i64>,
    pub latent_dim: Option<i64>,
    pub epochs: Option<i64>,
    pub tfidf_features: Option<i64>,
}

impl TrainRequest {
    pub fn resolve(&self) -> TrainParams {
        TrainParams {
            n_neighbors: self.n_neighbors.unwrap_or(DEFAULT_N_NEIGHBORS),
            latent_dim: self.latent_dim.unwrap_or(DEFAULT_LATENT_DIM),
            epochs: self.epochs.unwrap_or(DEFAULT_EPOCHS),
            tfidf_features: self.tfidf_features.unwrap_or(DEFAULT_TFIDF_FEATURES),
        }
    }
}

/// Hyperparameters actually handed to the training script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainParams {
    pub n_neighbors: i64,
    pub latent_dim: i64,
    pub epochs: i64,
    pub tfidf_features: i64,
}

impl TrainParams {
    fn to_args(self) -> [String; 4] {
        [
            format!("--n_neighbors={}", self.n_neighbors),
            format!("--latent_dim={}", self.latent_dim),
            format!("--epochs={}", self.epochs),
            format!("--tfidf_features={}", self.tfidf_features),
        ]
    }
}

/// Validation request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidateRequest {
    pub test_user_count: Option<i64>,
}

impl ValidateRequest {
    pub fn test_user_count(&self) -> i64 {
        self.test_user_count.unwrap_or(DEFAULT_TEST_USER_COUNT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Busy,
    Finished,
}

/// Response for a script run that completed (successfully or not)
#[derive(Debug, Clone, Serialize)]
pub struct FinishedResponse {
    pub status: RunStatus,
    #[serde(flatten)]
    pub result: ProcessResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_used: Option<TrainParams>,
}

impl FinishedResponse {
    fn new(result: ProcessResult) -> Self {
        Self {
            status: RunStatus::Finished,
            result,
            params_used: None,
        }
    }
}

/// Response when training is already in progress
#[derive(Debug, Clone, Serialize)]
pub struct BusyResponse {
    pub status: RunStatus,
    pub msg: String,
}

impl Default for BusyResponse {
    fn default() -> Self {
        Self {
            status: RunStatus::Busy,
            msg: BUSY_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TrainResponse {
    Busy(BusyResponse),
    Finished(FinishedResponse),
}

impl TrainResponse {
    pub fn status(&self) -> RunStatus {
        match self {
            TrainResponse::Busy(r) => r.status,
            TrainResponse::Finished(r) => r.status,
        }
    }
}

/// Where the scripts live and how they are started
#[derive(Debug, Clone)]
pub struct CommandLayout {
    pub interpreter: String,
    pub working_dir: PathBuf,
    pub train_script: String,
    pub validate_script: String,
    pub predict_script: String,
}

impl CommandLayout {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interpreter: config.runner.interpreter.clone(),
            working_dir: config.runner.working_dir.clone(),
            train_script: config.scripts.train.clone(),
            validate_script: config.scripts.validate.clone(),
            predict_script: config.scripts.predict.clone(),
        }
    }

    pub fn train_command(&self, params: TrainParams) -> Vec<String> {
        let mut command = vec![self.interpreter.clone(), self.train_script.clone()];
        command.extend(params.to_args());
        command
    }

    pub fn validate_command(&self, test_user_count: i64) -> Vec<String> {
        vec![
            self.interpreter.clone(),
            self.validate_script.clone(),
            format!("--test_user_count={}", test_user_count),
        ]
    }

    pub fn predict_command(&self) -> Vec<String> {
        vec![self.interpreter.clone(), self.predict_script.clone()]
    }
}

/// Shared state behind the train/validate/predict operations
#[derive(Debug)]
pub struct ControlState {
    guard: Arc<TrainingGuard>,
    tracker: ActivityTracker,
    commands: CommandLayout,
}

impl ControlState {
    pub fn new(tracker: ActivityTracker, commands: CommandLayout) -> Self {
        Self {
            guard: Arc::new(TrainingGuard::new()),
            tracker,
            commands,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ActivityTracker::new(config.activity.marker_path.clone()),
            CommandLayout::from_config(config),
        )
    }

    pub fn guard(&self) -> &TrainingGuard {
        &self.guard
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    pub fn commands(&self) -> &CommandLayout {
        &self.commands
    }

    /// Run the training script unless a training run is already in progress
    ///
    /// The run happens on its own task holding the permit. Dropping the returned future
    /// (a client hanging up, say) leaves the script and the guard untouched until the
    /// script exits.
    pub async fn train(&self, request: TrainRequest) -> TrainResponse {
        self.tracker.record_activity();

        let Some(permit) = self.guard.try_acquire() else {
            warn!("Training request rejected: training already running");
            return TrainResponse::Busy(BusyResponse::default());
        };

        let params = request.resolve();
        info!(
            n_neighbors = params.n_neighbors,
            latent_dim = params.latent_dim,
            epochs = params.epochs,
            tfidf_features = params.tfidf_features,
            "Starting training run"
        );

        let command = self.commands.train_command(params);
        let working_dir = self.commands.working_dir.clone();
        let run = tokio::spawn(async move {
            let _permit = permit;
            let result = run_and_capture(&command, &working_dir).await;
            info!(returncode = result.returncode, "Training run finished");
            result
        });

        let result = match run.await {
            Ok(result) => result,
            Err(e) => {
                error!("Training task failed: {}", e);
                ProcessResult::launch_failure(&e)
            }
        };

        TrainResponse::Finished(FinishedResponse {
            params_used: Some(params),
            ..FinishedResponse::new(result)
        })
    }

    /// Run the validation script; not guarded
    pub async fn validate(&self, request: ValidateRequest) -> FinishedResponse {
        self.tracker.record_activity();

        let test_user_count = request.test_user_count();
        info!(test_user_count, "Starting model validation");

        let result = run_and_capture(
            &self.commands.validate_command(test_user_count),
            &self.commands.working_dir,
        )
        .await;
        FinishedResponse::new(result)
    }

    /// Run the best-model selection script
    pub async fn predict(&self) -> FinishedResponse {
        self.tracker.record_activity();

        info!("Starting best-model prediction");
        let result = run_and_capture(
            &self.commands.predict_command(),
            &self.commands.working_dir,
        )
        .await;
        FinishedResponse::new(result)
    }
}
