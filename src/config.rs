use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub runner: RunnerConfig,
    pub scripts: ScriptsConfig,
    pub activity: ActivityConfig,
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Program used to run every script (e.g. "python")
    pub interpreter: String,
    /// Working directory for spawned scripts
    pub working_dir: PathBuf,
}

/// Script paths, relative to `runner.working_dir`
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    pub train: String,
    pub validate: String,
    pub predict: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// File holding the last-request timestamp
    pub marker_path: PathBuf,
    /// Record activity once at startup so a stale marker cannot stop a fresh process
    #[serde(default)]
    pub touch_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Spawn the idle watchdog
    pub enabled: bool,
    /// Minutes without requests before the service terminates itself
    pub idle_threshold_minutes: u64,
    /// Seconds between watchdog checks
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub fn default_directives(&self) -> String {
        format!("{},tower_http=warn", self.level)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("runner.interpreter", "python")?
            .set_default("runner.working_dir", "/app/src")?
            .set_default("scripts.train", "models/train_hybrid_deep_model.py")?
            .set_default("scripts.validate", "models/validate_model.py")?
            .set_default("scripts.predict", "models/predict_best_model.py")?
            .set_default("activity.marker_path", "/tmp/bento_last_request.txt")?
            .set_default("activity.touch_on_startup", false)?
            .set_default("shutdown.enabled", true)?
            .set_default("shutdown.idle_threshold_minutes", 60)?
            .set_default("shutdown.poll_interval_secs", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HYBRID_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HYBRID__SHUTDOWN__IDLE_THRESHOLD_MINUTES, etc.)
            .add_source(
                Environment::with_prefix("HYBRID")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration without touching files or the environment
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            runner: RunnerConfig {
                interpreter: "python".to_string(),
                working_dir: PathBuf::from("/app/src"),
            },
            scripts: ScriptsConfig {
                train: "models/train_hybrid_deep_model.py".to_string(),
                validate: "models/validate_model.py".to_string(),
                predict: "models/predict_best_model.py".to_string(),
            },
            activity: ActivityConfig {
                marker_path: PathBuf::from("/tmp/bento_last_request.txt"),
                touch_on_startup: false,
            },
            shutdown: ShutdownConfig {
                enabled: true,
                idle_threshold_minutes: 60,
                poll_interval_secs: 60,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Validate values that deserialize fine but make no sense at runtime
    pub fn validate(&self) -> crate::Result<()> {
        if self.runner.interpreter.trim().is_empty() {
            return Err(crate::ServiceError::InvalidConfig(
                "runner.interpreter must not be empty".to_string(),
            ));
        }
        if self.shutdown.enabled && self.shutdown.poll_interval_secs == 0 {
            return Err(crate::ServiceError::InvalidConfig(
                "shutdown.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.runner.interpreter, "python");
        assert_eq!(config.runner.working_dir, PathBuf::from("/app/src"));
        assert_eq!(config.scripts.validate, "models/validate_model.py");
        assert_eq!(
            config.activity.marker_path,
            PathBuf::from("/tmp/bento_last_request.txt")
        );
        assert!(!config.activity.touch_on_startup);
        assert!(config.shutdown.enabled);
        assert_eq!(config.shutdown.idle_threshold_minutes, 60);
        assert_eq!(config.shutdown.poll_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[shutdown]\nidle_threshold_minutes = 15\n\n[runner]\ninterpreter = \"python3\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.shutdown.idle_threshold_minutes, 15);
        assert_eq!(config.runner.interpreter, "python3");
        assert_eq!(config.shutdown.poll_interval_secs, 60);
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = AppConfig::default_config();
        config.shutdown.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.shutdown.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_directives_follow_level() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.default_directives(), "info,tower_http=warn");

        logging.level = "debug".to_string();
        assert_eq!(logging.default_directives(), "debug,tower_http=warn");
    }

    #[test]
    fn test_validate_rejects_empty_interpreter() {
        let mut config = AppConfig::default_config();
        config.runner.interpreter = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
