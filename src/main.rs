use clap::Parser;
use hybrid_serve::api::{create_router, AppState};
use hybrid_serve::cli::{self, Cli, Commands};
use hybrid_serve::config::{AppConfig, LoggingConfig};
use hybrid_serve::control::ControlState;
use hybrid_serve::error::{Result, ServiceError};
use hybrid_serve::supervisor::{IdleWatchdog, IdleWatchdogConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command() {
        Commands::Serve {
            host,
            port,
            no_auto_shutdown,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_auto_shutdown {
                config.shutdown.enabled = false;
            }
            config.validate()?;

            init_logging(&config.logging);
            run_server(config).await?;
        }
        Commands::Status => {
            init_logging_simple();
            cli::show_status(&config)?;
        }
        Commands::Touch => {
            init_logging_simple();
            cli::touch_marker(&config)?;
        }
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let control = Arc::new(ControlState::from_config(&config));
    info!(
        interpreter = %config.runner.interpreter,
        working_dir = %config.runner.working_dir.display(),
        marker = %config.activity.marker_path.display(),
        "Control state ready"
    );

    if !config.runner.working_dir.is_dir() {
        warn!(
            "Working directory {} does not exist; every script run will fail",
            config.runner.working_dir.display()
        );
    }

    // Installed before the watchdog starts so its SIGTERM always takes the graceful path.
    #[cfg(unix)]
    let terminate = {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        async move {
            sigterm.recv().await;
            info!("Received SIGTERM");
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    if config.activity.touch_on_startup {
        control.tracker().record_activity();
    }

    let watchdog = if config.shutdown.enabled {
        let watchdog = Arc::new(IdleWatchdog::with_signal(
            IdleWatchdogConfig::from(&config.shutdown),
            control.tracker().clone(),
        ));
        watchdog.spawn();
        Some(watchdog)
    } else {
        info!("Idle auto-shutdown disabled");
        None
    };

    let app = create_router(AppState::new(Arc::clone(&control), watchdog.clone()));

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Serving model endpoints on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(terminate))
        .await
        .map_err(|e| ServiceError::Server(e.to_string()))?;

    if let Some(watchdog) = watchdog {
        watchdog.stop();
    }
    info!("Service stopped");

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.default_directives()));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal(terminate: impl Future<Output = ()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
