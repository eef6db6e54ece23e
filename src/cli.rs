use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::control::ActivityTracker;

#[derive(Parser, Debug)]
#[command(name = "hybrid-serve")]
#[command(author, version)]
#[command(about = "Control service for the hybrid deep recommendation model", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment-specific config files
    #[arg(short, long, global = true, env = "HYBRID_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP service with the idle watchdog (default)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Disable idle auto-shutdown for this run
        #[arg(long)]
        no_auto_shutdown: bool,
    },

    /// Show the last recorded request and idle time
    Status,

    /// Record activity now, postponing idle shutdown
    Touch,
}

impl Cli {
    /// Subcommand to run; no subcommand means `serve` with config values
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve {
            host: None,
            port: None,
            no_auto_shutdown: false,
        })
    }
}

/// Print marker state and idle time
pub fn show_status(config: &AppConfig) -> Result<()> {
    let tracker = ActivityTracker::new(config.activity.marker_path.clone());

    println!("Marker file:     {}", tracker.marker_path().display());
    if let Err(e) = fs::metadata(tracker.marker_path()) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(e).with_context(|| {
                format!(
                    "cannot inspect activity marker {}",
                    tracker.marker_path().display()
                )
            });
        }
    }
    match (tracker.last_activity_time(), tracker.idle_minutes()) {
        (Some(last), Some(idle)) => {
            let when = crate::api::types::epoch_to_datetime(last)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| last.to_string());
            println!("Last request:    {}", when);
            println!("Idle for:        {:.1} min", idle);
        }
        _ => println!("Last request:    none recorded"),
    }

    if config.shutdown.enabled {
        println!(
            "Auto-shutdown:   after {} idle min (checked every {}s)",
            config.shutdown.idle_threshold_minutes, config.shutdown.poll_interval_secs
        );
        if let Some(idle) = tracker.idle_minutes() {
            if idle > config.shutdown.idle_threshold_minutes as f64 {
                println!("\x1b[33m⚠ A running service would shut down at its next check\x1b[0m");
            }
        }
    } else {
        println!("Auto-shutdown:   disabled");
    }

    Ok(())
}

/// Write "now" into the marker
pub fn touch_marker(config: &AppConfig) -> Result<()> {
    let tracker = ActivityTracker::new(config.activity.marker_path.clone());
    tracker.record_activity();

    tracker.last_activity_time().with_context(|| {
        format!(
            "could not write activity marker {}",
            tracker.marker_path().display()
        )
    })?;
    println!(
        "\x1b[32m✓ Recorded activity in {}\x1b[0m",
        tracker.marker_path().display()
    );
    Ok(())
}
