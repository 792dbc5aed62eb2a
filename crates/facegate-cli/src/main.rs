//! facegate - face recognition door lock.
//!
//! Recognizes enrolled people in front of the camera and drives a serial
//! relay board that opens the door, with a manual console alongside.
//!
//! # Usage
//!
//! ```bash
//! # Enroll someone from a frame of a scene script
//! facegate enroll alice --script demos/scene.json --frame 0
//!
//! # Run against a simulated relay board
//! facegate run --script demos/scene.json --mock-actuator
//!
//! # Recent unlocks
//! facegate audit --limit 10
//! ```

mod commands;
mod config;
mod console;
mod logging;
mod scene;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use commands::Actuator;
use config::FacegateConfig;

#[derive(Debug, Parser)]
#[command(name = "facegate", version, about = "Face recognition door lock")]
struct Cli {
    /// Configuration file (defaults to ./facegate.toml when present)
    #[arg(short, long, env = "FACEGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run recognition and manual control until stopped
    Run {
        /// Scene script standing in for the camera
        #[arg(long)]
        script: PathBuf,

        /// Drive a simulated relay board instead of the serial port
        #[arg(long)]
        mock_actuator: bool,
    },

    /// Enroll a person from one frame of a scene script
    Enroll {
        name: String,

        #[arg(long)]
        script: PathBuf,

        /// Frame index within the script
        #[arg(long, default_value_t = 0)]
        frame: usize,

        /// Replace an existing enrollment with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Remove an enrolled person
    Remove { name: String },

    /// List enrolled people
    Identities,

    /// Show recent confirmed unlocks
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Open the lock once and relock after the dwell time
    Open {
        #[arg(long)]
        mock_actuator: bool,
    },

    /// List serial ports
    Ports,
}

fn actuator(mock: bool) -> Actuator {
    if mock { Actuator::Mock } else { Actuator::Serial }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = FacegateConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose);
    match &source {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => debug!("No configuration file, using defaults"),
    }

    match cli.command {
        Command::Run {
            script,
            mock_actuator,
        } => commands::run(&config, &script, actuator(mock_actuator)).await,
        Command::Enroll {
            name,
            script,
            frame,
            overwrite,
        } => commands::enroll(&config, &name, &script, frame, overwrite).await,
        Command::Remove { name } => commands::remove(&config, &name).await,
        Command::Identities => commands::identities(&config).await,
        Command::Audit { limit } => commands::audit(&config, limit).await,
        Command::Open { mock_actuator } => commands::open(&config, actuator(mock_actuator)).await,
        Command::Ports => commands::ports(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "facegate",
            "-vv",
            "run",
            "--script",
            "scene.json",
            "--mock-actuator",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Run { mock_actuator: true, .. }
        ));
    }

    #[test]
    fn test_parse_enroll_defaults() {
        let cli =
            Cli::try_parse_from(["facegate", "enroll", "alice", "--script", "scene.json"]).unwrap();

        match cli.command {
            Command::Enroll {
                name,
                frame,
                overwrite,
                ..
            } => {
                assert_eq!(name, "alice");
                assert_eq!(frame, 0);
                assert!(!overwrite);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_script() {
        assert!(Cli::try_parse_from(["facegate", "run"]).is_err());
    }
}
