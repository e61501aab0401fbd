//! LazyEyes CLI: real-time Eulerian video magnification.
//!
//! Usage:
//!   lazyeyes run [OPTIONS]          Magnify a synthetic pulsing scene
//!   lazyeyes config init            Write a default configuration file
//!   lazyeyes config show            Print the effective configuration
//!   lazyeyes config validate        Check the configuration for errors

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lazyeyes_common::config::{AppConfig, LoggingConfig};

mod commands;
mod synthetic;

use commands::Preset;

#[derive(Parser)]
#[command(
    name = "lazyeyes",
    about = "Amplify subtle periodic changes in live video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the magnification pipeline on a synthetic pulsing source
    Run {
        /// Stop after this many seconds (runs until Ctrl+C if omitted)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Simulated heart rate of the synthetic scene
        #[arg(long, default_value = "54")]
        bpm: f64,

        /// Frame width (defaults to the configured capture width)
        #[arg(long)]
        width: Option<usize>,

        /// Frame height (defaults to the configured capture height)
        #[arg(long)]
        height: Option<usize>,

        /// Frame rate (defaults to the configured capture rate)
        #[arg(long)]
        fps: Option<f64>,

        /// Use a built-in preset instead of the configured parameters
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Configuration file to use instead of the standard location
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Generate single-channel frames
        #[arg(long)]
        monochrome: bool,

        /// Peak pulse amplitude of the synthetic scene in 8-bit levels
        #[arg(long, default_value = "1.5")]
        amplitude: f32,

        /// Peak sensor noise in 8-bit levels
        #[arg(long, default_value = "0.5")]
        noise: f32,

        /// Write the last presented frame to this image file (format from extension)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Target path (defaults to the standard location)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Start from a preset
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Configuration file (defaults to the standard location)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Check the configuration against its capture size
    Validate {
        /// Configuration file (defaults to the standard location)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    lazyeyes_common::logging::init_logging(&logging_config(&cli));

    match cli.command {
        Commands::Run {
            duration,
            bpm,
            width,
            height,
            fps,
            preset,
            config,
            monochrome,
            amplitude,
            noise,
            snapshot,
        } => {
            commands::run::run(commands::run::RunOptions {
                duration,
                bpm,
                width,
                height,
                fps,
                preset,
                config,
                monochrome,
                amplitude,
                noise,
                snapshot,
            })
            .await
        }
        Commands::Config { action } => match action {
            ConfigAction::Init {
                path,
                preset,
                force,
            } => commands::config::init(path, preset, force),
            ConfigAction::Show { path } => commands::config::show(path),
            ConfigAction::Validate { path } => commands::config::validate(path),
        },
    }
}

/// Logging settings from the configuration file, with command-line flags
/// taking precedence.
fn logging_config(cli: &Cli) -> LoggingConfig {
    let mut logging = match &cli.command {
        Commands::Run {
            config: Some(path), ..
        } => AppConfig::load_from(path)
            .map(|app| app.logging)
            .unwrap_or_default(),
        _ => AppConfig::load().logging,
    };
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    logging
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_preset_and_duration() {
        let cli = Cli::try_parse_from([
            "lazyeyes",
            "run",
            "--duration",
            "2.5",
            "--preset",
            "breathing",
            "--width",
            "320",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                duration,
                preset,
                width,
                bpm,
                amplitude,
                ..
            } => {
                assert_eq!(amplitude, 1.5);
                assert_eq!(duration, Some(2.5));
                assert_eq!(preset, Some(Preset::Breathing));
                assert_eq!(width, Some(320));
                assert_eq!(bpm, 54.0);
            }
            Commands::Config { .. } => panic!("parsed the wrong subcommand"),
        }
    }

    fn scratch_config(name: &str, logging: LoggingConfig) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lazyeyes-{}-{name}", std::process::id()));
        let app = AppConfig {
            logging,
            ..AppConfig::default()
        };
        app.save_to(&path).unwrap();
        path
    }

    #[test]
    fn run_logs_as_configured() {
        let path = scratch_config(
            "logging.json",
            LoggingConfig {
                level: "warn".to_string(),
                json: true,
                file: Some(PathBuf::from("/var/log/lazyeyes.log")),
            },
        );
        let cli = Cli::try_parse_from(["lazyeyes", "run", "--config", path.to_str().unwrap()])
            .unwrap();

        let logging = logging_config(&cli);
        assert_eq!(logging.level, "warn");
        assert!(logging.json);
        assert_eq!(logging.file, Some(PathBuf::from("/var/log/lazyeyes.log")));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn flags_override_configured_logging() {
        let path = scratch_config(
            "logging-override.json",
            LoggingConfig {
                level: "warn".to_string(),
                json: false,
                file: Some(PathBuf::from("/tmp/lazyeyes.log")),
            },
        );
        let cli = Cli::try_parse_from([
            "lazyeyes",
            "--verbose",
            "--json-logs",
            "run",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();

        let logging = logging_config(&cli);
        assert_eq!(logging.level, "debug");
        assert!(logging.json);
        assert_eq!(logging.file, Some(PathBuf::from("/tmp/lazyeyes.log")));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["lazyeyes", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true, .. }
            }
        ));
    }
}
