//! Logging and tracing initialization.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Subscriber;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber with the given configuration.
pub fn init_logging(config: &LoggingConfig) {
    tracing::subscriber::set_global_default(build_subscriber(config)).ok();
}

/// Build the subscriber `init_logging` installs.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.file` is
/// set, output goes to that file (appending); if it cannot be opened the
/// subscriber falls back to stderr.
pub fn build_subscriber(config: &LoggingConfig) -> Box<dyn Subscriber + Send + Sync> {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file = config.file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", path.display());
                None
            }
        }
    });

    match (config.json, file) {
        (true, Some(file)) => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .json()
                .finish(),
        ),
        (true, None) => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .json()
                .finish(),
        ),
        (false, Some(file)) => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .finish(),
        ),
        (false, None) => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch_log(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lazyeyes-{}-{name}", std::process::id()));
        std::fs::remove_file(&path).ok();
        path
    }

    #[test]
    fn configured_file_receives_events() {
        let path = scratch_log("plain.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            json: false,
            file: Some(path.clone()),
        };

        tracing::subscriber::with_default(build_subscriber(&config), || {
            tracing::error!(frames = 3, "history window filled");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("history window filled"));
        assert!(contents.contains("frames=3"));
        assert!(!contents.contains('\u{1b}'), "file output must not carry ANSI codes");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn json_file_output_is_one_object_per_line() {
        let path = scratch_log("json.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            json: true,
            file: Some(path.clone()),
        };

        tracing::subscriber::with_default(build_subscriber(&config), || {
            tracing::error!("session stopped");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().unwrap();
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["fields"]["message"], "session stopped");
        std::fs::remove_file(path).ok();
    }
}
