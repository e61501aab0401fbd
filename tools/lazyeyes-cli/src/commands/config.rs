//! Inspect and manage the configuration file.

use std::path::PathBuf;

use anyhow::Context;
use lazyeyes_common::config::{config_file_path, AppConfig};

use super::Preset;

pub fn init(path: Option<PathBuf>, preset: Option<Preset>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = AppConfig::default();
    if let Some(preset) = preset {
        config.magnification = preset.magnification();
    }
    config
        .save_to(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default configuration to: {}", path.display());
    Ok(())
}

pub fn show(path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, origin) = load(path)?;
    println!("# {origin}");
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, origin) = load(path)?;
    println!("Validating configuration from: {origin}");

    let m = &config.magnification;
    let c = &config.capture;
    println!("  Capture: {}x{} @ {} fps", c.width, c.height, c.fps);
    println!(
        "  Passband: {:.3}-{:.3} Hz ({:.1}-{:.1} BPM)",
        m.min_hz,
        m.max_hz,
        m.min_hz * 60.0,
        m.max_hz * 60.0
    );
    println!(
        "  History: {} frames ({:.1} s at {} fps)",
        m.max_history_length,
        m.max_history_length as f64 / c.fps.max(f64::EPSILON),
        c.fps
    );
    println!(
        "  Pyramid: {} levels{}",
        m.num_pyramid_levels,
        if m.use_laplacian_pyramid { " + laplacian" } else { "" }
    );
    println!(
        "  Logging: {}{} to {}",
        config.logging.level,
        if config.logging.json { " (json)" } else { "" },
        config
            .logging
            .file
            .as_ref()
            .map_or_else(|| "stderr".to_string(), |f| f.display().to_string())
    );

    m.validate(c.width, c.height)
        .context("Configuration is not usable at the configured capture size")?;

    let resolution = c.fps / m.max_history_length as f64;
    if m.max_hz - m.min_hz < resolution {
        println!(
            "  Warning: passband is narrower than one frequency bin ({resolution:.3} Hz); \
             consider a longer history"
        );
    }

    println!("\nConfiguration is valid.");
    Ok(())
}

fn load(path: Option<PathBuf>) -> anyhow::Result<(AppConfig, String)> {
    match path {
        Some(path) => {
            let config = AppConfig::load_from(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Ok((config, path.display().to_string()))
        }
        None => {
            let path = config_file_path();
            let origin = if path.exists() {
                path.display().to_string()
            } else {
                "built-in defaults".to_string()
            };
            Ok((AppConfig::load(), origin))
        }
    }
}
