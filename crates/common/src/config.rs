//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LazyEyesError, LazyEyesResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Eulerian magnification parameters.
    pub magnification: MagnificationConfig,

    /// Capture request defaults.
    pub capture: CaptureDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Parameters of the magnification pipeline.
///
/// Set once at construction. The pipeline never re-reads these mid-run,
/// since changing any of them would require reallocating the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnificationConfig {
    /// Number of downsampled frames kept in the rolling window.
    pub max_history_length: usize,

    /// Lower edge of the temporal passband (Hz, inclusive).
    pub min_hz: f64,

    /// Upper edge of the temporal passband (Hz, exclusive).
    pub max_hz: f64,

    /// Gain applied to the filtered signal before compositing.
    pub amplification: f32,

    /// Gaussian pyramid depth used before buffering.
    pub num_pyramid_levels: usize,

    /// Subtract a re-upsampled copy to keep only the band-limited residual.
    pub use_laplacian_pyramid: bool,

    /// Filter a single luma channel instead of all color channels.
    pub use_gray_overlay: bool,

    /// Flip the output horizontally (selfie view).
    pub mirrored: bool,

    /// Worker threads for the forward temporal FFT.
    pub forward_fft_threads: usize,

    /// Worker threads for the inverse temporal FFT.
    pub inverse_fft_threads: usize,

    /// Reads thrown away before the pipeline is sized. Cameras often
    /// deliver a few odd-sized frames while they settle.
    pub startup_discard_frames: usize,
}

/// Frame size and rate requested from capture devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Requested frame width in pixels.
    pub width: usize,

    /// Requested frame height in pixels.
    pub height: usize,

    /// Nominal frame rate.
    pub fps: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "lazyeyes=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for MagnificationConfig {
    fn default() -> Self {
        Self::pulse()
    }
}

impl MagnificationConfig {
    /// Heart-rate band (50-60 BPM) with a shallow Laplacian pyramid.
    pub fn pulse() -> Self {
        Self {
            max_history_length: 360,
            min_hz: 5.0 / 6.0,
            max_hz: 1.0,
            amplification: 32.0,
            num_pyramid_levels: 2,
            use_laplacian_pyramid: true,
            use_gray_overlay: true,
            mirrored: true,
            forward_fft_threads: 4,
            inverse_fft_threads: 4,
            startup_discard_frames: 2,
        }
    }

    /// Respiration band (12-30 breaths per minute).
    ///
    /// Breathing moves larger regions more slowly than a pulse, so the
    /// pyramid is one level deeper and the gain is higher.
    pub fn breathing() -> Self {
        Self {
            min_hz: 0.2,
            max_hz: 0.5,
            amplification: 64.0,
            num_pyramid_levels: 3,
            ..Self::pulse()
        }
    }

    /// Check every parameter against the frame size it will run on.
    ///
    /// Any failure here is fatal: the processing thread must not start.
    pub fn validate(&self, frame_width: usize, frame_height: usize) -> LazyEyesResult<()> {
        if frame_width == 0 || frame_height == 0 {
            return Err(LazyEyesError::config(format!(
                "frame size {frame_width}x{frame_height} has a zero dimension"
            )));
        }
        if self.max_history_length < 2 {
            return Err(LazyEyesError::config(format!(
                "max_history_length must be at least 2, got {}",
                self.max_history_length
            )));
        }
        if !self.min_hz.is_finite() || !self.max_hz.is_finite() {
            return Err(LazyEyesError::config("passband edges must be finite"));
        }
        if self.min_hz < 0.0 {
            return Err(LazyEyesError::config(format!(
                "min_hz must be non-negative, got {}",
                self.min_hz
            )));
        }
        if self.min_hz >= self.max_hz {
            return Err(LazyEyesError::config(format!(
                "min_hz ({}) must be below max_hz ({})",
                self.min_hz, self.max_hz
            )));
        }
        if !self.amplification.is_finite() || self.amplification <= 0.0 {
            return Err(LazyEyesError::config(format!(
                "amplification must be a positive finite number, got {}",
                self.amplification
            )));
        }

        let depth_needed = self.num_pyramid_levels + usize::from(self.use_laplacian_pyramid);
        let depth_allowed = max_pyramid_levels(frame_width, frame_height);
        if depth_needed > depth_allowed {
            return Err(LazyEyesError::config(format!(
                "num_pyramid_levels {} (laplacian: {}) is too deep for a {}x{} frame; at most {} levels fit",
                self.num_pyramid_levels,
                self.use_laplacian_pyramid,
                frame_width,
                frame_height,
                depth_allowed
            )));
        }

        if self.forward_fft_threads == 0 || self.inverse_fft_threads == 0 {
            return Err(LazyEyesError::config("FFT thread counts must be at least 1"));
        }

        Ok(())
    }
}

/// Deepest pyramid that keeps every level at least one pixel wide.
pub fn max_pyramid_levels(width: usize, height: usize) -> usize {
    let smaller = width.min(height);
    if smaller == 0 {
        return 0;
    }
    smaller.ilog2() as usize
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors propagate.
    pub fn load_from(path: impl AsRef<Path>) -> LazyEyesResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LazyEyesError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> LazyEyesResult<PathBuf> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> LazyEyesResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("lazyeyes").join("config.json")
}
