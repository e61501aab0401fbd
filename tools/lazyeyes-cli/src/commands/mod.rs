pub mod config;
pub mod run;

use clap::ValueEnum;
use lazyeyes_common::config::MagnificationConfig;

/// Built-in magnification presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Heart rate, 50-60 BPM
    Pulse,
    /// Respiration, 12-30 breaths per minute
    Breathing,
}

impl Preset {
    pub fn magnification(self) -> MagnificationConfig {
        match self {
            Preset::Pulse => MagnificationConfig::pulse(),
            Preset::Breathing => MagnificationConfig::breathing(),
        }
    }
}
