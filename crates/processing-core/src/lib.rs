//! LazyEyes Processing Core: Eulerian Video Magnification
//!
//! The signal-processing stages of the magnification pipeline:
//! - **Pyramid:** Gaussian downsampling with optional Laplacian residual
//! - **History:** Fixed-capacity FIFO of downsampled frames and timestamps
//! - **Bandpass:** Batched temporal FFT, frequency-bin masking, inverse FFT
//! - **Compositor:** Amplify, upsample, and saturate-add onto the live frame
//!
//! This crate is pure computation. The only threads it owns are the FFT
//! worker pools inside the filter.

pub mod bandpass;
pub mod compositor;
pub mod history;
pub mod plan_cache;
pub mod pyramid;

pub use bandpass::{Passband, PassbandBins, TemporalBandpassFilter};
pub use compositor::Compositor;
pub use history::HistoryBuffer;
pub use plan_cache::PlanCache;
pub use pyramid::PyramidReducer;
