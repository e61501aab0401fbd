//! LazyEyes Magnify Engine
//!
//! Runs Eulerian video magnification in real time. A processing thread
//! pulls frames from a [`FrameSource`], pushes them through the
//! [`EvmPipeline`], and publishes the result to a
//! [`DoubleBufferedPresenter`] that the display side reads from.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── processing thread ────────────────────────┐
//! │ FrameSource ─▶ PyramidReducer ─▶ HistoryBuffer ─▶ Bandpass ─▶ ... │
//! │                                          Compositor ─▶ mirror ─┐  │
//! └────────────────────────────────────────────────────────────────┼──┘
//!                                                                  ▼
//!                                              DoubleBufferedPresenter
//!                                                                  │
//!                           presentation thread ◀── latest_frame() ┘
//! ```

pub mod pipeline;
pub mod presenter;
pub mod session;
pub mod source;

pub use pipeline::{EvmPipeline, PipelineState, PipelineStats};
pub use presenter::DoubleBufferedPresenter;
pub use session::MagnifySession;
pub use source::{FrameSource, ReplaySource};
