//! Per-frame magnification state machine.
//!
//! ```text
//!  WarmingUp ──(history reaches capacity)──▶ Steady ──┐
//!      │                                       ▲      │ every frame
//!      │                                       └──────┘
//!      └──────────────(stop)──────────▶ Stopped ◀──(stop)
//! ```
//!
//! While warming up, frames are buffered and passed through without an
//! overlay. Once the history is full, every frame re-filters the whole
//! window and composites the amplified result.

use lazyeyes_common::config::MagnificationConfig;
use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::{frame_to_float, Frame, FrameError, PixelLayout};
use lazyeyes_processing_core::{
    Compositor, HistoryBuffer, Passband, PyramidReducer, TemporalBandpassFilter,
};

use crate::source::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// History not yet full; frames pass through untouched.
    WarmingUp,
    /// History full; the filter runs on every frame.
    Steady,
    /// Shut down. No further frames are accepted.
    Stopped,
}

/// Counters kept by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames accepted into the history.
    pub frames_processed: u64,

    /// Frames that received an overlay.
    pub frames_filtered: u64,

    /// Transient acquisition failures reported by the source.
    pub read_failures: u64,

    /// Steady-state frames where the filter was skipped because the
    /// history spanned no time.
    pub filter_skips: u64,
}

/// Eulerian magnification over a stream of equally-shaped frames.
#[derive(Debug)]
pub struct EvmPipeline {
    config: MagnificationConfig,
    width: usize,
    height: usize,
    frame_layout: PixelLayout,
    work_layout: PixelLayout,
    reducer: PyramidReducer,
    history: HistoryBuffer,
    filter: TemporalBandpassFilter,
    compositor: Compositor,
    state: PipelineState,
    stats: PipelineStats,
    fps: f64,
    overlay_energy: f32,
}

impl EvmPipeline {
    /// Build a pipeline for `width x height` frames.
    ///
    /// Fails with a configuration error if `config` cannot run at this
    /// frame size.
    pub fn new(
        config: MagnificationConfig,
        width: usize,
        height: usize,
        monochrome: bool,
    ) -> LazyEyesResult<Self> {
        config.validate(width, height)?;

        let frame_layout = if monochrome {
            PixelLayout::Gray
        } else {
            PixelLayout::Bgr
        };
        let work_layout = if monochrome || config.use_gray_overlay {
            PixelLayout::Gray
        } else {
            PixelLayout::Bgr
        };

        let passband = Passband::new(config.min_hz, config.max_hz)?;
        let filter = TemporalBandpassFilter::new(
            passband,
            config.forward_fft_threads,
            config.inverse_fft_threads,
        )?;
        let reducer = PyramidReducer::new(config.num_pyramid_levels, config.use_laplacian_pyramid);
        let (small_w, small_h) = reducer.reduced_size(width, height);

        tracing::info!(
            width,
            height,
            small_w,
            small_h,
            ?work_layout,
            history = config.max_history_length,
            min_hz = config.min_hz,
            max_hz = config.max_hz,
            amplification = config.amplification,
            "Magnification pipeline created"
        );

        Ok(Self {
            width,
            height,
            frame_layout,
            work_layout,
            reducer,
            history: HistoryBuffer::with_capacity(config.max_history_length)?,
            filter,
            compositor: Compositor::new(config.amplification, config.num_pyramid_levels),
            state: PipelineState::WarmingUp,
            stats: PipelineStats::default(),
            fps: 0.0,
            overlay_energy: 0.0,
            config,
        })
    }

    /// Build a pipeline sized and laid out like `frame`.
    pub fn for_frame(config: MagnificationConfig, frame: &Frame) -> LazyEyesResult<Self> {
        Self::new(
            config,
            frame.width(),
            frame.height(),
            frame.layout() == PixelLayout::Gray,
        )
    }

    /// Build a pipeline sized for the frames `source` says it produces.
    pub fn for_source(config: MagnificationConfig, source: &dyn FrameSource) -> LazyEyesResult<Self> {
        Self::new(config, source.width(), source.height(), source.is_monochrome())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Frames per second measured across the history window.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Mean absolute overlay added to the last filtered frame.
    pub fn overlay_energy(&self) -> f32 {
        self.overlay_energy
    }

    pub fn config(&self) -> &MagnificationConfig {
        &self.config
    }

    pub fn frame_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Count a frame the source failed to deliver. History and FPS are
    /// left untouched.
    pub fn record_read_failure(&mut self) {
        self.stats.read_failures += 1;
    }

    /// Run one frame through the pipeline and return it ready to display.
    ///
    /// `timestamp` is the capture time in seconds on a monotonic clock.
    pub fn process_frame(&mut self, mut frame: Frame, timestamp: f64) -> LazyEyesResult<Frame> {
        if self.state == PipelineState::Stopped {
            return Err(LazyEyesError::processing("pipeline is stopped"));
        }
        self.check_frame(&frame)
            .map_err(|e| LazyEyesError::processing(e.to_string()))?;

        let small = self.reducer.reduce(&frame_to_float(&frame, self.work_layout));
        self.history.append(small, timestamp)?;
        self.stats.frames_processed += 1;

        if self.history.is_full() {
            if self.state == PipelineState::WarmingUp {
                tracing::info!(
                    frames = self.history.len(),
                    span_secs = self.history.time_span(),
                    "History full, magnification active"
                );
                self.state = PipelineState::Steady;
            }
            self.magnify(&mut frame)?;
        } else {
            self.update_warmup_fps();
        }

        if self.config.mirrored {
            frame.flip_horizontal();
        }
        Ok(frame)
    }

    /// Move to `Stopped` and release the history.
    pub fn stop(&mut self) {
        if self.state != PipelineState::Stopped {
            tracing::debug!(stats = ?self.stats, "Magnification pipeline stopped");
        }
        self.state = PipelineState::Stopped;
        self.history.clear();
    }

    fn magnify(&mut self, frame: &mut Frame) -> LazyEyesResult<()> {
        let span = self.history.time_span();
        if !(span > 0.0 && span.is_finite()) {
            self.stats.filter_skips += 1;
            tracing::debug!(span, "History spans no time, skipping filter");
            return Ok(());
        }

        let capacity = self.history.capacity() as f64;
        let time_per_frame = span / capacity;
        let filtered = match self.filter.apply_history(&self.history, time_per_frame) {
            Ok(filtered) => filtered,
            Err(e) => {
                tracing::error!(error = %e, "Temporal filter failed");
                return Err(e);
            }
        };

        self.overlay_energy = self.compositor.composite(frame, filtered)?;
        self.stats.frames_filtered += 1;
        self.fps = capacity / span;
        Ok(())
    }

    fn update_warmup_fps(&mut self) {
        let span = self.history.time_span();
        if span > 0.0 {
            self.fps = (self.history.len() - 1) as f64 / span;
        }
    }

    fn check_frame(&self, frame: &Frame) -> Result<(), FrameError> {
        if (frame.width(), frame.height(), frame.layout())
            != (self.width, self.height, self.frame_layout)
        {
            return Err(FrameError::ShapeMismatch {
                left: format!("{}x{} {:?}", frame.width(), frame.height(), frame.layout()),
                right: format!("{}x{} {:?}", self.width, self.height, self.frame_layout),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn small_config(history: usize) -> MagnificationConfig {
        MagnificationConfig {
            max_history_length: history,
            min_hz: 1.0,
            max_hz: 2.0,
            amplification: 10.0,
            num_pyramid_levels: 1,
            use_laplacian_pyramid: false,
            use_gray_overlay: true,
            mirrored: false,
            forward_fft_threads: 1,
            inverse_fft_threads: 1,
            startup_discard_frames: 0,
        }
    }

    fn gray(value: u8) -> Frame {
        Frame::filled(16, 16, PixelLayout::Gray, value)
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut config = small_config(8);
        config.num_pyramid_levels = 5;
        let err = EvmPipeline::new(config, 16, 16, true).unwrap_err();
        assert!(matches!(err, LazyEyesError::Config { .. }));

        let mut config = small_config(8);
        config.min_hz = 3.0;
        assert!(EvmPipeline::new(config, 16, 16, true).is_err());
    }

    #[test]
    fn for_frame_takes_size_and_layout_from_the_frame() {
        let frame = Frame::filled(24, 20, PixelLayout::Bgr, 50);
        let mut pipeline = EvmPipeline::for_frame(small_config(4), &frame).unwrap();
        assert_eq!(pipeline.frame_size(), (24, 20));

        assert!(pipeline.process_frame(frame, 0.0).is_ok());
        assert!(pipeline.process_frame(Frame::filled(24, 20, PixelLayout::Gray, 50), 0.1).is_err());
    }

    #[test]
    fn warms_up_then_turns_steady_at_capacity() {
        let mut pipeline = EvmPipeline::new(small_config(4), 16, 16, true).unwrap();
        for i in 0..3 {
            let out = pipeline.process_frame(gray(100), i as f64 * 0.1).unwrap();
            assert_eq!(out, gray(100));
            assert_eq!(pipeline.state(), PipelineState::WarmingUp);
        }
        pipeline.process_frame(gray(100), 0.3).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Steady);
        assert_eq!(pipeline.history_len(), 4);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_processed, 4);
        assert_eq!(stats.frames_filtered, 1);
    }

    #[test]
    fn zero_time_span_skips_filter() {
        let mut pipeline = EvmPipeline::new(small_config(3), 16, 16, true).unwrap();
        for _ in 0..5 {
            let out = pipeline.process_frame(gray(42), 7.0).unwrap();
            assert_eq!(out, gray(42));
        }
        let stats = pipeline.stats();
        assert_eq!(stats.filter_skips, 3);
        assert_eq!(stats.frames_filtered, 0);
        assert_eq!(pipeline.fps(), 0.0);
    }

    #[test]
    fn fps_follows_history_span() {
        let mut pipeline = EvmPipeline::new(small_config(10), 16, 16, true).unwrap();
        for i in 0..10 {
            pipeline.process_frame(gray(50), i as f64 / 20.0).unwrap();
        }
        // 10 frames over 0.45 s.
        assert!((pipeline.fps() - 10.0 / 0.45).abs() < 1e-9);
    }

    #[test]
    fn static_scene_is_not_altered() {
        let mut pipeline = EvmPipeline::new(small_config(8), 16, 16, false).unwrap();
        let frame = Frame::filled(16, 16, PixelLayout::Bgr, 77);
        for i in 0..12 {
            let out = pipeline.process_frame(frame.clone(), i as f64 / 30.0).unwrap();
            assert_eq!(out, frame);
        }
        assert_eq!(pipeline.stats().frames_filtered, 5);
    }

    #[test]
    fn pulse_is_amplified() {
        // 1.5 Hz pulse sampled at 30 fps over a 40-frame window.
        let mut pipeline = EvmPipeline::new(small_config(40), 16, 16, true).unwrap();
        let mut last = None;
        for i in 0..40 {
            let t = i as f64 / 30.0;
            let value = (128.0 + 3.0 * (2.0 * PI * 1.5 * t).cos()).round() as u8;
            let out = pipeline.process_frame(gray(value), t).unwrap();
            last = Some((value, out));
        }
        let (input, out) = last.unwrap();
        let shift = out.data()[0] as i32 - input as i32;
        assert!(shift.abs() >= 10, "overlay too weak: {shift}");
        assert!(pipeline.overlay_energy() > 1.0);
    }

    #[test]
    fn mirrored_output_is_flipped() {
        let mut config = small_config(4);
        config.mirrored = true;
        let mut pipeline = EvmPipeline::new(config, 16, 16, true).unwrap();

        let mut frame = gray(0);
        frame.set(0, 0, 0, 255);
        let out = pipeline.process_frame(frame, 0.0).unwrap();
        assert_eq!(out.get(15, 0, 0), 255);
        assert_eq!(out.get(0, 0, 0), 0);
    }

    #[test]
    fn wrong_frame_shape_is_rejected() {
        let mut pipeline = EvmPipeline::new(small_config(4), 16, 16, true).unwrap();
        let err = pipeline
            .process_frame(Frame::filled(8, 16, PixelLayout::Gray, 0), 0.0)
            .unwrap_err();
        assert!(matches!(err, LazyEyesError::Processing { .. }));

        let color = Frame::filled(16, 16, PixelLayout::Bgr, 0);
        assert!(pipeline.process_frame(color, 0.0).is_err());
        assert_eq!(pipeline.stats().frames_processed, 0);
    }

    #[test]
    fn stopped_pipeline_refuses_frames() {
        let mut pipeline = EvmPipeline::new(small_config(4), 16, 16, true).unwrap();
        pipeline.process_frame(gray(1), 0.0).unwrap();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.history_len(), 0);
        assert!(pipeline.process_frame(gray(1), 0.1).is_err());
    }

    #[test]
    fn read_failures_do_not_touch_history() {
        let mut pipeline = EvmPipeline::new(small_config(4), 16, 16, true).unwrap();
        pipeline.record_read_failure();
        pipeline.record_read_failure();
        assert_eq!(pipeline.stats().read_failures, 2);
        assert_eq!(pipeline.history_len(), 0);
        assert_eq!(pipeline.state(), PipelineState::WarmingUp);
    }
}
