//! Threaded magnification session.
//!
//! The session owns the processing thread. That thread owns the frame
//! source and the pipeline; the only state it shares is the presenter's
//! front buffer and a few counters. Shutdown is a single flag checked at
//! the top of every loop iteration.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lazyeyes_common::clock::{FrameClock, RateController};
use lazyeyes_common::config::MagnificationConfig;
use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::Frame;

use crate::pipeline::{EvmPipeline, PipelineState, PipelineStats};
use crate::presenter::DoubleBufferedPresenter;
use crate::source::FrameSource;

/// Pause after a missed read so a source with nothing to give does not
/// spin the processing thread.
const READ_RETRY_DELAY: Duration = Duration::from_millis(2);

/// Interval between FPS log lines.
const FPS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// State the processing thread publishes for the presentation side.
#[derive(Debug, Default)]
struct SharedStatus {
    fps_bits: AtomicU64,
    overlay_bits: AtomicU64,
    state: AtomicU8,
    running: AtomicBool,
    stats: Mutex<PipelineStats>,
}

impl SharedStatus {
    fn publish(&self, pipeline: &EvmPipeline) {
        self.fps_bits
            .store(pipeline.fps().to_bits(), Ordering::Relaxed);
        self.overlay_bits
            .store(f64::from(pipeline.overlay_energy()).to_bits(), Ordering::Relaxed);
        self.state
            .store(state_to_u8(pipeline.state()), Ordering::Relaxed);
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = pipeline.stats();
    }
}

/// What the processing thread hands back when it exits.
struct LoopExit {
    source: Box<dyn FrameSource>,
    result: LazyEyesResult<()>,
}

/// A running magnification session.
pub struct MagnifySession {
    stop_flag: Arc<AtomicBool>,
    presenter: Arc<DoubleBufferedPresenter>,
    status: Arc<SharedStatus>,
    handle: Option<JoinHandle<LoopExit>>,
    clock: FrameClock,
    source_name: String,
}

impl MagnifySession {
    /// Let `source` settle, size the pipeline, and start the processing
    /// thread.
    ///
    /// The first `startup_discard_frames` reads are thrown away. The
    /// pipeline is then sized from the next frame that reads cleanly, or
    /// from the source's nominal size if that read fails. Configuration
    /// errors are returned here, before any thread exists.
    pub fn start(
        config: MagnificationConfig,
        mut source: Box<dyn FrameSource>,
    ) -> LazyEyesResult<Self> {
        let first = settle(source.as_mut(), config.startup_discard_frames);
        let pipeline = match &first {
            Some(frame) => EvmPipeline::for_frame(config, frame)?,
            None => EvmPipeline::for_source(config, source.as_ref())?,
        };
        let source_name = source.name().to_string();
        let (width, height) = pipeline.frame_size();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let presenter = Arc::new(DoubleBufferedPresenter::new());
        let status = Arc::new(SharedStatus::default());
        status.running.store(true, Ordering::SeqCst);
        let clock = FrameClock::start();

        tracing::info!(
            source = %source_name,
            width,
            height,
            fps_hint = ?source.frame_rate_hint(),
            epoch = clock.epoch_wall(),
            "Starting magnification session"
        );

        let handle = {
            let stop_flag = Arc::clone(&stop_flag);
            let presenter = Arc::clone(&presenter);
            let status = Arc::clone(&status);
            let clock = clock.clone();
            thread::Builder::new()
                .name("lazyeyes-processing".to_string())
                .spawn(move || {
                    run_loop(source, pipeline, first, &clock, &stop_flag, &presenter, &status)
                })?
        };

        Ok(Self {
            stop_flag,
            presenter,
            status,
            handle: Some(handle),
            clock,
            source_name,
        })
    }

    /// The last published frame, or `None` before the first one.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.presenter.consume()
    }

    /// Frame rate measured across the history window.
    pub fn current_fps(&self) -> f64 {
        f64::from_bits(self.status.fps_bits.load(Ordering::Relaxed))
    }

    /// Mean absolute overlay on the last filtered frame.
    pub fn overlay_energy(&self) -> f64 {
        f64::from_bits(self.status.overlay_bits.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PipelineState {
        state_from_u8(self.status.state.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> PipelineStats {
        *self
            .status
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the processing thread is still looping.
    pub fn is_running(&self) -> bool {
        self.status.running.load(Ordering::SeqCst)
    }

    /// Frames published to the presenter so far.
    pub fn frames_published(&self) -> u64 {
        self.presenter.published()
    }

    /// Seconds since the session started.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    /// Get a clone of the stop flag for external coordination.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    /// Stop the processing thread, wait for it, and hand back the source.
    ///
    /// The source is only returned after the thread has exited, so no read
    /// can be in flight when the caller releases it. If the loop ended on a
    /// fatal error, that error is returned and the source is dropped.
    pub fn stop(mut self) -> LazyEyesResult<Box<dyn FrameSource>> {
        self.stop_flag.store(true, Ordering::SeqCst);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| LazyEyesError::processing("session already stopped"))?;

        let exit = handle
            .join()
            .map_err(|_| LazyEyesError::processing("processing thread panicked"))?;

        let stats = self.stats();
        tracing::info!(
            source = %self.source_name,
            elapsed_secs = self.clock.elapsed_secs(),
            frames = stats.frames_processed,
            filtered = stats.frames_filtered,
            read_failures = stats.read_failures,
            "Magnification session stopped"
        );

        exit.result.map(|()| exit.source)
    }
}

impl Drop for MagnifySession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop_flag.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                tracing::warn!("Processing thread panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for MagnifySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagnifySession")
            .field("source", &self.source_name)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Throw away `discard` reads, then return the first frame that reads
/// cleanly, if any.
fn settle(source: &mut dyn FrameSource, discard: usize) -> Option<Frame> {
    for _ in 0..discard {
        if source.is_exhausted() {
            return None;
        }
        match source.read() {
            Ok(Some(frame)) => source.recycle(frame),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Startup read failed"),
        }
    }
    if discard > 0 {
        tracing::debug!(discarded = discard, "Discarded startup frames");
    }

    if source.is_exhausted() {
        return None;
    }
    match source.read() {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            tracing::warn!("No frame after startup, using the nominal frame size");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "First read failed, using the nominal frame size");
            None
        }
    }
}

fn run_loop(
    mut source: Box<dyn FrameSource>,
    mut pipeline: EvmPipeline,
    mut pending: Option<Frame>,
    clock: &FrameClock,
    stop_flag: &AtomicBool,
    presenter: &DoubleBufferedPresenter,
    status: &SharedStatus,
) -> LoopExit {
    let mut fps_log = RateController::every(FPS_LOG_INTERVAL);

    let result = loop {
        if stop_flag.load(Ordering::SeqCst) {
            break Ok(());
        }
        let read = match pending.take() {
            Some(frame) => Ok(Some(frame)),
            None if source.is_exhausted() => {
                tracing::info!(source = source.name(), "Frame source exhausted");
                break Ok(());
            }
            None => source.read(),
        };

        match read {
            Ok(Some(frame)) => {
                let timestamp = clock.elapsed_secs();
                match pipeline.process_frame(frame, timestamp) {
                    Ok(shown) => {
                        if let Some(spent) = presenter.publish(shown) {
                            source.recycle(spent);
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stopping processing loop");
                        break Err(e);
                    }
                }
            }
            Ok(None) => {
                pipeline.record_read_failure();
                tracing::debug!(
                    failures = pipeline.stats().read_failures,
                    "No frame available"
                );
                thread::sleep(READ_RETRY_DELAY);
            }
            Err(e) if e.is_transient() => {
                pipeline.record_read_failure();
                tracing::warn!(
                    error = %e,
                    failures = pipeline.stats().read_failures,
                    "Frame read failed, retrying"
                );
                thread::sleep(READ_RETRY_DELAY);
            }
            Err(e) => {
                tracing::error!(error = %e, "Frame source failed");
                break Err(e);
            }
        }

        status.publish(&pipeline);
        if pipeline.state() == PipelineState::Steady && fps_log.should_tick(clock.elapsed_secs()) {
            tracing::info!(
                fps = pipeline.fps(),
                overlay = pipeline.overlay_energy(),
                frames = pipeline.stats().frames_processed,
                "Magnification running"
            );
        }
    };

    pipeline.stop();
    status.publish(&pipeline);
    status.running.store(false, Ordering::SeqCst);
    LoopExit { source, result }
}

fn state_to_u8(state: PipelineState) -> u8 {
    match state {
        PipelineState::WarmingUp => 0,
        PipelineState::Steady => 1,
        PipelineState::Stopped => 2,
    }
}

fn state_from_u8(value: u8) -> PipelineState {
    match value {
        0 => PipelineState::WarmingUp,
        1 => PipelineState::Steady,
        _ => PipelineState::Stopped,
    }
}
