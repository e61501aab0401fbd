use std::f64::consts::PI;
use std::time::{Duration, Instant};

use lazyeyes_common::config::MagnificationConfig;
use lazyeyes_frame_model::{Frame, PixelLayout};
use lazyeyes_magnify_engine::{
    EvmPipeline, FrameSource, MagnifySession, PipelineState, ReplaySource,
};

fn pulse_frames(count: usize, fps: f64, hz: f64) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let t = i as f64 / fps;
            let value = (100.0 + 2.0 * (2.0 * PI * hz * t).cos()).round() as u8;
            Frame::filled(32, 24, PixelLayout::Bgr, value)
        })
        .collect()
}

fn test_config(history: usize) -> MagnificationConfig {
    MagnificationConfig {
        max_history_length: history,
        min_hz: 1.0,
        max_hz: 2.0,
        amplification: 20.0,
        num_pyramid_levels: 2,
        use_laplacian_pyramid: false,
        use_gray_overlay: true,
        mirrored: false,
        forward_fft_threads: 2,
        inverse_fft_threads: 2,
        startup_discard_frames: 0,
    }
}

#[test]
fn replayed_pulse_is_magnified_with_capture_timestamps() {
    // Driving the pipeline directly with the replay's own timing.
    let fps = 30.0;
    let mut source =
        ReplaySource::new("pulse", pulse_frames(90, fps, 1.5)).unwrap().with_frame_rate(fps);
    let mut pipeline = EvmPipeline::for_source(test_config(60), &source).unwrap();

    let mut index = 0;
    let mut max_shift = 0i32;
    while let Some(frame) = source.read().unwrap() {
        let before = frame.data()[0];
        let out = pipeline.process_frame(frame, index as f64 / fps).unwrap();
        max_shift = max_shift.max((out.data()[0] as i32 - before as i32).abs());
        index += 1;
    }

    assert_eq!(pipeline.state(), PipelineState::Steady);
    assert_eq!(pipeline.stats().frames_filtered, 31);
    assert!((pipeline.fps() - 60.0 / (89.0 / 30.0 - 30.0 / 30.0)).abs() < 1e-6);
    assert!(max_shift >= 20, "pulse barely amplified: {max_shift}");
}

#[test]
fn session_presents_frames_and_stops_cleanly() {
    let source = ReplaySource::new("session", pulse_frames(40, 30.0, 1.0)).unwrap();
    let session = MagnifySession::start(test_config(8), Box::new(source)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.is_running() {
        assert!(Instant::now() < deadline, "session never finished");
        std::thread::sleep(Duration::from_millis(1));
    }

    let shown = session.latest_frame().unwrap();
    assert_eq!((shown.width(), shown.height()), (32, 24));
    assert_eq!(session.stats().frames_processed, 40);
    assert!(session.current_fps() > 0.0);

    let source = session.stop().unwrap();
    assert!(source.is_exhausted());
}

/// A camera that delivers a few half-size frames before settling on a
/// size that differs from what it advertises.
struct SettlingCamera {
    delivered: usize,
    total: usize,
}

impl FrameSource for SettlingCamera {
    fn read(&mut self) -> lazyeyes_common::error::LazyEyesResult<Option<Frame>> {
        let frame = if self.delivered < 2 {
            Frame::filled(32, 24, PixelLayout::Gray, 10)
        } else {
            Frame::filled(48, 36, PixelLayout::Gray, 100)
        };
        self.delivered += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> usize {
        64
    }

    fn height(&self) -> usize {
        48
    }

    fn is_monochrome(&self) -> bool {
        false
    }

    fn is_exhausted(&self) -> bool {
        self.delivered >= self.total
    }
}

#[test]
fn session_sizes_pipeline_from_settled_frames() {
    let config = MagnificationConfig {
        startup_discard_frames: 2,
        ..test_config(8)
    };
    let camera = SettlingCamera {
        delivered: 0,
        total: 22,
    };
    let session = MagnifySession::start(config, Box::new(camera)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.is_running() {
        assert!(Instant::now() < deadline, "session never finished");
        std::thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(session.stats().frames_processed, 20);
    assert_eq!(session.frames_published(), 20);
    let shown = session.latest_frame().unwrap();
    assert_eq!((shown.width(), shown.height()), (48, 36));
    assert_eq!(shown.layout(), PixelLayout::Gray);

    let camera = session.stop().unwrap();
    assert!(camera.is_exhausted());
}
