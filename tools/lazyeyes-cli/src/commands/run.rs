//! Run the magnification pipeline against the synthetic pulse source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use image::{GrayImage, ImageBuffer, Rgb, RgbImage};
use lazyeyes_common::clock::RateController;
use lazyeyes_common::config::AppConfig;
use lazyeyes_frame_model::{Frame, PixelLayout};
use lazyeyes_magnify_engine::MagnifySession;
use tokio::time::MissedTickBehavior;

use super::Preset;
use crate::synthetic::PulseSource;

pub struct RunOptions {
    pub duration: Option<f64>,
    pub bpm: f64,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub fps: Option<f64>,
    pub preset: Option<Preset>,
    pub config: Option<PathBuf>,
    pub monochrome: bool,
    pub amplitude: f32,
    pub noise: f32,
    pub snapshot: Option<PathBuf>,
}

pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let app = match &opts.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AppConfig::load(),
    };

    let magnification = match opts.preset {
        Some(preset) => preset.magnification(),
        None => app.magnification.clone(),
    };
    let width = opts.width.unwrap_or(app.capture.width);
    let height = opts.height.unwrap_or(app.capture.height);
    let fps = opts.fps.unwrap_or(app.capture.fps);
    if !(fps.is_finite() && fps > 0.0) {
        anyhow::bail!("frame rate must be positive, got {fps}");
    }

    let source = PulseSource::new(width, height, fps, opts.bpm)
        .monochrome(opts.monochrome)
        .amplitude(opts.amplitude)
        .noise(opts.noise);

    println!("Starting magnification");
    println!(
        "  Source: synthetic {width}x{height} @ {fps} fps, pulse {:.2} Hz ({} BPM)",
        source.pulse_hz(),
        opts.bpm
    );
    println!(
        "  Passband: {:.2}-{:.2} Hz, gain {}x",
        magnification.min_hz, magnification.max_hz, magnification.amplification
    );
    println!(
        "  Warm-up: {} frames (~{:.1} s)",
        magnification.max_history_length,
        magnification.max_history_length as f64 / fps
    );
    match opts.duration {
        Some(secs) => println!("  Duration: {secs} s"),
        None => println!("  Press Ctrl+C to stop..."),
    }
    println!();

    // Startup reads block until the source settles.
    let session =
        tokio::task::spawn_blocking(move || MagnifySession::start(magnification, Box::new(source)))
            .await
            .context("Session startup failed")??;

    let mut redraw = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = RateController::every(Duration::from_secs(1));
    let deadline = async {
        match opts.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut presented = 0u64;
    let mut last_shown: Option<Arc<Frame>> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Interrupted, stopping");
                break;
            }
            _ = &mut deadline => break,
            _ = redraw.tick() => {
                if let Some(frame) = session.latest_frame() {
                    let is_new = last_shown
                        .as_ref()
                        .map_or(true, |shown| !Arc::ptr_eq(shown, &frame));
                    if is_new {
                        presented += 1;
                        last_shown = Some(frame);
                    }
                }

                if !session.is_running() {
                    tracing::warn!("Processing thread exited early");
                    break;
                }

                if report.should_tick(session.elapsed_secs()) {
                    tracing::info!(
                        state = ?session.state(),
                        fps = session.current_fps(),
                        overlay = session.overlay_energy(),
                        presented,
                        "Presenting"
                    );
                }
            }
        }
    }

    let stats = session.stats();
    let final_fps = session.current_fps();
    let published = session.frames_published();

    // Joining blocks; keep it off the runtime threads.
    let source = tokio::task::spawn_blocking(move || session.stop())
        .await
        .context("Processing thread join failed")??;
    drop(source);

    println!("Stopped.");
    println!("  Frames processed: {}", stats.frames_processed);
    println!("  Frames magnified: {}", stats.frames_filtered);
    println!("  Frames published: {published}");
    println!("  Frames presented: {presented}");
    println!("  Read failures:    {}", stats.read_failures);
    println!("  Filter skips:     {}", stats.filter_skips);
    println!("  Measured FPS:     {final_fps:.1}");

    if let Some(path) = opts.snapshot {
        let Some(frame) = last_shown else {
            anyhow::bail!("No frame was presented; nothing to write to {}", path.display());
        };
        write_snapshot(&path, &frame)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        println!("  Snapshot:         {}", path.display());
    }

    Ok(())
}

/// Save a frame as an image; the format follows the file extension.
pub fn write_snapshot(path: &Path, frame: &Frame) -> anyhow::Result<()> {
    let (width, height) = (frame.width() as u32, frame.height() as u32);
    match frame.layout() {
        PixelLayout::Gray => {
            let img = GrayImage::from_raw(width, height, frame.data().to_vec())
                .context("Frame buffer does not match its dimensions")?;
            img.save(path)?;
        }
        PixelLayout::Bgr => {
            let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
                let (x, y) = (x as usize, y as usize);
                Rgb([frame.get(x, y, 2), frame.get(x, y, 1), frame.get(x, y, 0)])
            });
            img.save(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lazyeyes-{}-{name}", std::process::id()))
    }

    #[test]
    fn color_snapshot_is_saved_as_rgb() {
        let frame = Frame::from_vec(2, 1, PixelLayout::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let path = scratch_file("color.png");
        write_snapshot(&path, &frame).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([6, 5, 4]));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn gray_snapshot_keeps_single_channel() {
        let frame = Frame::filled(3, 2, PixelLayout::Gray, 7);
        let path = scratch_file("gray.pgm");
        write_snapshot(&path, &frame).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.color(), image::ColorType::L8);
        assert!(img.to_luma8().pixels().all(|p| p.0 == [7]));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let frame = Frame::filled(2, 2, PixelLayout::Gray, 0);
        let path = scratch_file("frame.unknown");
        assert!(write_snapshot(&path, &frame).is_err());
        std::fs::remove_file(path).ok();
    }
}
