//! Synthetic camera producing a scene with a periodic color pulse.
//!
//! The scene is a static vertical gradient with a skin-toned ellipse in
//! the middle, drawn once with `imageproc`. Only the ellipse pulses,
//! strongest in the red channel, at the requested heart rate. Optional
//! uniform noise stands in for sensor grain.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_ellipse_mut;
use lazyeyes_common::error::LazyEyesResult;
use lazyeyes_frame_model::{Frame, PixelLayout};
use lazyeyes_magnify_engine::FrameSource;

/// Per-channel pulse strength inside the ellipse, BGR order.
const PULSE_WEIGHTS_BGR: [f32; 3] = [0.3, 0.6, 1.0];

/// Base skin tone.
const SKIN_RGB: [u8; 3] = [170, 120, 90];

pub struct PulseSource {
    width: usize,
    height: usize,
    layout: PixelLayout,
    fps: f64,
    pulse_hz: f64,
    amplitude: f32,
    noise: f32,
    paced: bool,
    /// Static scene, already in the output layout.
    base: Vec<f32>,
    /// Pulse weight per sample; zero outside the ellipse.
    weights: Vec<f32>,
    frame_index: u64,
    started: Option<Instant>,
    rng: u64,
    spare: Option<Frame>,
}

impl PulseSource {
    /// A color source of `width x height` at `fps`, pulsing at `bpm`.
    pub fn new(width: usize, height: usize, fps: f64, bpm: f64) -> Self {
        let mut source = Self {
            width,
            height,
            layout: PixelLayout::Bgr,
            fps,
            pulse_hz: bpm / 60.0,
            amplitude: 1.5,
            noise: 0.0,
            paced: true,
            base: Vec::new(),
            weights: Vec::new(),
            frame_index: 0,
            started: None,
            rng: 0x9E37_79B9_7F4A_7C15,
            spare: None,
        };
        source.build_scene();
        source
    }

    /// Produce single-channel frames.
    pub fn monochrome(mut self, monochrome: bool) -> Self {
        self.layout = if monochrome {
            PixelLayout::Gray
        } else {
            PixelLayout::Bgr
        };
        self.build_scene();
        self
    }

    /// Peak pulse amplitude in 8-bit levels.
    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Peak uniform noise in 8-bit levels.
    pub fn noise(mut self, noise: f32) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Whether `read` blocks to match the nominal frame rate.
    #[cfg(test)]
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn pulse_hz(&self) -> f64 {
        self.pulse_hz
    }

    fn build_scene(&mut self) {
        let (w, h) = (self.width as u32, self.height as u32);
        let mut scene: RgbImage = ImageBuffer::from_fn(w, h, |_, y| {
            let shade = 40.0 + 50.0 * y as f32 / h.max(1) as f32;
            Rgb([shade.round() as u8; 3])
        });
        let mut mask = GrayImage::new(w, h);

        let center = ((w / 2) as i32, (h / 2) as i32);
        let (rx, ry) = ((w / 4) as i32, (h / 3) as i32);
        draw_filled_ellipse_mut(&mut scene, center, rx, ry, Rgb(SKIN_RGB));
        draw_filled_ellipse_mut(&mut mask, center, rx, ry, Luma([255]));

        let channels = self.layout.channels();
        self.base = Vec::with_capacity(self.width * self.height * channels);
        self.weights = Vec::with_capacity(self.width * self.height * channels);

        for (color, inside) in scene.pixels().zip(mask.pixels()) {
            let [r, g, b] = color.0;
            let bgr = [f32::from(b), f32::from(g), f32::from(r)];
            let weight = if inside.0[0] > 0 {
                PULSE_WEIGHTS_BGR
            } else {
                [0.0; 3]
            };

            match self.layout {
                PixelLayout::Bgr => {
                    self.base.extend_from_slice(&bgr);
                    self.weights.extend_from_slice(&weight);
                }
                PixelLayout::Gray => {
                    self.base.push(luma(bgr));
                    self.weights.push(luma(weight));
                }
            }
        }
    }

    fn next_noise(&mut self) -> f32 {
        // xorshift64
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        let unit = (self.rng >> 40) as f32 / (1u64 << 24) as f32;
        (unit * 2.0 - 1.0) * self.noise
    }

    fn wait_for_frame_slot(&mut self) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_secs_f64(self.frame_index as f64 / self.fps);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

impl FrameSource for PulseSource {
    fn read(&mut self) -> LazyEyesResult<Option<Frame>> {
        if self.paced {
            self.wait_for_frame_slot();
        }

        let t = self.frame_index as f64 / self.fps;
        let pulse = self.amplitude * (2.0 * PI * self.pulse_hz * t).sin() as f32;

        let mut frame = self
            .spare
            .take()
            .unwrap_or_else(|| Frame::filled(self.width, self.height, self.layout, 0));

        for i in 0..self.base.len() {
            let grain = if self.noise > 0.0 { self.next_noise() } else { 0.0 };
            let value = self.base[i] + self.weights[i] * pulse + grain;
            frame.data_mut()[i] = value.round().clamp(0.0, 255.0) as u8;
        }

        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_monochrome(&self) -> bool {
        self.layout == PixelLayout::Gray
    }

    fn frame_rate_hint(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn name(&self) -> &str {
        "synthetic-pulse"
    }

    fn recycle(&mut self, frame: Frame) {
        if (frame.width(), frame.height(), frame.layout()) == (self.width, self.height, self.layout)
        {
            self.spare = Some(frame);
        }
    }
}

fn luma(bgr: [f32; 3]) -> f32 {
    0.114 * bgr[0] + 0.587 * bgr[1] + 0.299 * bgr[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpaced(width: usize, height: usize) -> PulseSource {
        PulseSource::new(width, height, 30.0, 90.0).paced(false)
    }

    #[test]
    fn frames_have_requested_shape() {
        let mut source = unpaced(40, 30);
        let frame = source.read().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 30));
        assert_eq!(frame.layout(), PixelLayout::Bgr);

        let mut gray = unpaced(40, 30).monochrome(true);
        assert!(gray.is_monochrome());
        assert_eq!(gray.read().unwrap().unwrap().layout(), PixelLayout::Gray);
    }

    #[test]
    fn only_the_ellipse_pulses() {
        let mut source = unpaced(40, 30).amplitude(10.0);
        let frames: Vec<Frame> = (0..10).map(|_| source.read().unwrap().unwrap()).collect();

        let corner: Vec<u8> = frames.iter().map(|f| f.get(0, 0, 2)).collect();
        assert!(corner.iter().all(|&v| v == corner[0]));

        let center: Vec<u8> = frames.iter().map(|f| f.get(20, 15, 2)).collect();
        let (lo, hi) = (center.iter().min().unwrap(), center.iter().max().unwrap());
        assert!(hi - lo >= 10, "center red channel range {lo}..{hi}");
    }

    #[test]
    fn ellipse_is_drawn_in_skin_tone() {
        let mut source = unpaced(40, 30).amplitude(0.0);
        let frame = source.read().unwrap().unwrap();
        let center: Vec<u8> = (0..3).map(|c| frame.get(20, 15, c)).collect();
        assert_eq!(center, vec![90, 120, 170]);

        // Background is a gray vertical gradient.
        let top = frame.get(0, 0, 0);
        let bottom = frame.get(0, 29, 0);
        assert_eq!(top, 40);
        assert!(bottom > top);
        assert_eq!(frame.get(0, 29, 1), bottom);
    }

    #[test]
    fn pulse_rate_follows_bpm() {
        assert!((unpaced(8, 8).pulse_hz() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn noise_stays_bounded() {
        let mut source = unpaced(16, 16).noise(3.0);
        let clean = unpaced(16, 16).read().unwrap().unwrap();
        let noisy = source.read().unwrap().unwrap();
        for (a, b) in clean.data().iter().zip(noisy.data()) {
            assert!((*a as i32 - *b as i32).abs() <= 3);
        }
    }

    #[test]
    fn recycled_buffer_is_reused() {
        let mut source = unpaced(16, 16);
        let first = source.read().unwrap().unwrap();
        let ptr = first.data().as_ptr();
        source.recycle(first);
        let second = source.read().unwrap().unwrap();
        assert_eq!(second.data().as_ptr(), ptr);
    }
}
