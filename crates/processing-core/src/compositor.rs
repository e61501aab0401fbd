//! Amplify the filtered signal and add it back onto the live frame.

use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::{bgr_to_gray, gray_to_bgr, FloatImage, Frame, PixelLayout};

use crate::pyramid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    amplification: f32,
    levels: usize,
}

impl Compositor {
    pub fn new(amplification: f32, levels: usize) -> Self {
        Self {
            amplification,
            levels,
        }
    }

    pub fn amplification(&self) -> f32 {
        self.amplification
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Build the full-resolution overlay for `current` from a filtered
    /// pyramid-level image.
    ///
    /// The overlay is scaled, expanded `levels` times to the frame size and
    /// matched to the frame's channel layout.
    pub fn overlay(&self, current: &Frame, mut filtered: FloatImage) -> LazyEyesResult<FloatImage> {
        let expected = pyramid::reduced_size(current.width(), current.height(), self.levels);
        if (filtered.width(), filtered.height()) != expected {
            return Err(LazyEyesError::processing(format!(
                "filtered image is {}x{}, expected {}x{} for a {}x{} frame at {} levels",
                filtered.width(),
                filtered.height(),
                expected.0,
                expected.1,
                current.width(),
                current.height(),
                self.levels
            )));
        }

        filtered.scale(self.amplification);
        let expanded = pyramid::expand(&filtered, self.levels, current.width(), current.height());
        Ok(match current.layout() {
            PixelLayout::Bgr => gray_to_bgr(expanded),
            PixelLayout::Gray => bgr_to_gray(expanded),
        })
    }

    /// Amplify `filtered`, expand it, and saturate-add it onto `current`.
    ///
    /// Returns the mean absolute overlay value that was added, before
    /// saturation.
    pub fn composite(&self, current: &mut Frame, filtered: FloatImage) -> LazyEyesResult<f32> {
        let overlay = self.overlay(current, filtered)?;
        add_saturating(current, &overlay);

        let energy = if overlay.is_empty() {
            0.0
        } else {
            overlay.data().iter().map(|v| v.abs()).sum::<f32>() / overlay.len() as f32
        };
        Ok(energy)
    }
}

/// `dst += overlay`, rounding and clamping each sample to `0..=255`.
pub fn add_saturating(dst: &mut Frame, overlay: &FloatImage) {
    for (d, &o) in dst.data_mut().iter_mut().zip(overlay.data()) {
        *d = (*d as f32 + o).round().clamp(0.0, 255.0) as u8;
    }
}
